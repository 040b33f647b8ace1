use crate::esi_client::EsiClientTrait;
use crate::expansion::ExpansionEngine;
use crate::pagination::{fetch_all_pages, PageLimits};
use anyhow::{Context, Result};
use cw_domain::{ContractId, ContractSnapshot, FilteredProjection, RawContract, RegionId};
use cw_store::ContractBmcTrait;
use itertools::Itertools;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{event, Level};

/// Keeps the local snapshot in step with the remote catalog, paying the
/// expansion cost only for the delta. The snapshot on disk is replaced only
/// after every expansion of the cycle has completed or failed; a cycle that
/// cannot fetch the catalog leaves the previous snapshot untouched.
pub struct ContractSync {
    client: Arc<dyn EsiClientTrait>,
    contracts: Arc<dyn ContractBmcTrait>,
    engine: ExpansionEngine,
    region_id: RegionId,
    limits: PageLimits,
}

impl ContractSync {
    pub fn new(client: Arc<dyn EsiClientTrait>, contracts: Arc<dyn ContractBmcTrait>, engine: ExpansionEngine, region_id: RegionId) -> Self {
        Self {
            client,
            contracts,
            engine,
            region_id,
            limits: PageLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: PageLimits) -> Self {
        self.limits = limits;
        self
    }

    pub async fn sync(&self) -> Result<ContractSnapshot> {
        let mut snapshot = self.contracts.load_snapshot().await;

        let raws: Vec<RawContract> = fetch_all_pages(
            |page| self.client.list_public_contracts_page(self.region_id, page),
            self.limits.clone(),
        )
        .await
        .context("Failed to fetch the public contract catalog")?;

        let remote: Vec<RawContract> = raws.into_iter().unique_by(|raw| raw.contract_id).collect_vec();
        let remote_ids: HashSet<ContractId> = remote.iter().map(|raw| raw.contract_id).collect();
        let local_ids = snapshot.ids();

        let new_ids: HashSet<ContractId> = remote_ids.difference(&local_ids).copied().collect();
        let removed_ids: HashSet<ContractId> = local_ids.difference(&remote_ids).copied().collect();

        event!(
            Level::INFO,
            "Catalog for region {}: {} remote, {} known, {} new, {} removed",
            self.region_id.0,
            remote_ids.len(),
            local_ids.len(),
            new_ids.len(),
            removed_ids.len()
        );

        // gone remotely means fulfilled, expired or deleted; all three look
        // the same from here and all three mean "drop it"
        snapshot.retain_ids(&remote_ids);

        let new_raws = remote
            .into_iter()
            .filter(|raw| new_ids.contains(&raw.contract_id))
            .collect_vec();
        let expanded = self.engine.expand_all(new_raws).await?;
        snapshot.merge(expanded);

        let snapshot = snapshot.sorted_by_id();
        self.contracts.save_snapshot(&snapshot).await?;

        let filtered = FilteredProjection::from_snapshot(&snapshot);
        event!(Level::INFO, "Filtered projection holds {} of {} contracts", filtered.contracts.len(), snapshot.len());
        self.contracts.save_filtered(&filtered).await?;

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expansion::ExpansionTuning;
    use crate::in_memory_esi::InMemoryEsi;
    use crate::reqwest_helpers::RateLimitMeter;
    use crate::test_objects;
    use cw_store::{CacheBmcTrait, ContractBmcTrait, InMemoryCacheBmc, InMemoryContractBmc};

    const REGION: i64 = 10000002;

    fn engine(esi: Arc<InMemoryEsi>, cache: Arc<InMemoryCacheBmc>) -> ExpansionEngine {
        ExpansionEngine::new(esi, cache, RateLimitMeter::new()).with_tuning(ExpansionTuning {
            batch_size: 2,
            concurrency: 2,
            ..Default::default()
        })
    }

    fn seed_contract(esi: &InMemoryEsi, contract_id: i64, type_id: i64) {
        esi.add_contract(
            REGION,
            test_objects::raw_exchange_contract(contract_id, 90000001, 98000001, 60003760, 100.0),
            vec![test_objects::raw_copy_item(type_id, 1)],
        );
    }

    #[tokio::test]
    async fn removed_ids_are_pruned_and_new_ids_expanded() {
        let esi = InMemoryEsi::new();
        esi.add_blueprint_type(691, "Raven Blueprint");
        seed_contract(&esi, 1, 691); // A
        seed_contract(&esi, 2, 691); // B

        let esi = Arc::new(esi);
        let cache = Arc::new(InMemoryCacheBmc::new());
        let contracts = Arc::new(InMemoryContractBmc::new());

        let sync = ContractSync::new(esi.clone(), contracts.clone(), engine(esi.clone(), cache.clone()), RegionId(REGION));

        // first cycle: local snapshot becomes {A, B}
        let snapshot = sync.sync().await.unwrap();
        assert_eq!(
            snapshot.ids(),
            [ContractId(1), ContractId(2)].into_iter().collect()
        );

        // remote catalog moves to {B, C}
        esi.remove_contract(REGION, ContractId(1));
        seed_contract(&esi, 3, 691); // C

        let items_before = esi.item_calls();
        let snapshot = sync.sync().await.unwrap();

        assert_eq!(
            snapshot.ids(),
            [ContractId(2), ContractId(3)].into_iter().collect()
        );
        // only C was expanded; B survived from the previous cycle
        assert_eq!(esi.item_calls() - items_before, 1);
    }

    #[tokio::test]
    async fn sync_is_idempotent_when_the_remote_is_unchanged() {
        let esi = InMemoryEsi::new();
        esi.add_blueprint_type(691, "Raven Blueprint");
        esi.set_name(90000001, "Alice");
        seed_contract(&esi, 1, 691);
        seed_contract(&esi, 2, 691);

        let esi = Arc::new(esi);
        let cache = Arc::new(InMemoryCacheBmc::new());
        let contracts = Arc::new(InMemoryContractBmc::new());

        let sync = ContractSync::new(esi.clone(), contracts.clone(), engine(esi.clone(), cache.clone()), RegionId(REGION));

        let first = sync.sync().await.unwrap();

        let items_before = esi.item_calls();
        let second = sync.sync().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(esi.item_calls(), items_before);
    }

    #[tokio::test]
    async fn filtered_projection_is_rebuilt_from_the_snapshot() {
        let esi = InMemoryEsi::new();
        esi.add_blueprint_type(691, "Raven Blueprint");
        esi.add_ship_type(638, "Raven");

        seed_contract(&esi, 1, 691);
        esi.add_contract(
            REGION,
            test_objects::raw_exchange_contract(2, 90000001, 98000001, 60003760, 50.0),
            vec![test_objects::raw_plain_item(638, 1)],
        );

        let esi = Arc::new(esi);
        let cache = Arc::new(InMemoryCacheBmc::new());
        let contracts = Arc::new(InMemoryContractBmc::new());

        let sync = ContractSync::new(esi.clone(), contracts.clone(), engine(esi.clone(), cache.clone()), RegionId(REGION));
        sync.sync().await.unwrap();

        let filtered = contracts.load_filtered().await;
        assert_eq!(
            filtered.contracts.iter().map(|c| c.contract_id).collect_vec(),
            vec![ContractId(1)]
        );

        // expansion fed the persistent type cache along the way
        assert!(cache.get_type_metadata(cw_domain::TypeId(691)).await.is_some());
    }
}
