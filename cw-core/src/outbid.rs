use crate::esi_client::EsiClientTrait;
use crate::pagination::{fetch_all_pages, PageLimits};
use crate::resolvers::{LocationResolver, TypeResolver};
use anyhow::Result;
use cw_domain::{
    CompetitionFilters, Contract, ContractId, ContractItem, ContractKind, ContractStatus,
    RawContract,
};
use futures::future::join_all;
use itertools::Itertools;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Answers "is this listing undercut by a cheaper competing listing for the
/// same item in the same region?". Competition is scoped per region, and an
/// Original is never a competitor to a Copy of the same type.
pub struct OutbidCheck {
    client: Arc<dyn EsiClientTrait>,
    locations: LocationResolver,
    types: TypeResolver,
    limits: PageLimits,
}

/// How far past the target price the remote fallback keeps scanning. A
/// competitor that expensive cannot undercut anything.
const REMOTE_PRICE_CEILING_FACTOR: f64 = 2.0;

impl OutbidCheck {
    pub fn new(client: Arc<dyn EsiClientTrait>, locations: LocationResolver, types: TypeResolver) -> Self {
        Self {
            client,
            locations,
            types,
            limits: PageLimits::default(),
        }
    }

    /// Scans the supplied catalog (snapshot or filtered projection) and
    /// returns whether a cheaper competitor exists, together with the lowest
    /// competing unit price. Inputs that cannot be analyzed answer
    /// `(false, None)` rather than erroring.
    pub async fn is_outbid(&self, target: &Contract, catalog: &[Contract], filters: &CompetitionFilters) -> (bool, Option<f64>) {
        let Some((target_item, target_unit_price)) = Self::analyzable(target) else {
            return (false, None);
        };

        let Some(region_id) = self.locations.resolve(target.start_location_id).await else {
            debug!("Cannot place contract {} in a region, skipping analysis", target.contract_id.0);
            return (false, None);
        };

        let mut cheapest: Option<f64> = None;

        for candidate in catalog {
            if !Self::is_candidate(target, candidate, filters) {
                continue;
            }

            let Some(item) = candidate.single_item() else {
                continue;
            };
            if item.type_id != target_item.type_id || item.variant != target_item.variant {
                continue;
            }

            let Some(unit_price) = candidate.unit_price() else {
                continue;
            };

            let Some(candidate_region) = self.locations.resolve(candidate.start_location_id).await else {
                continue;
            };
            if candidate_region != region_id {
                continue;
            }

            if unit_price < target_unit_price {
                cheapest = Some(cheapest.map_or(unit_price, |current: f64| current.min(unit_price)));
            }
        }

        (cheapest.is_some(), cheapest)
    }

    /// Cold-cache fallback: pages the remote catalog of the target's region
    /// directly, cheapest first, and stops once prices pass the ceiling.
    /// Functionally equivalent to [`Self::is_outbid`] but far heavier on
    /// network calls; the snapshot path is the primary one.
    pub async fn is_outbid_via_remote(&self, target: &Contract, filters: &CompetitionFilters) -> Result<(bool, Option<f64>)> {
        let Some((target_item, target_unit_price)) = Self::analyzable(target) else {
            return Ok((false, None));
        };

        let Some(region_id) = self.locations.resolve(target.start_location_id).await else {
            return Ok((false, None));
        };

        let raws: Vec<RawContract> = fetch_all_pages(
            |page| self.client.list_public_contracts_page(region_id, page),
            self.limits.clone(),
        )
        .await?;

        let price_ceiling = target.price * REMOTE_PRICE_CEILING_FACTOR;
        let candidates = raws
            .into_iter()
            .filter(|raw| {
                raw.kind == ContractKind::ItemExchange
                    && raw.contract_id != target.contract_id
                    && raw.issuer_id != target.issuer_id
                    && raw.price > 0.0
            })
            .sorted_by(|a, b| a.price.total_cmp(&b.price))
            .collect_vec();

        let mut cheapest: Option<f64> = None;

        for raw in candidates {
            if raw.price > price_ceiling {
                break;
            }
            if let Some(allow_list) = &filters.issuer_allow_list {
                if !allow_list.contains(&raw.issuer_id) {
                    continue;
                }
            }
            // names are not resolved on this path; the substring filter only
            // sees the raw title
            if let Some(needle) = &filters.issuer_substring {
                if !raw.title.to_lowercase().contains(&needle.to_lowercase()) {
                    continue;
                }
            }

            let Ok(raw_items) = self.client.get_contract_items(raw.contract_id).await else {
                continue;
            };
            let included = raw_items.into_iter().filter(|item| item.is_included).collect_vec();
            let [raw_item] = included.as_slice() else {
                continue;
            };
            if raw_item.type_id != target_item.type_id || raw_item.quantity <= 0 {
                continue;
            }

            let metadata = self.types.resolve(raw_item.type_id).await;
            let variant = TypeResolver::classify(metadata.as_ref(), raw_item.is_blueprint_copy.unwrap_or(false));
            if variant != target_item.variant {
                continue;
            }

            let unit_price = raw.price / raw_item.quantity as f64;
            if unit_price < target_unit_price {
                cheapest = Some(cheapest.map_or(unit_price, |current: f64| current.min(unit_price)));
            }
        }

        // types first seen during this scan go into the persistent cache too
        if let Err(e) = self.types.commit_delta().await {
            warn!("Failed to persist type metadata resolved during the fallback scan: {:#}", e);
        }

        Ok((cheapest.is_some(), cheapest))
    }

    /// Runs [`Self::is_outbid`] for a batch of own contracts under a bounded
    /// concurrency limit.
    pub async fn check_many(
        &self,
        targets: &[Contract],
        catalog: &[Contract],
        filters: &CompetitionFilters,
        concurrency: usize,
    ) -> Vec<(ContractId, bool, Option<f64>)> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

        join_all(targets.iter().map(|target| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire().await.expect("outbid semaphore closed");
                let (outbid, price) = self.is_outbid(target, catalog, filters).await;
                (target.contract_id, outbid, price)
            }
        }))
        .await
    }

    /// A contract qualifies for analysis only as an outstanding item
    /// exchange with exactly one line item and positive price and quantity.
    /// Snapshot records are all outstanding today; one carrying any other
    /// status has left the market and is skipped, not errored.
    fn analyzable(target: &Contract) -> Option<(&ContractItem, f64)> {
        if target.kind != ContractKind::ItemExchange || target.status != ContractStatus::Outstanding {
            return None;
        }
        let item = target.single_item()?;
        let unit_price = target.unit_price()?;
        Some((item, unit_price))
    }

    fn is_candidate(target: &Contract, candidate: &Contract, filters: &CompetitionFilters) -> bool {
        candidate.contract_id != target.contract_id
            && candidate.issuer_id != target.issuer_id
            && candidate.kind == ContractKind::ItemExchange
            && candidate.status == ContractStatus::Outstanding
            && filters.passes(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory_esi::InMemoryEsi;
    use crate::test_objects::{raw_copy_item, raw_exchange_contract, single_item_contract};
    use cw_domain::{BlueprintVariant, CharacterId, ContractStatus, LocationId, TypeId};
    use cw_store::{CacheBmcTrait, InMemoryCacheBmc};

    const JITA: i64 = 60003760;
    const AMARR: i64 = 60008494;

    fn checker(esi: Arc<InMemoryEsi>) -> OutbidCheck {
        let cache = Arc::new(InMemoryCacheBmc::new());
        OutbidCheck::new(
            esi.clone(),
            LocationResolver::new(esi.clone(), cache.clone()),
            TypeResolver::new(esi, cache),
        )
    }

    fn two_station_universe() -> InMemoryEsi {
        let esi = InMemoryEsi::new();
        esi.add_station(JITA, 30000142, 20000020, 10000002);
        esi.add_station(AMARR, 30002187, 20000322, 10000043);
        esi
    }

    #[tokio::test]
    async fn a_copy_never_competes_with_an_original() {
        let esi = Arc::new(two_station_universe());
        let check = checker(esi);

        let target = single_item_contract(1, 90000001, JITA, 500, BlueprintVariant::Original, 1000.0, 1);
        let copy = single_item_contract(2, 90000002, JITA, 500, BlueprintVariant::Copy, 500.0, 1);

        let (outbid, price) = check.is_outbid(&target, &[target.clone(), copy], &Default::default()).await;
        assert!(!outbid);
        assert_eq!(price, None);
    }

    #[tokio::test]
    async fn a_cheaper_matching_variant_outbids() {
        let esi = Arc::new(two_station_universe());
        let check = checker(esi);

        let target = single_item_contract(1, 90000001, JITA, 500, BlueprintVariant::Original, 1000.0, 1);
        let rival = single_item_contract(2, 90000002, JITA, 500, BlueprintVariant::Original, 800.0, 1);
        let rival_cheaper = single_item_contract(3, 90000003, JITA, 500, BlueprintVariant::Original, 750.0, 1);

        let (outbid, price) = check
            .is_outbid(&target, &[target.clone(), rival, rival_cheaper], &Default::default())
            .await;

        // scan-to-minimum: the answer is the cheapest competitor, not the first
        assert!(outbid);
        assert_eq!(price, Some(750.0));
    }

    #[tokio::test]
    async fn competition_is_scoped_to_the_region() {
        let esi = Arc::new(two_station_universe());
        let check = checker(esi);

        let target = single_item_contract(1, 90000001, JITA, 500, BlueprintVariant::Copy, 1000.0, 1);
        let elsewhere = single_item_contract(2, 90000002, AMARR, 500, BlueprintVariant::Copy, 100.0, 1);

        let (outbid, _) = check.is_outbid(&target, &[elsewhere], &Default::default()).await;
        assert!(!outbid);
    }

    #[tokio::test]
    async fn own_other_listings_do_not_undercut() {
        let esi = Arc::new(two_station_universe());
        let check = checker(esi);

        let target = single_item_contract(1, 90000001, JITA, 500, BlueprintVariant::Copy, 1000.0, 1);
        let own = single_item_contract(2, 90000001, JITA, 500, BlueprintVariant::Copy, 100.0, 1);

        let (outbid, _) = check.is_outbid(&target, &[own], &Default::default()).await;
        assert!(!outbid);
    }

    #[tokio::test]
    async fn unit_price_comparison_accounts_for_quantity() {
        let esi = Arc::new(two_station_universe());
        let check = checker(esi);

        // 1000 / 1 = 1000 vs 1800 / 2 = 900 per unit
        let target = single_item_contract(1, 90000001, JITA, 500, BlueprintVariant::Copy, 1000.0, 1);
        let bulk = single_item_contract(2, 90000002, JITA, 500, BlueprintVariant::Copy, 1800.0, 2);

        let (outbid, price) = check.is_outbid(&target, &[bulk], &Default::default()).await;
        assert!(outbid);
        assert_eq!(price, Some(900.0));
    }

    #[tokio::test]
    async fn preconditions_short_circuit_to_a_negative_answer() {
        let esi = Arc::new(two_station_universe());
        let check = checker(esi);

        let mut auction = single_item_contract(1, 90000001, JITA, 500, BlueprintVariant::Copy, 1000.0, 1);
        auction.kind = ContractKind::Auction;

        let mut free = single_item_contract(2, 90000001, JITA, 500, BlueprintVariant::Copy, 0.0, 1);
        free.price = 0.0;

        let mut unplaceable = single_item_contract(3, 90000001, 0, 500, BlueprintVariant::Copy, 1000.0, 1);
        unplaceable.start_location_id = LocationId(0);

        let mut finished = single_item_contract(4, 90000001, JITA, 500, BlueprintVariant::Copy, 1000.0, 1);
        finished.status = ContractStatus::Finished;

        let rival = single_item_contract(9, 90000002, JITA, 500, BlueprintVariant::Copy, 1.0, 1);
        let catalog = vec![rival];

        for target in [auction, free, unplaceable, finished] {
            let (outbid, price) = check.is_outbid(&target, &catalog, &Default::default()).await;
            assert!(!outbid);
            assert_eq!(price, None);
        }
    }

    #[tokio::test]
    async fn issuer_allow_list_narrows_the_competitor_set() {
        let esi = Arc::new(two_station_universe());
        let check = checker(esi);

        let target = single_item_contract(1, 90000001, JITA, 500, BlueprintVariant::Copy, 1000.0, 1);
        let rival = single_item_contract(2, 90000002, JITA, 500, BlueprintVariant::Copy, 500.0, 1);

        let filters = CompetitionFilters {
            issuer_allow_list: Some([CharacterId(90000099)].into_iter().collect()),
            issuer_substring: None,
        };

        let (outbid, _) = check.is_outbid(&target, &[rival], &filters).await;
        assert!(!outbid);
    }

    #[tokio::test]
    async fn remote_fallback_matches_the_catalog_answer() {
        let esi = two_station_universe();
        esi.add_blueprint_type(500, "Raven Blueprint");

        // competitor: same type, copy, 800 per unit, in the same region
        esi.add_contract(
            10000002,
            raw_exchange_contract(2, 90000002, 98000002, JITA, 800.0),
            vec![raw_copy_item(500, 1)],
        );
        // decoy far above the price ceiling, never fetched
        esi.add_contract_without_items(10000002, raw_exchange_contract(3, 90000003, 98000003, JITA, 1_000_000.0));

        let esi = Arc::new(esi);
        let check = checker(esi.clone());

        let target = single_item_contract(1, 90000001, JITA, 500, BlueprintVariant::Copy, 1000.0, 1);

        let (outbid, price) = check.is_outbid_via_remote(&target, &Default::default()).await.unwrap();
        assert!(outbid);
        assert_eq!(price, Some(800.0));
        // the decoy beyond the ceiling was skipped without an item fetch
        assert_eq!(esi.item_calls(), 1);
    }

    #[tokio::test]
    async fn fallback_scan_feeds_the_persistent_type_cache() {
        let esi = two_station_universe();
        esi.add_blueprint_type(500, "Raven Blueprint");
        esi.add_contract(
            10000002,
            raw_exchange_contract(2, 90000002, 98000002, JITA, 800.0),
            vec![raw_copy_item(500, 1)],
        );

        let esi = Arc::new(esi);
        let cache = Arc::new(InMemoryCacheBmc::new());
        let check = OutbidCheck::new(
            esi.clone(),
            LocationResolver::new(esi.clone(), cache.clone()),
            TypeResolver::new(esi, cache.clone()),
        );

        let target = single_item_contract(1, 90000001, JITA, 500, BlueprintVariant::Copy, 1000.0, 1);
        check.is_outbid_via_remote(&target, &Default::default()).await.unwrap();

        assert!(cache.get_type_metadata(TypeId(500)).await.is_some());
    }

    #[tokio::test]
    async fn check_many_reports_per_contract_results() {
        let esi = Arc::new(two_station_universe());
        let check = checker(esi);

        let safe = single_item_contract(1, 90000001, JITA, 500, BlueprintVariant::Copy, 100.0, 1);
        let undercut = single_item_contract(2, 90000001, JITA, 501, BlueprintVariant::Copy, 1000.0, 1);
        let rival = single_item_contract(3, 90000002, JITA, 501, BlueprintVariant::Copy, 600.0, 1);

        let catalog = vec![safe.clone(), undercut.clone(), rival];
        let results = check.check_many(&[safe, undercut], &catalog, &Default::default(), 4).await;

        assert_eq!(results[0], (ContractId(1), false, None));
        assert_eq!(results[1], (ContractId(2), true, Some(600.0)));
    }
}
