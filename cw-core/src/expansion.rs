use crate::esi_client::EsiClientTrait;
use crate::reqwest_helpers::RateLimitMeter;
use crate::resolvers::{NameResolver, TypeResolver};
use anyhow::Result;
use cw_domain::{
    Contract, ContractItem, ContractStatus, LocationId, RawContract, UNKNOWN_NAME,
};
use cw_store::CacheBmcTrait;
use futures::future::join_all;
use itertools::Itertools;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{event, warn, Level};

/// Tunable parameters of the expansion feedback loop. The engine starts at
/// the conservative defaults and walks them toward whatever the remote API's
/// current rate-limit budget allows.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpansionTuning {
    pub batch_size: usize,
    pub concurrency: usize,
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    pub min_concurrency: usize,
    pub max_concurrency: usize,
    /// A batch slower than this shrinks both parameters.
    pub slow_batch: Duration,
    /// A batch faster than this with zero rate limits grows both parameters.
    pub fast_batch: Duration,
    pub rate_limit_threshold: u32,
    pub shrink_factor: f64,
    pub grow_factor: f64,
}

impl Default for ExpansionTuning {
    fn default() -> Self {
        Self {
            batch_size: 20,
            concurrency: 5,
            min_batch_size: 5,
            max_batch_size: 200,
            min_concurrency: 2,
            max_concurrency: 40,
            slow_batch: Duration::from_secs(20),
            fast_batch: Duration::from_secs(5),
            rate_limit_threshold: 3,
            shrink_factor: 0.75,
            grow_factor: 1.25,
        }
    }
}

/// Rate-limit pressure outranks the timing signals; a rate-limited batch is
/// often also a slow one and must not be punished twice.
pub fn adjust_tuning(tuning: &mut ExpansionTuning, elapsed: Duration, rate_limited: u32) {
    if rate_limited >= tuning.rate_limit_threshold {
        tuning.concurrency = (tuning.concurrency / 2).max(tuning.min_concurrency);
    } else if elapsed > tuning.slow_batch {
        tuning.batch_size = scale(tuning.batch_size, tuning.shrink_factor).clamp(tuning.min_batch_size, tuning.max_batch_size);
        tuning.concurrency = scale(tuning.concurrency, tuning.shrink_factor).clamp(tuning.min_concurrency, tuning.max_concurrency);
    } else if elapsed < tuning.fast_batch && rate_limited == 0 {
        tuning.batch_size = scale(tuning.batch_size, tuning.grow_factor).clamp(tuning.min_batch_size, tuning.max_batch_size);
        tuning.concurrency = scale(tuning.concurrency, tuning.grow_factor).clamp(tuning.min_concurrency, tuning.max_concurrency);
    }
}

fn scale(value: usize, factor: f64) -> usize {
    (value as f64 * factor).round() as usize
}

/// Turns raw catalog entries into enriched contracts: issuer/corporation
/// names, per-item type metadata, and the blueprint variant tag. Runs records
/// concurrently in adaptively sized batches.
#[derive(Debug)]
pub struct ExpansionEngine {
    client: Arc<dyn EsiClientTrait>,
    cache: Arc<dyn CacheBmcTrait>,
    names: NameResolver,
    types: TypeResolver,
    meter: RateLimitMeter,
    tuning: Mutex<ExpansionTuning>,
}

impl ExpansionEngine {
    pub fn new(client: Arc<dyn EsiClientTrait>, cache: Arc<dyn CacheBmcTrait>, meter: RateLimitMeter) -> Self {
        Self {
            names: NameResolver::new(Arc::clone(&client)),
            types: TypeResolver::new(Arc::clone(&client), Arc::clone(&cache)),
            client,
            cache,
            meter,
            tuning: Mutex::new(ExpansionTuning::default()),
        }
    }

    pub fn with_tuning(self, tuning: ExpansionTuning) -> Self {
        *self.tuning.lock().unwrap() = tuning;
        self
    }

    pub fn current_tuning(&self) -> ExpansionTuning {
        self.tuning.lock().unwrap().clone()
    }

    /// Expands everything in `raws`, dropping individual failures with a
    /// logged cause. Freshly resolved cache entries are merged after each
    /// batch and persisted once at the end of the run.
    pub async fn expand_all(&self, raws: Vec<RawContract>) -> Result<Vec<Contract>> {
        let total = raws.len();
        let mut remaining = raws;
        let mut expanded = Vec::with_capacity(total);

        // pressure recorded before this run belongs to somebody else
        let _ = self.meter.take();

        while !remaining.is_empty() {
            let (batch_size, concurrency) = {
                let tuning = self.tuning.lock().unwrap();
                (tuning.batch_size, tuning.concurrency)
            };

            let batch: Vec<RawContract> = remaining.drain(..batch_size.min(remaining.len())).collect();
            let batch_len = batch.len();
            let started = Instant::now();

            // one bulk call covers every issuer and corporation in the batch
            let name_ids = batch
                .iter()
                .flat_map(|raw| [raw.issuer_id.0, raw.issuer_corporation_id.0])
                .collect_vec();
            let names = self.names.resolve_many(name_ids).await;

            let semaphore = Arc::new(Semaphore::new(concurrency));
            let results = join_all(batch.into_iter().map(|raw| {
                let semaphore = Arc::clone(&semaphore);
                let names = &names;
                async move {
                    let _permit = semaphore.acquire().await.expect("expansion semaphore closed");
                    let contract_id = raw.contract_id;
                    (contract_id, self.expand_one(raw, names).await)
                }
            }))
            .await;

            for (contract_id, result) in results {
                match result {
                    Ok(contract) => expanded.push(contract),
                    Err(e) => warn!("Skipping contract {}: {:#}", contract_id.0, e),
                }
            }

            // single writer: the per-batch delta lands in the shared cache
            // only after every task of the batch has finished
            let delta = self.types.take_delta();
            if !delta.is_empty() {
                self.cache.merge_type_metadata(delta).await;
            }

            let elapsed = started.elapsed();
            let rate_limited = self.meter.take();

            let mut tuning = self.tuning.lock().unwrap();
            adjust_tuning(&mut tuning, elapsed, rate_limited);
            event!(
                Level::DEBUG,
                "Expanded batch of {} in {:?} ({} rate-limited); next batch_size={} concurrency={}",
                batch_len,
                elapsed,
                rate_limited,
                tuning.batch_size,
                tuning.concurrency
            );
        }

        self.cache.flush().await?;

        event!(Level::INFO, "Expanded {} of {} contracts", expanded.len(), total);
        Ok(expanded)
    }

    async fn expand_one(&self, raw: RawContract, names: &HashMap<i64, String>) -> Result<Contract> {
        let raw_items = self.client.get_contract_items(raw.contract_id).await?;

        let mut items = Vec::with_capacity(raw_items.len());
        for raw_item in raw_items.into_iter().filter(|item| item.is_included) {
            let metadata = self.types.resolve(raw_item.type_id).await;
            let is_blueprint_copy = raw_item.is_blueprint_copy.unwrap_or(false);
            let variant = TypeResolver::classify(metadata.as_ref(), is_blueprint_copy);

            let (material_efficiency, time_efficiency) = if variant.is_blueprint() {
                (raw_item.material_efficiency, raw_item.time_efficiency)
            } else {
                (None, None)
            };

            items.push(ContractItem {
                type_id: raw_item.type_id,
                name: metadata.map(|m| m.name).unwrap_or_else(|| UNKNOWN_NAME.to_string()),
                quantity: raw_item.quantity,
                is_blueprint_copy,
                variant,
                material_efficiency,
                time_efficiency,
            });
        }

        let lookup_name = |id: i64| names.get(&id).cloned().unwrap_or_else(|| UNKNOWN_NAME.to_string());

        Ok(Contract {
            contract_id: raw.contract_id,
            kind: raw.kind,
            status: ContractStatus::Outstanding,
            issuer_name: lookup_name(raw.issuer_id.0),
            issuer_corporation_name: lookup_name(raw.issuer_corporation_id.0),
            issuer_id: raw.issuer_id,
            issuer_corporation_id: raw.issuer_corporation_id,
            start_location_id: raw.start_location_id.unwrap_or(LocationId(0)),
            price: raw.price,
            title: raw.title,
            date_issued: raw.date_issued,
            item_count: items.len(),
            items,
        })
    }
}
