use crate::esi_client::EsiClientTrait;
use cw_domain::{LocationId, RegionId};
use cw_store::CacheBmcTrait;
use std::sync::Arc;
use tracing::warn;

/// Resolves a contract's start location to the enclosing market region by
/// walking location -> system -> constellation -> region. Resolved regions
/// are persisted immediately; the hierarchy never changes, so a cached entry
/// is good forever.
#[derive(Debug, Clone)]
pub struct LocationResolver {
    client: Arc<dyn EsiClientTrait>,
    cache: Arc<dyn CacheBmcTrait>,
}

impl LocationResolver {
    pub fn new(client: Arc<dyn EsiClientTrait>, cache: Arc<dyn CacheBmcTrait>) -> Self {
        Self { client, cache }
    }

    /// `None` when the id is unset or any hop of the walk comes back empty.
    /// Transport retries live below this layer; a hop that still fails after
    /// them aborts the chain.
    pub async fn resolve(&self, location_id: LocationId) -> Option<RegionId> {
        if location_id.0 <= 0 {
            return None;
        }

        if let Some(region_id) = self.cache.get_region(location_id).await {
            return Some(region_id);
        }

        let system_id = if location_id.is_structure() {
            self.client.get_structure(location_id.0).await.ok()??.solar_system_id
        } else {
            self.client.get_station(location_id.0).await.ok()??.system_id
        };

        let constellation_id = self.client.get_system(system_id).await.ok()??.constellation_id;
        let region_id = self.client.get_constellation(constellation_id).await.ok()??.region_id;

        self.cache
            .merge_regions([(location_id.0, region_id)].into_iter().collect())
            .await;
        if let Err(e) = self.cache.flush().await {
            warn!("Failed to persist the region cache: {:#}", e);
        }

        Some(region_id)
    }
}
