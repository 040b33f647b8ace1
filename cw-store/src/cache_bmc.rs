use crate::FileStore;
use anyhow::Result;
use async_trait::async_trait;
use cw_domain::{LocationId, RegionId, TypeId, TypeMetadata};
use mockall::automock;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::RwLock;

const REGIONS_DOCUMENT: &str = "location_regions.json";
const TYPES_DOCUMENT: &str = "type_metadata.json";

/// The two persistent resolver caches: location -> region and type -> metadata.
/// Both grow monotonically; an existing key is never rewritten or evicted.
/// Name resolutions are deliberately not kept here, names can change.
#[automock]
#[async_trait]
pub trait CacheBmcTrait: Send + Sync + Debug {
    async fn get_region(&self, location_id: LocationId) -> Option<RegionId>;
    async fn get_type_metadata(&self, type_id: TypeId) -> Option<TypeMetadata>;

    /// Bulk-inserts a delta collected by one expansion batch. Keys already
    /// present keep their value.
    async fn merge_regions(&self, delta: HashMap<i64, RegionId>);
    async fn merge_type_metadata(&self, delta: HashMap<i64, TypeMetadata>);

    async fn flush(&self) -> Result<()>;
}

#[derive(Debug)]
pub struct FileCacheBmc {
    store: FileStore,
    regions: RwLock<HashMap<i64, RegionId>>,
    types: RwLock<HashMap<i64, TypeMetadata>>,
}

impl FileCacheBmc {
    pub async fn load(store: FileStore) -> Self {
        let regions = store.load_document(REGIONS_DOCUMENT).await.unwrap_or_default();
        let types = store.load_document(TYPES_DOCUMENT).await.unwrap_or_default();
        Self {
            store,
            regions: RwLock::new(regions),
            types: RwLock::new(types),
        }
    }
}

#[async_trait]
impl CacheBmcTrait for FileCacheBmc {
    async fn get_region(&self, location_id: LocationId) -> Option<RegionId> {
        self.regions.read().unwrap().get(&location_id.0).copied()
    }

    async fn get_type_metadata(&self, type_id: TypeId) -> Option<TypeMetadata> {
        self.types.read().unwrap().get(&type_id.0).cloned()
    }

    async fn merge_regions(&self, delta: HashMap<i64, RegionId>) {
        let mut regions = self.regions.write().unwrap();
        for (location_id, region_id) in delta {
            regions.entry(location_id).or_insert(region_id);
        }
    }

    async fn merge_type_metadata(&self, delta: HashMap<i64, TypeMetadata>) {
        let mut types = self.types.write().unwrap();
        for (type_id, metadata) in delta {
            types.entry(type_id).or_insert(metadata);
        }
    }

    async fn flush(&self) -> Result<()> {
        let regions = self.regions.read().unwrap().clone();
        let types = self.types.read().unwrap().clone();
        self.store.save_document(REGIONS_DOCUMENT, &regions).await?;
        self.store.save_document(TYPES_DOCUMENT, &types).await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCacheBmc {
    regions: RwLock<HashMap<i64, RegionId>>,
    types: RwLock<HashMap<i64, TypeMetadata>>,
}

impl InMemoryCacheBmc {
    pub fn new() -> Self {
        Default::default()
    }
}

#[async_trait]
impl CacheBmcTrait for InMemoryCacheBmc {
    async fn get_region(&self, location_id: LocationId) -> Option<RegionId> {
        self.regions.read().unwrap().get(&location_id.0).copied()
    }

    async fn get_type_metadata(&self, type_id: TypeId) -> Option<TypeMetadata> {
        self.types.read().unwrap().get(&type_id.0).cloned()
    }

    async fn merge_regions(&self, delta: HashMap<i64, RegionId>) {
        let mut regions = self.regions.write().unwrap();
        for (location_id, region_id) in delta {
            regions.entry(location_id).or_insert(region_id);
        }
    }

    async fn merge_type_metadata(&self, delta: HashMap<i64, TypeMetadata>) {
        let mut types = self.types.write().unwrap();
        for (type_id, metadata) in delta {
            types.entry(type_id).or_insert(metadata);
        }
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
