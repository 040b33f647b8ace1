use crate::FileStore;
use anyhow::Result;
use async_trait::async_trait;
use cw_domain::{ContractSnapshot, FilteredProjection};
use mockall::automock;
use std::fmt::Debug;
use std::sync::RwLock;

const SNAPSHOT_DOCUMENT: &str = "contract_snapshot.json";
const FILTERED_DOCUMENT: &str = "filtered_contracts.json";

#[automock]
#[async_trait]
pub trait ContractBmcTrait: Send + Sync + Debug {
    /// Missing or corrupt snapshot loads as empty; the next sync rebuilds it.
    async fn load_snapshot(&self) -> ContractSnapshot;
    async fn save_snapshot(&self, snapshot: &ContractSnapshot) -> Result<()>;

    async fn load_filtered(&self) -> FilteredProjection;
    async fn save_filtered(&self, filtered: &FilteredProjection) -> Result<()>;
}

#[derive(Debug)]
pub struct FileContractBmc {
    store: FileStore,
}

impl FileContractBmc {
    pub fn new(store: FileStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ContractBmcTrait for FileContractBmc {
    async fn load_snapshot(&self) -> ContractSnapshot {
        self.store
            .load_document(SNAPSHOT_DOCUMENT)
            .await
            .unwrap_or_default()
    }

    async fn save_snapshot(&self, snapshot: &ContractSnapshot) -> Result<()> {
        self.store.save_document(SNAPSHOT_DOCUMENT, snapshot).await
    }

    async fn load_filtered(&self) -> FilteredProjection {
        self.store
            .load_document(FILTERED_DOCUMENT)
            .await
            .unwrap_or_default()
    }

    async fn save_filtered(&self, filtered: &FilteredProjection) -> Result<()> {
        self.store.save_document(FILTERED_DOCUMENT, filtered).await
    }
}

#[derive(Debug, Default)]
pub struct InMemoryContractBmc {
    snapshot: RwLock<ContractSnapshot>,
    filtered: RwLock<FilteredProjection>,
}

impl InMemoryContractBmc {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_snapshot(snapshot: ContractSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
            filtered: Default::default(),
        }
    }
}

#[async_trait]
impl ContractBmcTrait for InMemoryContractBmc {
    async fn load_snapshot(&self) -> ContractSnapshot {
        self.snapshot.read().unwrap().clone()
    }

    async fn save_snapshot(&self, snapshot: &ContractSnapshot) -> Result<()> {
        *self.snapshot.write().unwrap() = snapshot.clone();
        Ok(())
    }

    async fn load_filtered(&self) -> FilteredProjection {
        self.filtered.read().unwrap().clone()
    }

    async fn save_filtered(&self, filtered: &FilteredProjection) -> Result<()> {
        *self.filtered.write().unwrap() = filtered.clone();
        Ok(())
    }
}
