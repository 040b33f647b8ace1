use crate::esi_client::EsiClientTrait;
use itertools::Itertools;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Cap the bulk name endpoint imposes per call.
const NAME_BATCH_SIZE: usize = 1000;

/// Batch-resolves character/corporation ids to display names. Memoized for
/// the lifetime of the run only; names can legitimately change, so they are
/// never written to disk (unlike the region and type caches).
#[derive(Debug, Clone)]
pub struct NameResolver {
    client: Arc<dyn EsiClientTrait>,
    memo: Arc<RwLock<HashMap<i64, String>>>,
    batch_size: usize,
}

impl NameResolver {
    pub fn new(client: Arc<dyn EsiClientTrait>) -> Self {
        Self {
            client,
            memo: Arc::new(RwLock::new(HashMap::new())),
            batch_size: NAME_BATCH_SIZE,
        }
    }

    #[cfg(test)]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Ids the remote cannot resolve are simply absent from the result;
    /// callers supply their own default. A failing bulk call degrades to
    /// per-id lookups so one bad entity cannot blank out a whole batch.
    pub async fn resolve_many(&self, ids: impl IntoIterator<Item = i64>) -> HashMap<i64, String> {
        let mut resolved = HashMap::new();
        let mut unresolved = Vec::new();

        {
            let memo = self.memo.read().unwrap();
            for id in ids.into_iter().unique() {
                if id <= 0 {
                    continue;
                }
                match memo.get(&id) {
                    Some(name) => {
                        resolved.insert(id, name.clone());
                    }
                    None => unresolved.push(id),
                }
            }
        }

        for chunk in unresolved.chunks(self.batch_size) {
            match self.client.resolve_names(chunk).await {
                Ok(entries) => self.insert_entries(&mut resolved, entries),
                Err(e) => {
                    warn!("Bulk name resolution failed for {} ids, retrying individually: {:#}", chunk.len(), e);
                    for id in chunk {
                        match self.client.resolve_names(&[*id]).await {
                            Ok(entries) => self.insert_entries(&mut resolved, entries),
                            Err(e) => debug!("Leaving id {} unresolved: {:#}", id, e),
                        }
                    }
                }
            }
        }

        resolved
    }

    fn insert_entries(&self, resolved: &mut HashMap<i64, String>, entries: Vec<cw_domain::NameEntry>) {
        let mut memo = self.memo.write().unwrap();
        for entry in entries {
            memo.insert(entry.id, entry.name.clone());
            resolved.insert(entry.id, entry.name);
        }
    }
}
