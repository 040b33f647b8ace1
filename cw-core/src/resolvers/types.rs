use crate::esi_client::EsiClientTrait;
use anyhow::Result;
use cw_domain::{BlueprintVariant, TypeId, TypeMetadata};
use cw_store::CacheBmcTrait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Resolves item types to name/group/category, backed by the persistent type
/// cache. Fresh resolutions are buffered in a per-batch delta and merged into
/// the shared cache only after the concurrent batch completes; concurrent
/// expansion tasks never write the shared map.
#[derive(Debug, Clone)]
pub struct TypeResolver {
    client: Arc<dyn EsiClientTrait>,
    cache: Arc<dyn CacheBmcTrait>,
    delta: Arc<RwLock<HashMap<i64, TypeMetadata>>>,
}

impl TypeResolver {
    pub fn new(client: Arc<dyn EsiClientTrait>, cache: Arc<dyn CacheBmcTrait>) -> Self {
        Self {
            client,
            cache,
            delta: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn resolve(&self, type_id: TypeId) -> Option<TypeMetadata> {
        if type_id.0 <= 0 {
            return None;
        }

        if let Some(metadata) = self.delta.read().unwrap().get(&type_id.0).cloned() {
            return Some(metadata);
        }

        if let Some(metadata) = self.cache.get_type_metadata(type_id).await {
            return Some(metadata);
        }

        let type_info = self.client.get_type(type_id).await.ok()??;
        let group_info = self.client.get_group(type_info.group_id).await.ok()??;

        let metadata = TypeMetadata {
            name: type_info.name,
            group_id: type_info.group_id,
            category_id: group_info.category_id,
        };

        self.delta.write().unwrap().insert(type_id.0, metadata.clone());

        Some(metadata)
    }

    /// Drains the resolutions buffered since the last call. The expansion
    /// engine merges this into the shared cache between batches.
    pub fn take_delta(&self) -> HashMap<i64, TypeMetadata> {
        std::mem::take(&mut *self.delta.write().unwrap())
    }

    /// Merges the buffered delta into the shared cache and persists it. The
    /// expansion engine merges per batch and flushes once per run instead;
    /// this is for one-shot scans that own their whole lifecycle.
    pub async fn commit_delta(&self) -> Result<()> {
        let delta = self.take_delta();
        if delta.is_empty() {
            return Ok(());
        }
        self.cache.merge_type_metadata(delta).await;
        self.cache.flush().await
    }

    /// An explicit copy flag wins outright. An unflagged item is an Original
    /// only if its resolved category says it is a blueprint; this catches
    /// originals that a quantity heuristic would misclassify, and anything
    /// unresolvable stays a non-blueprint.
    pub fn classify(metadata: Option<&TypeMetadata>, is_blueprint_copy: bool) -> BlueprintVariant {
        if is_blueprint_copy {
            return BlueprintVariant::Copy;
        }
        match metadata {
            Some(metadata) if metadata.is_blueprint() => BlueprintVariant::Original,
            _ => BlueprintVariant::None,
        }
    }
}
