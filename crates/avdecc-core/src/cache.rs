// ── Entity model cache ──
//
// Static models keyed by entity model id, shared by every entity of the
// same model. Owned by whoever constructs the controller and passed in as
// an `Arc`, so several controllers (or tests) can share or isolate caches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use avdecc_api::{ConfigurationIndex, EntityModelId};
use parking_lot::Mutex;
use tracing::debug;

use crate::model::EntityNode;
use crate::model::sanity;

/// Vendor id reserved for "no vendor".
const INVALID_VENDOR_ID: u32 = 0x00FF_FFFF;

#[derive(Debug, Clone)]
struct CachedModel {
    /// Every configuration was fully read, not only the active one.
    is_full_model: bool,
    tree: EntityNode,
}

/// Process-wide cache of static entity models.
#[derive(Debug)]
pub struct EntityModelCache {
    enabled: AtomicBool,
    models: Mutex<HashMap<EntityModelId, CachedModel>>,
}

impl Default for EntityModelCache {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityModelCache {
    /// New, enabled, empty cache.
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            models: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    /// A model id is cacheable only when it carries a real vendor id.
    pub fn is_valid_entity_model_id(entity_model_id: EntityModelId) -> bool {
        let vendor = entity_model_id.vendor_id();
        vendor != 0 && vendor != INVALID_VENDOR_ID
    }

    /// Cached model for `entity_model_id`, if present and the cache is
    /// enabled.
    pub fn get_cached_entity_model(&self, entity_model_id: EntityModelId) -> Option<EntityNode> {
        if !self.is_enabled() || !Self::is_valid_entity_model_id(entity_model_id) {
            return None;
        }
        self.models
            .lock()
            .get(&entity_model_id)
            .map(|cached| cached.tree.clone())
    }

    /// Whether the cached model for `entity_model_id` holds a complete
    /// descriptor tree for `configuration_index`.
    pub fn is_model_valid_for_configuration(
        &self,
        entity_model_id: EntityModelId,
        configuration_index: ConfigurationIndex,
    ) -> bool {
        if !self.is_enabled() || !Self::is_valid_entity_model_id(entity_model_id) {
            return false;
        }
        let models = self.models.lock();
        let Some(cached) = models.get(&entity_model_id) else {
            return false;
        };
        cached
            .tree
            .configurations
            .get(&configuration_index)
            .is_some_and(|configuration| {
                sanity::check_counts(configuration_index, configuration).is_ok()
            })
    }

    /// Store a model. An existing entry is only replaced when the new
    /// model is full and the cached one is not. Returns `true` when the
    /// cache changed.
    pub fn cache_entity_model(
        &self,
        entity_model_id: EntityModelId,
        tree: EntityNode,
        is_full_model: bool,
    ) -> bool {
        if !self.is_enabled() || !Self::is_valid_entity_model_id(entity_model_id) {
            return false;
        }
        let mut models = self.models.lock();
        let keep_existing = models
            .get(&entity_model_id)
            .is_some_and(|existing| existing.is_full_model || !is_full_model);
        if keep_existing {
            return false;
        }
        debug!(%entity_model_id, is_full_model, "caching entity model");
        models.insert(entity_model_id, CachedModel { is_full_model, tree });
        true
    }

    pub fn len(&self) -> usize {
        self.models.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.lock().is_empty()
    }

    pub fn clear(&self) {
        self.models.lock().clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use avdecc_api::{ConfigurationDescriptor, EntityDescriptor};

    use super::*;
    use crate::model::ConfigurationNode;

    const MODEL: EntityModelId = EntityModelId::new(0x001B_92FF_FE00_0001);

    fn tree(name: &str) -> EntityNode {
        let mut tree = EntityNode::from_descriptor(EntityDescriptor {
            entity_name: name.into(),
            configurations_count: 1,
            ..EntityDescriptor::default()
        });
        tree.configurations
            .insert(0, ConfigurationNode::new(ConfigurationDescriptor::default()));
        tree
    }

    #[test]
    fn rejects_unassigned_vendor_ids() {
        assert!(!EntityModelCache::is_valid_entity_model_id(EntityModelId::new(0)));
        assert!(!EntityModelCache::is_valid_entity_model_id(EntityModelId::new(
            0xFFFF_FF00_0000_0001
        )));
        assert!(EntityModelCache::is_valid_entity_model_id(MODEL));

        let cache = EntityModelCache::new();
        assert!(!cache.cache_entity_model(EntityModelId::new(1), tree("a"), true));
        assert!(cache.is_empty());
    }

    #[test]
    fn lookups_ignore_unassigned_vendor_ids() {
        let cache = EntityModelCache::new();
        let unassigned = EntityModelId::new(0x00FF_FFFF_0000_0001);
        cache.models.lock().insert(
            unassigned,
            CachedModel {
                is_full_model: true,
                tree: tree("stray"),
            },
        );

        assert!(cache.get_cached_entity_model(unassigned).is_none());
        assert!(!cache.is_model_valid_for_configuration(unassigned, 0));
    }

    #[test]
    fn partial_model_is_upgraded_but_full_model_is_kept() {
        let cache = EntityModelCache::new();
        assert!(cache.cache_entity_model(MODEL, tree("partial"), false));
        assert!(!cache.cache_entity_model(MODEL, tree("partial again"), false));
        assert!(cache.cache_entity_model(MODEL, tree("full"), true));
        assert!(!cache.cache_entity_model(MODEL, tree("other full"), true));
        assert_eq!(
            cache.get_cached_entity_model(MODEL).unwrap().static_model.entity_name,
            "full"
        );
    }

    #[test]
    fn disabled_cache_reads_nothing() {
        let cache = EntityModelCache::new();
        cache.cache_entity_model(MODEL, tree("x"), true);
        assert!(cache.is_model_valid_for_configuration(MODEL, 0));
        assert!(!cache.is_model_valid_for_configuration(MODEL, 1));

        cache.disable();
        assert!(cache.get_cached_entity_model(MODEL).is_none());
        assert!(!cache.is_model_valid_for_configuration(MODEL, 0));
        cache.enable();
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
