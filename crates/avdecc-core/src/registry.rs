// ── Controlled entity registry ──
//
// Concurrent map of entity id -> per-entity mutex. Lookups clone the
// `Arc` out of the map so the shard guard is released before the entity
// lock is taken; no code path holds two entity locks at once.

use std::sync::Arc;

use avdecc_api::EntityId;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::model::ControlledEntity;

/// Shared handle to one controlled entity.
pub type EntityHandle = Arc<Mutex<ControlledEntity>>;

pub(crate) struct EntityRegistry {
    entities: DashMap<EntityId, EntityHandle>,
    /// Sorted id list, rebuilt on insert/remove for subscribers.
    ids: watch::Sender<Arc<Vec<EntityId>>>,
}

impl EntityRegistry {
    pub(crate) fn new() -> Self {
        let (ids, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            entities: DashMap::new(),
            ids,
        }
    }

    /// Insert a new entity. Returns `None` when the id is already present.
    pub(crate) fn insert(&self, entity: ControlledEntity) -> Option<EntityHandle> {
        let handle = match self.entities.entry(entity.entity_id()) {
            Entry::Occupied(_) => return None,
            Entry::Vacant(slot) => {
                let handle = Arc::new(Mutex::new(entity));
                slot.insert(Arc::clone(&handle));
                handle
            }
        };
        self.rebuild_ids();
        Some(handle)
    }

    pub(crate) fn handle(&self, entity_id: EntityId) -> Option<EntityHandle> {
        self.entities.get(&entity_id).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn remove(&self, entity_id: EntityId) -> Option<EntityHandle> {
        let removed = self.entities.remove(&entity_id).map(|(_, handle)| handle);
        if removed.is_some() {
            self.rebuild_ids();
        }
        removed
    }

    pub(crate) fn contains(&self, entity_id: EntityId) -> bool {
        self.entities.contains_key(&entity_id)
    }

    pub(crate) fn ids(&self) -> Vec<EntityId> {
        self.ids.borrow().as_ref().clone()
    }

    pub(crate) fn handles(&self) -> Vec<EntityHandle> {
        self.entities.iter().map(|r| Arc::clone(r.value())).collect()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<EntityId>>> {
        self.ids.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.entities.len()
    }

    fn rebuild_ids(&self) {
        let mut ids: Vec<EntityId> = self.entities.iter().map(|r| *r.key()).collect();
        ids.sort_unstable();
        self.ids.send_replace(Arc::new(ids));
    }
}
