// ── Exclusive access tokens ──
//
// RAII handles over an Acquire or Lock. Several holders may share one
// entity's access; the Release/Unlock goes out when the last token of an
// (entity, family) pair is dropped. A release that collides with an
// access operation still in flight waits for that operation to finish.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use avdecc_api::EntityId;
use parking_lot::Mutex;
use strum::Display;
use tracing::{debug, warn};

use crate::controller::{Controller, ControllerInner};
use crate::error::CoreError;
use crate::model::{AcquireState, LockState};
use crate::pending::AccessOp;

/// Kind of exclusive access a token holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum AccessType {
    Acquire,
    PersistentAcquire,
    Lock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum AccessFamily {
    Acquire,
    Lock,
}

impl AccessType {
    pub(crate) fn family(self) -> AccessFamily {
        match self {
            Self::Acquire | Self::PersistentAcquire => AccessFamily::Acquire,
            Self::Lock => AccessFamily::Lock,
        }
    }
}

impl AccessFamily {
    pub(crate) fn of(op: AccessOp) -> Self {
        match op {
            AccessOp::Acquire { .. } | AccessOp::Release => Self::Acquire,
            AccessOp::Lock | AccessOp::Unlock => Self::Lock,
        }
    }

    pub(crate) fn release_op(self) -> AccessOp {
        match self {
            Self::Acquire => AccessOp::Release,
            Self::Lock => AccessOp::Unlock,
        }
    }
}

// ── Token table ─────────────────────────────────────────────────────

pub(crate) struct TokenTable {
    next_id: AtomicU64,
    holders: Mutex<HashMap<(EntityId, AccessFamily), HashSet<u64>>>,
    /// Releases owed once the access operation in flight completes.
    deferred: Mutex<HashSet<(EntityId, AccessFamily)>>,
}

impl TokenTable {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            holders: Mutex::new(HashMap::new()),
            deferred: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn register(&self, entity_id: EntityId, family: AccessFamily) -> u64 {
        let token_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.holders
            .lock()
            .entry((entity_id, family))
            .or_default()
            .insert(token_id);
        token_id
    }

    /// Returns `true` when `token_id` was the last holder of its family.
    pub(crate) fn unregister(&self, entity_id: EntityId, family: AccessFamily, token_id: u64) -> bool {
        let mut holders = self.holders.lock();
        let Some(set) = holders.get_mut(&(entity_id, family)) else {
            return false;
        };
        if !set.remove(&token_id) || !set.is_empty() {
            return false;
        }
        holders.remove(&(entity_id, family));
        true
    }

    pub(crate) fn defer_release(&self, entity_id: EntityId, family: AccessFamily) {
        self.deferred.lock().insert((entity_id, family));
    }

    /// Claim a deferred release. Nothing is owed while a token of the
    /// family is held again.
    pub(crate) fn take_deferred_release(&self, entity_id: EntityId, family: AccessFamily) -> bool {
        if !self.deferred.lock().remove(&(entity_id, family)) {
            return false;
        }
        !self.holders.lock().contains_key(&(entity_id, family))
    }

    #[cfg(test)]
    pub(crate) fn holders(&self, entity_id: EntityId, family: AccessFamily) -> usize {
        self.holders
            .lock()
            .get(&(entity_id, family))
            .map_or(0, HashSet::len)
    }

    /// Forget every token of an entity that went offline.
    pub(crate) fn clear_entity(&self, entity_id: EntityId) {
        self.holders.lock().retain(|(id, _), _| *id != entity_id);
        self.deferred.lock().retain(|(id, _)| *id != entity_id);
    }
}

// ── ExclusiveAccessToken ────────────────────────────────────────────

/// Keeps an entity acquired or locked for as long as it lives.
///
/// Must not be dropped from inside a [`Controller::with_entity`] closure.
#[derive(Debug)]
pub struct ExclusiveAccessToken {
    entity_id: EntityId,
    access_type: AccessType,
    token_id: u64,
    controller: Weak<ControllerInner>,
}

impl ExclusiveAccessToken {
    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    pub fn access_type(&self) -> AccessType {
        self.access_type
    }

    /// Give the access up now. Same as dropping the token.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ExclusiveAccessToken {
    fn drop(&mut self) {
        let Some(inner) = self.controller.upgrade() else {
            return;
        };
        let family = self.access_type.family();
        if !inner.tokens.unregister(self.entity_id, family, self.token_id) || inner.is_shut_down() {
            return;
        }
        debug!(entity_id = %self.entity_id, access = %self.access_type, "last token dropped, releasing");
        match inner.begin_access(self.entity_id, family.release_op(), None) {
            Ok(_) => {}
            Err(CoreError::Busy { .. }) => {
                debug!(entity_id = %self.entity_id, access = %self.access_type, "access busy, release deferred");
                inner.tokens.defer_release(self.entity_id, family);
            }
            Err(e) => {
                warn!(entity_id = %self.entity_id, error = %e, "could not release exclusive access");
            }
        }
    }
}

impl Controller {
    /// Acquire or lock `entity_id` and hand back a token that undoes it
    /// when the last token of its kind is dropped.
    pub async fn request_exclusive_access(
        &self,
        entity_id: EntityId,
        access_type: AccessType,
    ) -> Result<ExclusiveAccessToken, CoreError> {
        match access_type {
            AccessType::Acquire | AccessType::PersistentAcquire => {
                let persistent = access_type == AccessType::PersistentAcquire;
                let state = self.acquire_entity(entity_id, persistent).await?;
                if state != AcquireState::Acquired {
                    return Err(self.access_denied(entity_id, access_type));
                }
            }
            AccessType::Lock => {
                let state = self.lock_entity(entity_id).await?;
                if state != LockState::Locked {
                    return Err(self.access_denied(entity_id, access_type));
                }
            }
        }
        let token_id = self.inner.tokens.register(entity_id, access_type.family());
        Ok(ExclusiveAccessToken {
            entity_id,
            access_type,
            token_id,
            controller: Arc::downgrade(&self.inner),
        })
    }

    fn access_denied(&self, entity_id: EntityId, access_type: AccessType) -> CoreError {
        let owner = self
            .with_entity(entity_id, |entity| match access_type.family() {
                AccessFamily::Acquire => entity.owning_controller(),
                AccessFamily::Lock => entity.locking_controller(),
            })
            .unwrap_or(EntityId::NULL);
        CoreError::AccessDenied { entity_id, owner }
    }
}
