// ── Exclusive access ──
//
// Acquire and lock state per entity, as seen by this controller. Both
// families share one rule set: a request already satisfied answers
// immediately without touching the network, a second request while one
// is in flight is refused, and every response (or failure) lands the
// state somewhere definite.

use avdecc_api::{CommandStatus, DynamicInfo, EntityId, Response, ResponsePayload};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::controller::{Controller, ControllerInner};
use crate::error::CoreError;
use crate::event::ControllerEvent;
use crate::model::{AcquireState, ControlledEntity, LockState};
use crate::pending::{AccessOp, AccessOutcome, AccessReply, Continuation, Outgoing};
use crate::tokens::AccessFamily;

// ── State transitions ───────────────────────────────────────────────

/// Apply an acquire-family outcome. `owner` is the controller reported by
/// the entity (null when it reported none). Returns `true` on change.
pub(crate) fn update_acquired_state(
    ctx: &ControllerInner,
    entity: &mut ControlledEntity,
    status: CommandStatus,
    owner: EntityId,
) -> bool {
    let (state, owner) = match status {
        CommandStatus::Success | CommandStatus::AcquiredByOther => {
            if owner == ctx.controller_id {
                (AcquireState::Acquired, owner)
            } else if owner.is_valid() {
                (AcquireState::AcquiredByOther, owner)
            } else if status == CommandStatus::AcquiredByOther {
                (AcquireState::AcquiredByOther, EntityId::NULL)
            } else {
                (AcquireState::NotAcquired, EntityId::NULL)
            }
        }
        CommandStatus::NotImplemented | CommandStatus::NotSupported => {
            (AcquireState::NotAcquired, EntityId::NULL)
        }
        _ => (AcquireState::Undefined, EntityId::NULL),
    };

    if entity.acquire_state == state && entity.owning_controller == owner {
        return false;
    }
    entity.acquire_state = state;
    entity.owning_controller = owner;
    ctx.notify(
        entity,
        ControllerEvent::AcquireStateChanged {
            entity_id: entity.entity_id(),
            state,
            owner,
        },
    );
    true
}

/// Lock-family counterpart of [`update_acquired_state`].
pub(crate) fn update_locked_state(
    ctx: &ControllerInner,
    entity: &mut ControlledEntity,
    status: CommandStatus,
    locker: EntityId,
) -> bool {
    let (state, locker) = match status {
        CommandStatus::Success | CommandStatus::LockedByOther => {
            if locker == ctx.controller_id {
                (LockState::Locked, locker)
            } else if locker.is_valid() {
                (LockState::LockedByOther, locker)
            } else if status == CommandStatus::LockedByOther {
                (LockState::LockedByOther, EntityId::NULL)
            } else {
                (LockState::NotLocked, EntityId::NULL)
            }
        }
        CommandStatus::NotImplemented | CommandStatus::NotSupported => {
            (LockState::NotLocked, EntityId::NULL)
        }
        _ => (LockState::Undefined, EntityId::NULL),
    };

    if entity.lock_state == state && entity.locking_controller == locker {
        return false;
    }
    entity.lock_state = state;
    entity.locking_controller = locker;
    ctx.notify(
        entity,
        ControllerEvent::LockStateChanged {
            entity_id: entity.entity_id(),
            state,
            locker,
        },
    );
    true
}

fn outcome(entity: &ControlledEntity) -> AccessOutcome {
    AccessOutcome {
        acquire_state: entity.acquire_state,
        lock_state: entity.lock_state,
    }
}

fn mark_in_progress(ctx: &ControllerInner, entity: &mut ControlledEntity, op: AccessOp) {
    let entity_id = entity.entity_id();
    match op {
        AccessOp::Acquire { .. } | AccessOp::Release => {
            entity.acquire_state = AcquireState::InProgress;
            ctx.notify(
                entity,
                ControllerEvent::AcquireStateChanged {
                    entity_id,
                    state: AcquireState::InProgress,
                    owner: entity.owning_controller,
                },
            );
        }
        AccessOp::Lock | AccessOp::Unlock => {
            entity.lock_state = LockState::InProgress;
            ctx.notify(
                entity,
                ControllerEvent::LockStateChanged {
                    entity_id,
                    state: LockState::InProgress,
                    locker: entity.locking_controller,
                },
            );
        }
    }
}

// ── Request side ────────────────────────────────────────────────────

impl ControllerInner {
    /// Start an access operation. `Ok(Some(_))` means the entity is already
    /// where the caller wants it and nothing was sent; `Ok(None)` means a
    /// request went out and `reply` will be answered.
    pub(crate) fn begin_access(
        &self,
        entity_id: EntityId,
        op: AccessOp,
        reply: Option<AccessReply>,
    ) -> Result<Option<AccessOutcome>, CoreError> {
        if self.is_shut_down() {
            return Err(CoreError::ControllerShutdown);
        }
        let handle = self
            .registry
            .handle(entity_id)
            .ok_or(CoreError::UnknownEntity { entity_id })?;
        {
            let mut entity = handle.lock();
            let satisfied = match op {
                AccessOp::Acquire { .. } => entity.acquire_state == AcquireState::Acquired,
                AccessOp::Release => entity.acquire_state == AcquireState::NotAcquired,
                AccessOp::Lock => entity.lock_state == LockState::Locked,
                AccessOp::Unlock => entity.lock_state == LockState::NotLocked,
            };
            if satisfied {
                debug!(entity_id = %entity_id, ?op, "access already in requested state");
                return Ok(Some(outcome(&entity)));
            }
            let busy = match op {
                AccessOp::Acquire { .. } | AccessOp::Release => {
                    entity.acquire_state == AcquireState::InProgress
                }
                AccessOp::Lock | AccessOp::Unlock => entity.lock_state == LockState::InProgress,
            };
            if busy {
                return Err(CoreError::Busy {
                    entity_id,
                    operation: op.request().name(),
                });
            }
            mark_in_progress(self, &mut entity, op);
        }

        self.dispatch(vec![Outgoing {
            target: entity_id,
            request: op.request(),
            continuation: Continuation::Access { op, reply },
        }]);
        Ok(None)
    }
}

// ── Response side ───────────────────────────────────────────────────

pub(crate) fn on_access_response(
    ctx: &ControllerInner,
    entity_id: EntityId,
    op: AccessOp,
    reply: Option<AccessReply>,
    response: Response,
) {
    let reported = match &response.payload {
        ResponsePayload::Dynamic(DynamicInfo::AcquiredState { owner }) => Some(*owner),
        ResponsePayload::Dynamic(DynamicInfo::LockedState { locker }) => Some(*locker),
        _ => None,
    };
    let Some(handle) = ctx.registry.handle(entity_id) else {
        if let Some(reply) = reply {
            let _ = reply.send(Err(CoreError::EntityOffline { entity_id }));
        }
        return;
    };

    let status = response.status;
    let result = {
        let mut entity = handle.lock();
        match op {
            AccessOp::Acquire { .. } => {
                let owner = reported.unwrap_or(if status.is_success() {
                    ctx.controller_id
                } else {
                    EntityId::NULL
                });
                update_acquired_state(ctx, &mut entity, status, owner);
            }
            AccessOp::Release => {
                update_acquired_state(ctx, &mut entity, status, reported.unwrap_or(EntityId::NULL));
            }
            AccessOp::Lock => {
                let locker = reported.unwrap_or(if status.is_success() {
                    ctx.controller_id
                } else {
                    EntityId::NULL
                });
                update_locked_state(ctx, &mut entity, status, locker);
            }
            AccessOp::Unlock => {
                update_locked_state(ctx, &mut entity, status, reported.unwrap_or(EntityId::NULL));
            }
        }
        if status.is_success() {
            Ok(outcome(&entity))
        } else {
            let holder = match op {
                AccessOp::Acquire { .. } | AccessOp::Release => entity.owning_controller,
                AccessOp::Lock | AccessOp::Unlock => entity.locking_controller,
            };
            Err(CoreError::from_status(
                op.request().name(),
                entity_id,
                status,
                Some(holder),
            ))
        }
    };

    if let Err(e) = &result {
        warn!(entity_id = %entity_id, ?op, error = %e, "access request failed");
    }
    let family = AccessFamily::of(op);
    // A caller that just gained the access keeps it.
    let superseded = reply.is_some() && status.is_success() && op != family.release_op();
    match reply {
        Some(reply) => {
            let _ = reply.send(result);
        }
        None => debug!(entity_id = %entity_id, ?op, %status, "access request without caller finished"),
    }

    if ctx.tokens.take_deferred_release(entity_id, family) && !superseded {
        debug!(entity_id = %entity_id, ?op, "issuing deferred release");
        if let Err(e) = ctx.begin_access(entity_id, family.release_op(), None) {
            warn!(entity_id = %entity_id, error = %e, "could not release exclusive access");
        }
    }
}


// ── Public API ──────────────────────────────────────────────────────

impl Controller {
    async fn run_access(&self, entity_id: EntityId, op: AccessOp) -> Result<AccessOutcome, CoreError> {
        let (tx, rx) = oneshot::channel();
        match self.inner.begin_access(entity_id, op, Some(tx))? {
            Some(outcome) => Ok(outcome),
            None => rx.await.map_err(|_| CoreError::ControllerShutdown)?,
        }
    }

    /// Acquire exclusive control of an entity. Succeeds without a network
    /// exchange when this controller already holds it.
    pub async fn acquire_entity(
        &self,
        entity_id: EntityId,
        persistent: bool,
    ) -> Result<AcquireState, CoreError> {
        self.run_access(entity_id, AccessOp::Acquire { persistent })
            .await
            .map(|outcome| outcome.acquire_state)
    }

    pub async fn release_entity(&self, entity_id: EntityId) -> Result<AcquireState, CoreError> {
        self.run_access(entity_id, AccessOp::Release)
            .await
            .map(|outcome| outcome.acquire_state)
    }

    /// Lock an entity against changes from other controllers.
    pub async fn lock_entity(&self, entity_id: EntityId) -> Result<LockState, CoreError> {
        self.run_access(entity_id, AccessOp::Lock)
            .await
            .map(|outcome| outcome.lock_state)
    }

    pub async fn unlock_entity(&self, entity_id: EntityId) -> Result<LockState, CoreError> {
        self.run_access(entity_id, AccessOp::Unlock)
            .await
            .map(|outcome| outcome.lock_state)
    }
}
