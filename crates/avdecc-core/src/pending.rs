// ── Outstanding requests ──
//
// Every request handed to the transport gets a fresh `RequestId` and a
// continuation describing what to do with its single response. Requests
// are registered before they are sent so a synchronous answer from the
// transport always finds its continuation.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use avdecc_api::{DynamicInfo, DynamicInfoQuery, EntityId, Request, RequestId, ResponsePayload};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::enumeration::query::QueryKey;
use crate::error::CoreError;
use crate::model::{AcquireState, LockState};

// ── Continuations ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AccessOp {
    Acquire { persistent: bool },
    Release,
    Lock,
    Unlock,
}

impl AccessOp {
    pub(crate) fn request(self) -> Request {
        match self {
            Self::Acquire { persistent } => Request::AcquireEntity { persistent },
            Self::Release => Request::ReleaseEntity,
            Self::Lock => Request::LockEntity,
            Self::Unlock => Request::UnlockEntity,
        }
    }
}

/// Access states after the operation, reported back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AccessOutcome {
    pub(crate) acquire_state: AcquireState,
    pub(crate) lock_state: LockState,
}

pub(crate) type AccessReply = oneshot::Sender<Result<AccessOutcome, CoreError>>;
pub(crate) type CommandReply = oneshot::Sender<Result<ResponsePayload, CoreError>>;

pub(crate) enum Continuation {
    /// A single enumeration query.
    Enumeration { generation: u64, key: QueryKey },
    /// A packed dynamic-info batch issued during enumeration.
    PackedBatch {
        generation: u64,
        queries: Vec<DynamicInfoQuery>,
    },
    /// Acquire/release/lock/unlock. `reply` is `None` for token releases.
    Access {
        op: AccessOp,
        reply: Option<AccessReply>,
    },
    /// A user command. On success `expected_update` (if any) is applied to
    /// the model before the caller is answered.
    Command {
        expected_update: Option<DynamicInfo>,
        reply: CommandReply,
    },
    /// Nothing to do beyond logging the outcome.
    FireAndForget,
}

impl Continuation {
    /// Fail a user-visible continuation; internal ones are dropped.
    pub(crate) fn fail(self, error: impl FnOnce() -> CoreError) {
        match self {
            Self::Access {
                reply: Some(reply), ..
            } => {
                let _ = reply.send(Err(error()));
            }
            Self::Command { reply, .. } => {
                let _ = reply.send(Err(error()));
            }
            _ => {}
        }
    }
}

pub(crate) struct PendingRequest {
    pub(crate) entity_id: EntityId,
    pub(crate) command: &'static str,
    pub(crate) sent_at: Instant,
    pub(crate) continuation: Continuation,
}

// ── Outbox ──────────────────────────────────────────────────────────

/// A request queued while an entity lock is held, dispatched after the
/// lock is released.
pub(crate) struct Outgoing {
    pub(crate) target: EntityId,
    pub(crate) request: Request,
    pub(crate) continuation: Continuation,
}

pub(crate) type Outbox = Vec<Outgoing>;

// ── Table ───────────────────────────────────────────────────────────

/// How many answered requests are remembered to spot duplicate responses.
const ANSWERED_HISTORY: usize = 256;

pub(crate) struct PendingRequests {
    next_id: AtomicU64,
    table: Mutex<HashMap<RequestId, PendingRequest>>,
    answered: Mutex<VecDeque<(RequestId, EntityId)>>,
}

impl PendingRequests {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            table: Mutex::new(HashMap::new()),
            answered: Mutex::new(VecDeque::with_capacity(ANSWERED_HISTORY)),
        }
    }

    pub(crate) fn next_id(&self) -> RequestId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn insert(&self, request_id: RequestId, pending: PendingRequest) {
        self.table.lock().insert(request_id, pending);
    }

    /// Claim the continuation for an incoming response.
    pub(crate) fn take(&self, request_id: RequestId) -> Option<PendingRequest> {
        let pending = self.table.lock().remove(&request_id)?;
        let mut answered = self.answered.lock();
        if answered.len() == ANSWERED_HISTORY {
            answered.pop_front();
        }
        answered.push_back((request_id, pending.entity_id));
        Some(pending)
    }

    /// The entity a request was sent to, if it was already answered.
    pub(crate) fn answered_by(&self, request_id: RequestId) -> Option<EntityId> {
        self.answered
            .lock()
            .iter()
            .find(|(id, _)| *id == request_id)
            .map(|(_, entity_id)| *entity_id)
    }

    /// Remove every request targeting `entity_id`.
    pub(crate) fn drain_entity(&self, entity_id: EntityId) -> Vec<PendingRequest> {
        let mut table = self.table.lock();
        let ids: Vec<RequestId> = table
            .iter()
            .filter(|(_, pending)| pending.entity_id == entity_id)
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter().filter_map(|id| table.remove(&id)).collect()
    }

    pub(crate) fn drain(&self) -> Vec<PendingRequest> {
        self.table.lock().drain().map(|(_, pending)| pending).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.table.lock().len()
    }
}
