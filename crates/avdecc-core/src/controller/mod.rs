// ── Controller ──
//
// Owns the registry, the pending-request table, the scheduler and the
// observer channel, and routes every transport callback to the right
// state machine. Network-side entry points are synchronous; user-facing
// commands are async and resolve through oneshot continuations.

mod commands;
mod discovery;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use avdecc_api::{CommandStatus, EntityId, ProtocolInterface, Request, RequestId, Response};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::access;
use crate::cache::EntityModelCache;
use crate::config::ControllerConfig;
use crate::enumeration;
use crate::error::CoreError;
use crate::event::ControllerEvent;
use crate::model::{AcquireState, ControlledEntity, LockState};
use crate::pending::{Continuation, Outbox, Outgoing, PendingRequest, PendingRequests};
use crate::registry::{EntityHandle, EntityRegistry};
use crate::scheduler::{self, Scheduler};
use crate::tokens::TokenTable;

// ── Controller ──────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Feed it discovery events,
/// responses and unsolicited notifications from the protocol layer; read
/// models, subscribe to events and issue commands from anywhere.
#[derive(Clone)]
pub struct Controller {
    pub(crate) inner: Arc<ControllerInner>,
}

pub(crate) struct ControllerInner {
    pub(crate) config: ControllerConfig,
    pub(crate) controller_id: EntityId,
    transport: Arc<dyn ProtocolInterface>,
    pub(crate) cache: Arc<EntityModelCache>,
    pub(crate) registry: EntityRegistry,
    pub(crate) pending: PendingRequests,
    pub(crate) scheduler: Scheduler,
    pub(crate) tokens: TokenTable,
    event_tx: broadcast::Sender<ControllerEvent>,
    cancel: CancellationToken,
    task_handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for ControllerInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerInner")
            .field("controller_id", &self.controller_id)
            .field("entities", &self.registry.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Create a controller on top of `transport`. Does NOT start the
    /// scheduler; call [`start()`](Self::start) from within a runtime.
    pub fn new(
        config: ControllerConfig,
        transport: Arc<dyn ProtocolInterface>,
        cache: Arc<EntityModelCache>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_size.max(1));
        let controller_id = transport.controller_id();
        let scheduler = Scheduler::new(config.identify_window);

        Self {
            inner: Arc::new(ControllerInner {
                config,
                controller_id,
                transport,
                cache,
                registry: EntityRegistry::new(),
                pending: PendingRequests::new(),
                scheduler,
                tokens: TokenTable::new(),
                event_tx,
                cancel: CancellationToken::new(),
                task_handles: tokio::sync::Mutex::new(Vec::new()),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn controller_id(&self) -> EntityId {
        self.inner.controller_id
    }

    pub fn cache(&self) -> &Arc<EntityModelCache> {
        &self.inner.cache
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the scheduler task.
    pub async fn start(&self) {
        let task = tokio::spawn(scheduler::scheduler_task(
            Arc::downgrade(&self.inner),
            self.inner.config.scheduler_tick,
            self.inner.cancel.child_token(),
        ));
        self.inner.task_handles.lock().await.push(task);
        info!(controller_id = %self.inner.controller_id, "controller started");
    }

    /// Stop background work, give up everything this controller holds on
    /// remote entities, and fail every outstanding request.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        for pending in self.inner.pending.drain() {
            pending.continuation.fail(|| CoreError::ControllerShutdown);
        }
        self.inner.scheduler.clear();
        self.inner.farewell();

        info!(controller_id = %self.inner.controller_id, "controller shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.is_shut_down()
    }

    /// Run scheduler work due at `now` without waiting for the next tick.
    pub fn tick(&self, now: Instant) {
        self.inner.tick(now);
    }

    // ── Observation ──────────────────────────────────────────────────

    /// Subscribe to the event broadcast stream.
    pub fn events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Known entity ids, refreshed on every online/offline.
    pub fn entity_list(&self) -> watch::Receiver<Arc<Vec<EntityId>>> {
        self.inner.registry.subscribe()
    }

    // ── Transport callbacks ──────────────────────────────────────────

    /// Deliver the single response to a request sent through the transport.
    pub fn handle_response(&self, request_id: RequestId, response: Response) {
        self.inner.handle_response(request_id, response);
    }

    /// Number of requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }
}

// ── Inner plumbing ──────────────────────────────────────────────────

impl ControllerInner {
    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Broadcast unconditionally.
    pub(crate) fn emit(&self, event: ControllerEvent) {
        // A send error only means nobody is subscribed.
        let _ = self.event_tx.send(event);
    }

    /// Broadcast a field-change event if observers know about the entity.
    pub(crate) fn notify(&self, entity: &ControlledEntity, event: ControllerEvent) {
        if entity.advertised {
            self.emit(event);
        }
    }

    /// Send everything queued in `outbox`. Each request is registered before
    /// it is sent; a refused send is answered locally with `NetworkError`.
    pub(crate) fn dispatch(&self, outbox: Outbox) {
        for Outgoing {
            target,
            request,
            continuation,
        } in outbox
        {
            if self.is_shut_down() {
                continuation.fail(|| CoreError::ControllerShutdown);
                continue;
            }
            if !self.registry.contains(target) {
                debug!(entity_id = %target, command = request.name(), "entity gone, dropping request");
                continuation.fail(|| CoreError::EntityOffline { entity_id: target });
                continue;
            }

            let request_id = self.pending.next_id();
            let command = request.name();
            debug!(entity_id = %target, request_id, command, "sending request");
            self.pending.insert(
                request_id,
                PendingRequest {
                    entity_id: target,
                    command,
                    sent_at: Instant::now(),
                    continuation,
                },
            );
            if let Err(e) = self.transport.send(request_id, target, request) {
                warn!(entity_id = %target, request_id, command, error = %e, "transport refused request");
                self.handle_response(request_id, Response::failure(CommandStatus::NetworkError));
            }
        }
    }

    /// Route a response to the continuation registered for `request_id`.
    pub(crate) fn handle_response(&self, request_id: RequestId, response: Response) {
        let Some(pending) = self.pending.take(request_id) else {
            match self.pending.answered_by(request_id) {
                Some(entity_id) => {
                    debug!(entity_id = %entity_id, request_id, "dropping duplicate response");
                    self.update_statistics(entity_id, |entity| {
                        entity.statistics.aecp_unexpected_response_counter = entity
                            .statistics
                            .aecp_unexpected_response_counter
                            .saturating_add(1);
                    });
                }
                None => debug!(request_id, status = %response.status, "response for unknown request"),
            }
            return;
        };
        let PendingRequest {
            entity_id,
            command,
            sent_at,
            continuation,
        } = pending;
        debug!(
            entity_id = %entity_id,
            request_id,
            command,
            status = %response.status,
            elapsed_ms = sent_at.elapsed().as_millis(),
            "response"
        );

        match continuation {
            Continuation::Enumeration { generation, key } => {
                enumeration::on_query_response(self, entity_id, generation, key, response);
            }
            Continuation::PackedBatch {
                generation,
                queries,
            } => {
                enumeration::on_packed_response(self, entity_id, generation, queries, response);
            }
            Continuation::Access { op, reply } => {
                access::on_access_response(self, entity_id, op, reply, response);
            }
            Continuation::Command {
                expected_update,
                reply,
            } => {
                commands::on_command_response(
                    self,
                    entity_id,
                    command,
                    expected_update,
                    reply,
                    response,
                );
            }
            Continuation::FireAndForget => {
                if !response.status.is_success() {
                    debug!(entity_id = %entity_id, command, status = %response.status, "unanswered request failed");
                }
            }
        }
    }

    /// Start (or continue) enumeration of a freshly registered entity.
    pub(crate) fn start_enumeration(&self, handle: &EntityHandle) {
        let mut out = Outbox::new();
        {
            let mut entity = handle.lock();
            enumeration::check_enumeration_steps(self, &mut entity, &mut out);
        }
        self.dispatch(out);
    }

    /// Throw away everything learned about an entity and enumerate it again,
    /// as observers would see an offline/online cycle.
    pub(crate) fn restart_enumeration(&self, entity_id: EntityId) {
        let Some(handle) = self.registry.handle(entity_id) else {
            return;
        };
        self.scheduler.purge_entity(entity_id);
        {
            let mut entity = handle.lock();
            if entity.advertised {
                self.emit(ControllerEvent::EntityOffline { entity_id });
            }
            let generation = entity.enumeration.generation.wrapping_add(1);
            let statistics = entity.statistics.clone();
            let mut fresh = ControlledEntity::new(entity.entity.clone(), &self.config);
            fresh.enumeration.generation = generation;
            fresh.statistics = statistics;
            fresh.statistics.enumeration_time = None;
            *entity = fresh;
        }
        info!(entity_id = %entity_id, "re-enumerating entity");
        self.start_enumeration(&handle);
    }

    /// Best-effort goodbye to every entity on shutdown: release what we
    /// acquired, unlock what we locked, deregister notifications. Nothing
    /// waits for the answers.
    fn farewell(&self) {
        for handle in self.registry.handles() {
            let requests = {
                let entity = handle.lock();
                let mut requests = Vec::new();
                if entity.acquire_state() == AcquireState::Acquired {
                    requests.push(Request::ReleaseEntity);
                }
                if entity.lock_state() == LockState::Locked {
                    requests.push(Request::UnlockEntity);
                }
                if entity.is_subscribed_to_unsolicited_notifications() {
                    requests.push(Request::DeregisterUnsolicitedNotifications);
                }
                (entity.entity_id(), requests)
            };
            let (entity_id, requests) = requests;
            for request in requests {
                let request_id = self.pending.next_id();
                debug!(entity_id = %entity_id, command = request.name(), "shutdown request");
                if let Err(e) = self.transport.send(request_id, entity_id, request) {
                    debug!(entity_id = %entity_id, error = %e, "shutdown request not sent");
                }
            }
        }
    }
}
