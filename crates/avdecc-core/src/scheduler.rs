// ── Scheduler ──
//
// Time-based work that does not belong to any request: delayed query
// retries, expiry of remote identification records, and the automatic end
// of identifications this controller started. One background task drives
// `ControllerInner::tick` at `scheduler_tick`.

use std::collections::HashMap;
use std::sync::Weak;
use std::time::{Duration, Instant};

use avdecc_api::{ControlValues, DescriptorIndex, EntityId, Request};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::controller::ControllerInner;
use crate::enumeration;
use crate::enumeration::query::QueryKey;
use crate::event::ControllerEvent;
use crate::pending::{Continuation, Outbox, Outgoing};

/// An enumeration query waiting out its retry delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DelayedQuery {
    pub(crate) entity_id: EntityId,
    pub(crate) generation: u64,
    pub(crate) key: QueryKey,
    pub(crate) fire_at: Instant,
}

#[derive(Debug, Clone, Copy)]
struct LocalIdentification {
    control_index: DescriptorIndex,
    expires_at: Instant,
}

#[derive(Default)]
struct SchedulerState {
    delayed: Vec<DelayedQuery>,
    /// Entities seen identifying, with the time of the latest notification.
    remote: HashMap<EntityId, Instant>,
    /// Identifications this controller started and must stop.
    local: HashMap<EntityId, LocalIdentification>,
}

/// Work that fell due on one tick.
#[derive(Debug, Default)]
pub(crate) struct DueWork {
    pub(crate) queries: Vec<DelayedQuery>,
    pub(crate) expired_remote: Vec<EntityId>,
    pub(crate) expired_local: Vec<(EntityId, DescriptorIndex)>,
}

pub(crate) struct Scheduler {
    identify_window: Duration,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    pub(crate) fn new(identify_window: Duration) -> Self {
        Self {
            identify_window,
            state: Mutex::new(SchedulerState::default()),
        }
    }

    pub(crate) fn schedule_query(&self, query: DelayedQuery) {
        self.state.lock().delayed.push(query);
    }

    #[cfg(test)]
    pub(crate) fn pending_queries(&self) -> usize {
        self.state.lock().delayed.len()
    }

    /// Record an IDENTIFY control change reported by `entity_id`.
    /// Returns `Some(true)` when an identification starts, `Some(false)`
    /// when it stops, `None` for a refresh or a no-op.
    pub(crate) fn remote_identification(
        &self,
        entity_id: EntityId,
        identifying: bool,
        now: Instant,
    ) -> Option<bool> {
        let mut state = self.state.lock();
        if identifying {
            state.remote.insert(entity_id, now).is_none().then_some(true)
        } else {
            state.remote.remove(&entity_id).map(|_| false)
        }
    }

    #[cfg(test)]
    pub(crate) fn is_identifying(&self, entity_id: EntityId) -> bool {
        self.state.lock().remote.contains_key(&entity_id)
    }

    /// Remember that this controller switched identification on; the
    /// scheduler switches it off again at `expires_at`.
    pub(crate) fn start_local_identification(
        &self,
        entity_id: EntityId,
        control_index: DescriptorIndex,
        expires_at: Instant,
    ) {
        self.state.lock().local.insert(
            entity_id,
            LocalIdentification {
                control_index,
                expires_at,
            },
        );
    }

    /// Forget everything about an entity that went offline.
    pub(crate) fn purge_entity(&self, entity_id: EntityId) {
        let mut state = self.state.lock();
        state.delayed.retain(|query| query.entity_id != entity_id);
        state.remote.remove(&entity_id);
        state.local.remove(&entity_id);
    }

    pub(crate) fn clear(&self) {
        *self.state.lock() = SchedulerState::default();
    }

    /// Pull out everything due at `now`.
    pub(crate) fn take_due(&self, now: Instant) -> DueWork {
        let mut state = self.state.lock();
        let mut due = DueWork::default();

        let (mut ready, waiting): (Vec<_>, Vec<_>) =
            state.delayed.drain(..).partition(|query| query.fire_at <= now);
        state.delayed = waiting;
        ready.sort_by_key(|query| query.fire_at);
        due.queries = ready;

        let window = self.identify_window;
        state.remote.retain(|entity_id, last_seen| {
            let alive = now.saturating_duration_since(*last_seen) < window;
            if !alive {
                due.expired_remote.push(*entity_id);
            }
            alive
        });

        state.local.retain(|entity_id, identification| {
            let alive = identification.expires_at > now;
            if !alive {
                due.expired_local.push((*entity_id, identification.control_index));
            }
            alive
        });

        due
    }
}

// ── Tick ────────────────────────────────────────────────────────────

impl ControllerInner {
    /// Run everything the scheduler holds that is due at `now`.
    pub(crate) fn tick(&self, now: Instant) {
        let due = self.scheduler.take_due(now);

        for entity_id in due.expired_remote {
            debug!(entity_id = %entity_id, "identification window elapsed");
            if let Some(handle) = self.registry.handle(entity_id) {
                let entity = handle.lock();
                self.notify(&entity, ControllerEvent::IdentificationStopped { entity_id });
            }
        }

        let mut out = Outbox::new();
        for (entity_id, control_index) in due.expired_local {
            if !self.registry.contains(entity_id) {
                continue;
            }
            debug!(entity_id = %entity_id, control_index, "stopping identification");
            out.push(Outgoing {
                target: entity_id,
                request: Request::SetControlValues {
                    control_index,
                    values: ControlValues(vec![0]),
                },
                continuation: Continuation::FireAndForget,
            });
        }
        self.dispatch(out);

        for query in due.queries {
            let Some(handle) = self.registry.handle(query.entity_id) else {
                continue;
            };
            let mut out = Outbox::new();
            enumeration::fire_delayed_query(&mut handle.lock(), &query, &mut out);
            self.dispatch(out);
        }
    }
}

/// Background loop driving [`ControllerInner::tick`]. Holds only a weak
/// reference so a dropped controller ends the task.
pub(crate) async fn scheduler_task(
    inner: Weak<ControllerInner>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // Consume the immediate first tick.
    interval.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                trace!("scheduler tick");
                inner.tick(Instant::now());
            }
        }
    }

    debug!("scheduler task exiting");
}

#[cfg(test)]
mod tests {
    use avdecc_api::DynamicInfoQuery;
    use pretty_assertions::assert_eq;

    use super::*;

    const ENTITY: EntityId = EntityId::new(0x10);

    #[test]
    fn remote_identification_transitions() {
        let scheduler = Scheduler::new(Duration::from_millis(100));
        let now = Instant::now();
        assert_eq!(scheduler.remote_identification(ENTITY, true, now), Some(true));
        // Refresh while already identifying.
        assert_eq!(scheduler.remote_identification(ENTITY, true, now), None);
        assert_eq!(scheduler.remote_identification(ENTITY, false, now), Some(false));
        assert_eq!(scheduler.remote_identification(ENTITY, false, now), None);
    }

    #[test]
    fn remote_identification_expires_after_window() {
        let scheduler = Scheduler::new(Duration::from_millis(100));
        let start = Instant::now();
        scheduler.remote_identification(ENTITY, true, start);

        let due = scheduler.take_due(start + Duration::from_millis(50));
        assert!(due.expired_remote.is_empty());

        let due = scheduler.take_due(start + Duration::from_millis(150));
        assert_eq!(due.expired_remote, vec![ENTITY]);
        assert!(!scheduler.is_identifying(ENTITY));
    }

    #[test]
    fn delayed_queries_fire_in_due_order() {
        let scheduler = Scheduler::new(Duration::from_secs(1));
        let now = Instant::now();
        let key = QueryKey::Dynamic(DynamicInfoQuery::AcquiredState);
        scheduler.schedule_query(DelayedQuery {
            entity_id: ENTITY,
            generation: 0,
            key,
            fire_at: now + Duration::from_millis(10),
        });
        assert!(scheduler.take_due(now).queries.is_empty());
        assert_eq!(scheduler.pending_queries(), 1);
        let due = scheduler.take_due(now + Duration::from_millis(10));
        assert_eq!(due.queries.len(), 1);
        assert_eq!(scheduler.pending_queries(), 0);
    }

    #[test]
    fn late_registered_earlier_query_fires_first() {
        let scheduler = Scheduler::new(Duration::from_secs(1));
        let now = Instant::now();
        let later = QueryKey::Dynamic(DynamicInfoQuery::LockedState);
        let sooner = QueryKey::Dynamic(DynamicInfoQuery::AcquiredState);
        scheduler.schedule_query(DelayedQuery {
            entity_id: ENTITY,
            generation: 0,
            key: later,
            fire_at: now + Duration::from_millis(30),
        });
        scheduler.schedule_query(DelayedQuery {
            entity_id: ENTITY,
            generation: 0,
            key: sooner,
            fire_at: now + Duration::from_millis(10),
        });

        let due = scheduler.take_due(now + Duration::from_millis(50));
        let keys: Vec<QueryKey> = due.queries.iter().map(|query| query.key).collect();
        assert_eq!(keys, vec![sooner, later]);
    }

    #[test]
    fn purge_forgets_entity() {
        let scheduler = Scheduler::new(Duration::from_secs(1));
        let now = Instant::now();
        scheduler.remote_identification(ENTITY, true, now);
        scheduler.start_local_identification(ENTITY, 3, now);
        scheduler.purge_entity(ENTITY);
        let due = scheduler.take_due(now + Duration::from_secs(5));
        assert!(due.expired_remote.is_empty());
        assert!(due.expired_local.is_empty());
    }

    #[test]
    fn local_identification_expires_once() {
        let scheduler = Scheduler::new(Duration::from_secs(1));
        let now = Instant::now();
        scheduler.start_local_identification(ENTITY, 3, now + Duration::from_millis(5));
        let due = scheduler.take_due(now + Duration::from_millis(5));
        assert_eq!(due.expired_local, vec![(ENTITY, 3)]);
        assert!(scheduler.take_due(now + Duration::from_secs(1)).expired_local.is_empty());
    }
}
