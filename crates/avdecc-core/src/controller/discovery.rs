// ── Discovery and notification entry points ──
//
// Called by the protocol layer: ADP online/update/offline, unsolicited
// AEM notifications, and AECP statistics hooks.

use std::time::Duration;

use avdecc_api::{Entity, EntityCapabilities, EntityId, ResponsePayload};
use tracing::{debug, info};

use super::{Controller, ControllerInner};
use crate::error::CoreError;
use crate::event::ControllerEvent;
use crate::model::ControlledEntity;
use crate::update::{self, UpdateOutcome};

fn is_ignored(entity: &Entity) -> bool {
    entity
        .entity_capabilities
        .contains(EntityCapabilities::GENERAL_CONTROLLER_IGNORE)
}

fn is_not_ready(entity: &Entity) -> bool {
    entity
        .entity_capabilities
        .contains(EntityCapabilities::ENTITY_NOT_READY)
}

impl ControllerInner {
    fn entity_online(&self, entity: Entity) {
        let entity_id = entity.entity_id;
        if is_ignored(&entity) {
            debug!(entity_id = %entity_id, "entity asks controllers to ignore it");
            return;
        }
        if is_not_ready(&entity) {
            // Picked up by the first update that clears the flag.
            debug!(entity_id = %entity_id, "entity not ready, deferring enumeration");
            return;
        }

        let controlled = ControlledEntity::new(entity, &self.config);
        let Some(handle) = self.registry.insert(controlled) else {
            debug!(entity_id = %entity_id, "entity already known");
            return;
        };
        info!(entity_id = %entity_id, "entity discovered, enumerating");
        self.start_enumeration(&handle);
    }

    fn entity_update(&self, entity: Entity) {
        let entity_id = entity.entity_id;
        let Some(handle) = self.registry.handle(entity_id) else {
            // Updates for entities we never saw (or not ready) act as online.
            self.entity_online(entity);
            return;
        };
        if is_ignored(&entity) {
            return;
        }

        let mut guard = handle.lock();
        if guard.entity == entity {
            return;
        }
        let association_changed = guard.entity.association_id != entity.association_id;
        guard.entity = entity;
        if association_changed {
            let association_id = guard.entity.association_id;
            if let Some(tree) = guard.tree.as_mut() {
                tree.dynamic_model.association_id = association_id;
            }
            self.notify(
                &guard,
                ControllerEvent::AssociationIdChanged {
                    entity_id,
                    association_id,
                },
            );
        }
        self.notify(&guard, ControllerEvent::EntityUpdated { entity_id });
    }

    fn entity_offline(&self, entity_id: EntityId) {
        let Some(handle) = self.registry.remove(entity_id) else {
            return;
        };
        self.scheduler.purge_entity(entity_id);
        self.tokens.clear_entity(entity_id);
        for pending in self.pending.drain_entity(entity_id) {
            pending
                .continuation
                .fail(|| CoreError::EntityOffline { entity_id });
        }

        let was_advertised = {
            let mut entity = handle.lock();
            // Late responses still holding the handle must find nothing to do.
            entity.enumeration.expected.clear();
            entity.enumeration.generation = entity.enumeration.generation.wrapping_add(1);
            entity.advertised
        };
        info!(entity_id = %entity_id, "entity offline");
        if was_advertised {
            self.emit(ControllerEvent::EntityOffline { entity_id });
        }
    }

    fn unsolicited(&self, entity_id: EntityId, payload: ResponsePayload) {
        let Some(handle) = self.registry.handle(entity_id) else {
            debug!(entity_id = %entity_id, "notification from unknown entity");
            return;
        };
        let outcome = {
            let mut entity = handle.lock();
            entity.statistics.unsolicited_notification_counter = entity
                .statistics
                .unsolicited_notification_counter
                .saturating_add(1);
            match payload {
                ResponsePayload::Dynamic(value) => update::apply_dynamic(self, &mut entity, &value),
                ResponsePayload::Packed(results) => {
                    let mut outcome = UpdateOutcome::Unchanged;
                    for value in results.into_iter().filter_map(|r| r.value) {
                        if update::apply_dynamic(self, &mut entity, &value)
                            == UpdateOutcome::ConfigurationChanged
                        {
                            outcome = UpdateOutcome::ConfigurationChanged;
                        }
                    }
                    outcome
                }
                other => {
                    debug!(entity_id = %entity_id, payload = ?other, "ignoring notification payload");
                    UpdateOutcome::Unchanged
                }
            }
        };
        if outcome == UpdateOutcome::ConfigurationChanged {
            self.restart_enumeration(entity_id);
        }
    }

    pub(super) fn update_statistics(&self, entity_id: EntityId, f: impl FnOnce(&mut ControlledEntity)) {
        let Some(handle) = self.registry.handle(entity_id) else {
            return;
        };
        let mut entity = handle.lock();
        f(&mut entity);
        self.notify(&entity, ControllerEvent::StatisticsChanged { entity_id });
    }
}

impl Controller {
    // ── Discovery ────────────────────────────────────────────────────

    /// A new entity was discovered.
    pub fn on_entity_online(&self, entity: Entity) {
        self.inner.entity_online(entity);
    }

    /// Discovery data of a known entity changed.
    pub fn on_entity_update(&self, entity: Entity) {
        self.inner.entity_update(entity);
    }

    /// An entity departed. Outstanding requests to it fail with
    /// [`CoreError::EntityOffline`].
    pub fn on_entity_offline(&self, entity_id: EntityId) {
        self.inner.entity_offline(entity_id);
    }

    // ── Notifications ────────────────────────────────────────────────

    /// An unsolicited AEM response from `entity_id`.
    pub fn on_unsolicited_response(&self, entity_id: EntityId, payload: ResponsePayload) {
        self.inner.unsolicited(entity_id, payload);
    }

    // ── Transport statistics ─────────────────────────────────────────

    pub fn on_aecp_retry(&self, entity_id: EntityId) {
        self.inner.update_statistics(entity_id, |entity| {
            entity.statistics.aecp_retry_counter = entity.statistics.aecp_retry_counter.saturating_add(1);
        });
    }

    pub fn on_aecp_timeout(&self, entity_id: EntityId) {
        self.inner.update_statistics(entity_id, |entity| {
            entity.statistics.aecp_timeout_counter =
                entity.statistics.aecp_timeout_counter.saturating_add(1);
        });
    }

    pub fn on_aecp_unexpected_response(&self, entity_id: EntityId) {
        self.inner.update_statistics(entity_id, |entity| {
            entity.statistics.aecp_unexpected_response_counter = entity
                .statistics
                .aecp_unexpected_response_counter
                .saturating_add(1);
        });
    }

    pub fn on_aecp_response_time(&self, entity_id: EntityId, elapsed: Duration) {
        self.inner.update_statistics(entity_id, |entity| {
            entity.statistics.record_response_time(elapsed);
        });
    }
}
