// ── User commands and read API ──
//
// Every setter funnels through `send_command`: the request goes out with
// the model update it implies, and that update is applied only once the
// entity answered with success. The echoed value wins over the expected
// one when the entity sends it back.

use std::time::Instant;

use avdecc_api::descriptor::MAX_STRING_LENGTH;
use avdecc_api::{
    AudioMapping, CommandStatus, ConfigurationIndex, ControlValues, DescriptorIndex,
    DescriptorType, DynamicInfo, Entity, EntityId, MemoryObjectOperation, OperationId, Request,
    Response, ResponsePayload, SamplingRate, StreamDirection, StreamFormat,
};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info};

use super::{Controller, ControllerInner};
use crate::error::CoreError;
use crate::event::ControllerEvent;
use crate::model::{ControlledEntity, EntityNode, sanity};
use crate::pending::{CommandReply, Continuation, Outgoing};
use crate::update::{self, UpdateOutcome};

/// On-disk form of one entity: discovery record plus model tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntityDump {
    entity: Entity,
    model: EntityNode,
}

// ── Response side ───────────────────────────────────────────────────

pub(super) fn on_command_response(
    ctx: &ControllerInner,
    entity_id: EntityId,
    command: &'static str,
    expected_update: Option<DynamicInfo>,
    reply: CommandReply,
    response: Response,
) {
    let Some(handle) = ctx.registry.handle(entity_id) else {
        let _ = reply.send(Err(CoreError::EntityOffline { entity_id }));
        return;
    };

    let Response { status, payload } = response;
    if !status.is_success() {
        let holder = {
            let entity = handle.lock();
            match status {
                CommandStatus::AcquiredByOther => Some(entity.owning_controller),
                CommandStatus::LockedByOther => Some(entity.locking_controller),
                _ => None,
            }
        };
        debug!(entity_id = %entity_id, command, %status, "command rejected");
        let _ = reply.send(Err(CoreError::from_status(command, entity_id, status, holder)));
        return;
    }

    let confirmed = match &payload {
        ResponsePayload::Dynamic(value) => Some(value.clone()),
        _ => expected_update,
    };
    let outcome = match confirmed {
        Some(value) => update::apply_dynamic(ctx, &mut handle.lock(), &value),
        None => UpdateOutcome::Unchanged,
    };
    let _ = reply.send(Ok(payload));

    if outcome == UpdateOutcome::ConfigurationChanged {
        ctx.restart_enumeration(entity_id);
    }
}

fn check_name(field: &str, name: &str) -> Result<(), CoreError> {
    if name.len() > MAX_STRING_LENGTH {
        return Err(CoreError::InvalidArgument {
            reason: format!("{field} is {} bytes long, at most {MAX_STRING_LENGTH} allowed", name.len()),
        });
    }
    Ok(())
}

impl Controller {
    // ── Read API ─────────────────────────────────────────────────────

    /// Ids of every known entity, advertised or still enumerating.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.inner.registry.ids()
    }

    /// Run `f` against an entity while holding its lock.
    ///
    /// Do not call back into the controller from `f`, and do not drop an
    /// [`ExclusiveAccessToken`](crate::ExclusiveAccessToken) inside it: the
    /// last token's release needs this same lock.
    pub fn with_entity<R>(
        &self,
        entity_id: EntityId,
        f: impl FnOnce(&ControlledEntity) -> R,
    ) -> Option<R> {
        let handle = self.inner.registry.handle(entity_id)?;
        let entity = handle.lock();
        Some(f(&entity))
    }

    /// Owned copy of an entity's current state.
    pub fn entity_snapshot(&self, entity_id: EntityId) -> Option<ControlledEntity> {
        self.with_entity(entity_id, Clone::clone)
    }

    pub fn is_advertised(&self, entity_id: EntityId) -> bool {
        self.with_entity(entity_id, ControlledEntity::is_advertised)
            .unwrap_or(false)
    }

    // ── Plumbing ─────────────────────────────────────────────────────

    async fn send_command(
        &self,
        entity_id: EntityId,
        request: Request,
        expected_update: Option<DynamicInfo>,
    ) -> Result<ResponsePayload, CoreError> {
        if self.inner.is_shut_down() {
            return Err(CoreError::ControllerShutdown);
        }
        if !self.inner.registry.contains(entity_id) {
            return Err(CoreError::UnknownEntity { entity_id });
        }

        let (tx, rx) = oneshot::channel();
        self.inner.dispatch(vec![Outgoing {
            target: entity_id,
            request,
            continuation: Continuation::Command {
                expected_update,
                reply: tx,
            },
        }]);
        rx.await.map_err(|_| CoreError::ControllerShutdown)?
    }

    async fn set(&self, entity_id: EntityId, request: Request, update: DynamicInfo) -> Result<(), CoreError> {
        self.send_command(entity_id, request, Some(update)).await.map(|_| ())
    }

    // ── Setters ──────────────────────────────────────────────────────

    pub async fn set_entity_name(&self, entity_id: EntityId, name: &str) -> Result<(), CoreError> {
        check_name("entity name", name)?;
        self.set(
            entity_id,
            Request::SetEntityName(name.to_owned()),
            DynamicInfo::EntityName(name.to_owned()),
        )
        .await
    }

    pub async fn set_entity_group_name(&self, entity_id: EntityId, name: &str) -> Result<(), CoreError> {
        check_name("group name", name)?;
        self.set(
            entity_id,
            Request::SetEntityGroupName(name.to_owned()),
            DynamicInfo::EntityGroupName(name.to_owned()),
        )
        .await
    }

    pub async fn set_object_name(
        &self,
        entity_id: EntityId,
        configuration_index: ConfigurationIndex,
        descriptor_type: DescriptorType,
        descriptor_index: DescriptorIndex,
        name: &str,
    ) -> Result<(), CoreError> {
        if !descriptor_type.has_object_name() {
            return Err(CoreError::InvalidArgument {
                reason: format!("{descriptor_type} descriptors have no object name"),
            });
        }
        check_name("object name", name)?;
        self.set(
            entity_id,
            Request::SetObjectName {
                configuration_index,
                descriptor_type,
                descriptor_index,
                name: name.to_owned(),
            },
            DynamicInfo::ObjectName {
                configuration_index,
                descriptor_type,
                descriptor_index,
                name: name.to_owned(),
            },
        )
        .await
    }

    /// Switch the active configuration. The entity is re-enumerated once
    /// the change is confirmed.
    pub async fn set_configuration(
        &self,
        entity_id: EntityId,
        configuration_index: ConfigurationIndex,
    ) -> Result<(), CoreError> {
        self.set(
            entity_id,
            Request::SetConfiguration {
                configuration_index,
            },
            DynamicInfo::CurrentConfiguration {
                configuration_index,
            },
        )
        .await
    }

    pub async fn set_stream_format(
        &self,
        entity_id: EntityId,
        direction: StreamDirection,
        stream_index: DescriptorIndex,
        format: StreamFormat,
    ) -> Result<(), CoreError> {
        self.set(
            entity_id,
            Request::SetStreamFormat {
                direction,
                stream_index,
                format,
            },
            DynamicInfo::StreamFormat {
                direction,
                stream_index,
                format,
            },
        )
        .await
    }

    pub async fn set_sampling_rate(
        &self,
        entity_id: EntityId,
        audio_unit_index: DescriptorIndex,
        sampling_rate: SamplingRate,
    ) -> Result<(), CoreError> {
        self.set(
            entity_id,
            Request::SetSamplingRate {
                audio_unit_index,
                sampling_rate,
            },
            DynamicInfo::SamplingRate {
                audio_unit_index,
                sampling_rate,
            },
        )
        .await
    }

    pub async fn set_clock_source(
        &self,
        entity_id: EntityId,
        clock_domain_index: DescriptorIndex,
        clock_source_index: DescriptorIndex,
    ) -> Result<(), CoreError> {
        self.set(
            entity_id,
            Request::SetClockSource {
                clock_domain_index,
                clock_source_index,
            },
            DynamicInfo::ClockSource {
                clock_domain_index,
                clock_source_index,
            },
        )
        .await
    }

    pub async fn set_control_values(
        &self,
        entity_id: EntityId,
        control_index: DescriptorIndex,
        values: ControlValues,
    ) -> Result<(), CoreError> {
        self.set(
            entity_id,
            Request::SetControlValues {
                control_index,
                values: values.clone(),
            },
            DynamicInfo::ControlValues {
                control_index,
                values,
            },
        )
        .await
    }

    pub async fn start_stream(
        &self,
        entity_id: EntityId,
        direction: StreamDirection,
        stream_index: DescriptorIndex,
    ) -> Result<(), CoreError> {
        self.set(
            entity_id,
            Request::StartStreaming {
                direction,
                stream_index,
            },
            DynamicInfo::StreamRunning {
                direction,
                stream_index,
                running: true,
            },
        )
        .await
    }

    pub async fn stop_stream(
        &self,
        entity_id: EntityId,
        direction: StreamDirection,
        stream_index: DescriptorIndex,
    ) -> Result<(), CoreError> {
        self.set(
            entity_id,
            Request::StopStreaming {
                direction,
                stream_index,
            },
            DynamicInfo::StreamRunning {
                direction,
                stream_index,
                running: false,
            },
        )
        .await
    }

    pub async fn add_audio_mappings(
        &self,
        entity_id: EntityId,
        direction: StreamDirection,
        stream_port_index: DescriptorIndex,
        mappings: Vec<AudioMapping>,
    ) -> Result<(), CoreError> {
        self.set(
            entity_id,
            Request::AddAudioMappings {
                direction,
                stream_port_index,
                mappings: mappings.clone(),
            },
            DynamicInfo::AudioMappingsAdded {
                direction,
                stream_port_index,
                mappings,
            },
        )
        .await
    }

    pub async fn remove_audio_mappings(
        &self,
        entity_id: EntityId,
        direction: StreamDirection,
        stream_port_index: DescriptorIndex,
        mappings: Vec<AudioMapping>,
    ) -> Result<(), CoreError> {
        self.set(
            entity_id,
            Request::RemoveAudioMappings {
                direction,
                stream_port_index,
                mappings: mappings.clone(),
            },
            DynamicInfo::AudioMappingsRemoved {
                direction,
                stream_port_index,
                mappings,
            },
        )
        .await
    }

    pub async fn set_memory_object_length(
        &self,
        entity_id: EntityId,
        configuration_index: ConfigurationIndex,
        memory_object_index: DescriptorIndex,
        length: u64,
    ) -> Result<(), CoreError> {
        self.set(
            entity_id,
            Request::SetMemoryObjectLength {
                configuration_index,
                memory_object_index,
                length,
            },
            DynamicInfo::MemoryObjectLength {
                configuration_index,
                memory_object_index,
                length,
            },
        )
        .await
    }

    pub async fn set_association_id(
        &self,
        entity_id: EntityId,
        association_id: Option<EntityId>,
    ) -> Result<(), CoreError> {
        self.set(
            entity_id,
            Request::SetAssociationId { association_id },
            DynamicInfo::AssociationId { association_id },
        )
        .await
    }

    // ── Memory-object operations ─────────────────────────────────────

    /// Start an operation on a memory object. Progress arrives as
    /// [`ControllerEvent::OperationProgress`].
    pub async fn start_memory_object_operation(
        &self,
        entity_id: EntityId,
        descriptor_index: DescriptorIndex,
        operation: MemoryObjectOperation,
        payload: Vec<u8>,
    ) -> Result<OperationId, CoreError> {
        let request = Request::StartOperation {
            descriptor_type: DescriptorType::MemoryObject,
            descriptor_index,
            operation,
            payload,
        };
        let command = request.name();
        match self.send_command(entity_id, request, None).await? {
            ResponsePayload::OperationStarted { operation_id } => {
                debug!(entity_id = %entity_id, %operation, operation_id, "operation started");
                Ok(operation_id)
            }
            _ => Err(CoreError::CommandFailed {
                command,
                status: CommandStatus::ProtocolError,
            }),
        }
    }

    pub async fn abort_operation(
        &self,
        entity_id: EntityId,
        descriptor_type: DescriptorType,
        descriptor_index: DescriptorIndex,
        operation_id: OperationId,
    ) -> Result<(), CoreError> {
        self.send_command(
            entity_id,
            Request::AbortOperation {
                descriptor_type,
                descriptor_index,
                operation_id,
            },
            None,
        )
        .await
        .map(|_| ())
    }

    // ── Identification ───────────────────────────────────────────────

    /// Switch the entity's IDENTIFY control on. The scheduler switches it
    /// off again after the identification window.
    pub async fn identify_entity(&self, entity_id: EntityId) -> Result<(), CoreError> {
        let control_index = self
            .with_entity(entity_id, ControlledEntity::identify_control_index)
            .ok_or(CoreError::UnknownEntity { entity_id })?
            .ok_or_else(|| CoreError::NotSupported {
                operation: "identify".into(),
            })?;

        self.set_control_values(entity_id, control_index, ControlValues(vec![1]))
            .await?;
        let expires_at = Instant::now() + self.inner.config.identify_window;
        self.inner
            .scheduler
            .start_local_identification(entity_id, control_index, expires_at);
        Ok(())
    }

    // ── Virtual entities and model export ────────────────────────────

    /// Register a fully described entity that is never enumerated, e.g. a
    /// saved model loaded for offline editing.
    pub fn load_virtual_entity(&self, entity: Entity, mut tree: EntityNode) -> Result<(), CoreError> {
        let entity_id = entity.entity_id;
        if self.inner.is_shut_down() {
            return Err(CoreError::ControllerShutdown);
        }
        if self.inner.registry.contains(entity_id) {
            return Err(CoreError::InvalidArgument {
                reason: format!("entity {entity_id} already exists"),
            });
        }

        let current = tree.current_configuration_index();
        sanity::validate(&tree, |index| index == current)?;
        tree.mark_active_configuration();
        for configuration in tree.configurations.values_mut() {
            configuration.select_locale(&self.inner.config.preferred_locale);
        }

        let mut controlled = ControlledEntity::virtual_entity(entity, tree, &self.inner.config);
        controlled.advertised = true;
        if self.inner.registry.insert(controlled).is_none() {
            return Err(CoreError::InvalidArgument {
                reason: format!("entity {entity_id} already exists"),
            });
        }
        info!(entity_id = %entity_id, "virtual entity loaded");
        self.inner.emit(ControllerEvent::EntityOnline { entity_id });
        Ok(())
    }

    /// Parse the JSON produced by [`serialize_entity_model`](Self::serialize_entity_model)
    /// and load it as a virtual entity.
    pub fn load_virtual_entity_from_json(&self, json: &str) -> Result<EntityId, CoreError> {
        let dump: EntityDump = serde_json::from_str(json)?;
        let entity_id = dump.entity.entity_id;
        self.load_virtual_entity(dump.entity, dump.model)?;
        Ok(entity_id)
    }

    /// Export an entity's discovery record and model tree as JSON.
    pub fn serialize_entity_model(&self, entity_id: EntityId) -> Result<String, CoreError> {
        let dump = self
            .with_entity(entity_id, |entity| {
                entity.model().map(|model| EntityDump {
                    entity: entity.entity().clone(),
                    model: model.clone(),
                })
            })
            .ok_or(CoreError::UnknownEntity { entity_id })?
            .ok_or_else(|| CoreError::InvalidArgument {
                reason: format!("entity {entity_id} has no model yet"),
            })?;
        Ok(serde_json::to_string_pretty(&dump)?)
    }
}
