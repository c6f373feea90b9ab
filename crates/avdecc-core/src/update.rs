// ── Dynamic model updates ──
//
// The single place where dynamic values land in an entity's model,
// whatever their source: enumeration query results, packed sub-results,
// successful setter echoes, or unsolicited notifications.

use std::time::Instant;

use avdecc_api::{CommandStatus, DescriptorType, DynamicInfo, StreamDirection};
use tracing::debug;

use crate::access;
use crate::controller::ControllerInner;
use crate::event::ControllerEvent;
use crate::model::{ControlledEntity, EntityNode, StreamDynamic};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpdateOutcome {
    Unchanged,
    Changed,
    /// The entity switched configuration; its model must be rebuilt.
    ConfigurationChanged,
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

fn changed(value: bool) -> UpdateOutcome {
    if value {
        UpdateOutcome::Changed
    } else {
        UpdateOutcome::Unchanged
    }
}

fn stream_mut(
    tree: &mut EntityNode,
    direction: StreamDirection,
    stream_index: u16,
) -> Option<&mut StreamDynamic> {
    tree.current_configuration_mut()?
        .streams_mut(direction)
        .get_mut(&stream_index)
        .map(|node| &mut node.dynamic_model)
}

/// Apply `value` to `entity`, emitting the matching change event when the
/// entity is advertised.
pub(crate) fn apply_dynamic(
    ctx: &ControllerInner,
    entity: &mut ControlledEntity,
    value: &DynamicInfo,
) -> UpdateOutcome {
    let entity_id = entity.entity_id();

    match value {
        DynamicInfo::AcquiredState { owner } => {
            return changed(access::update_acquired_state(
                ctx,
                entity,
                CommandStatus::Success,
                *owner,
            ));
        }
        DynamicInfo::LockedState { locker } => {
            return changed(access::update_locked_state(
                ctx,
                entity,
                CommandStatus::Success,
                *locker,
            ));
        }
        DynamicInfo::AssociationId { association_id } => {
            let mut did_change = replace(&mut entity.entity.association_id, *association_id);
            if let Some(tree) = entity.tree.as_mut() {
                did_change |= replace(&mut tree.dynamic_model.association_id, *association_id);
            }
            if did_change {
                ctx.notify(
                    entity,
                    ControllerEvent::AssociationIdChanged {
                        entity_id,
                        association_id: *association_id,
                    },
                );
            }
            return changed(did_change);
        }
        DynamicInfo::OperationStatus {
            descriptor_type,
            descriptor_index,
            operation_id,
            percent_complete,
        } => {
            ctx.notify(
                entity,
                ControllerEvent::OperationProgress {
                    entity_id,
                    descriptor_type: *descriptor_type,
                    descriptor_index: *descriptor_index,
                    operation_id: *operation_id,
                    percent_complete: *percent_complete,
                },
            );
            return UpdateOutcome::Unchanged;
        }
        _ => {}
    }

    let Some(tree) = entity.tree.as_mut() else {
        let kind: &'static str = value.into();
        debug!(entity_id = %entity_id, kind, "no model yet, dropping update");
        return UpdateOutcome::Unchanged;
    };

    // A stream info can carry a new format on top of its own change.
    let mut format_event = None;
    let event = match value {
        DynamicInfo::EntityName(name) => replace(&mut tree.dynamic_model.entity_name, name.clone())
            .then(|| ControllerEvent::EntityNameChanged {
                entity_id,
                name: name.clone(),
            }),
        DynamicInfo::EntityGroupName(name) => {
            replace(&mut tree.dynamic_model.group_name, name.clone()).then(|| {
                ControllerEvent::EntityGroupNameChanged {
                    entity_id,
                    name: name.clone(),
                }
            })
        }
        DynamicInfo::CurrentConfiguration {
            configuration_index,
        } => {
            if *configuration_index == tree.current_configuration_index() {
                return UpdateOutcome::Unchanged;
            }
            ctx.notify(
                entity,
                ControllerEvent::ConfigurationChanged {
                    entity_id,
                    configuration_index: *configuration_index,
                },
            );
            return UpdateOutcome::ConfigurationChanged;
        }
        DynamicInfo::ObjectName {
            configuration_index,
            descriptor_type,
            descriptor_index,
            name,
        } => tree
            .configurations
            .get_mut(configuration_index)
            .and_then(|cfg| cfg.object_name_mut(*descriptor_type, *descriptor_index))
            .and_then(|slot| replace(slot, name.clone()).then_some(()))
            .map(|()| ControllerEvent::ObjectNameChanged {
                entity_id,
                configuration_index: *configuration_index,
                descriptor_type: *descriptor_type,
                descriptor_index: *descriptor_index,
                name: name.clone(),
            }),
        DynamicInfo::SamplingRate {
            audio_unit_index,
            sampling_rate,
        } => tree
            .current_configuration_mut()
            .and_then(|cfg| cfg.audio_units.get_mut(audio_unit_index))
            .and_then(|node| {
                replace(&mut node.dynamic_model.current_sampling_rate, *sampling_rate).then_some(())
            })
            .map(|()| ControllerEvent::SamplingRateChanged {
                entity_id,
                audio_unit_index: *audio_unit_index,
                sampling_rate: *sampling_rate,
            }),
        DynamicInfo::ClockSource {
            clock_domain_index,
            clock_source_index,
        } => tree
            .current_configuration_mut()
            .and_then(|cfg| cfg.clock_domains.get_mut(clock_domain_index))
            .and_then(|node| {
                replace(&mut node.dynamic_model.clock_source_index, *clock_source_index)
                    .then_some(())
            })
            .map(|()| ControllerEvent::ClockSourceChanged {
                entity_id,
                clock_domain_index: *clock_domain_index,
                clock_source_index: *clock_source_index,
            }),
        DynamicInfo::ControlValues {
            control_index,
            values,
        } => tree
            .current_configuration_mut()
            .and_then(|cfg| cfg.controls.get_mut(control_index))
            .and_then(|node| replace(&mut node.dynamic_model.values, values.clone()).then_some(()))
            .map(|()| ControllerEvent::ControlValuesChanged {
                entity_id,
                control_index: *control_index,
                values: values.clone(),
            }),
        DynamicInfo::MemoryObjectLength {
            configuration_index,
            memory_object_index,
            length,
        } => tree
            .configurations
            .get_mut(configuration_index)
            .and_then(|cfg| cfg.memory_objects.get_mut(memory_object_index))
            .and_then(|node| replace(&mut node.dynamic_model.length, *length).then_some(()))
            .map(|()| ControllerEvent::MemoryObjectLengthChanged {
                entity_id,
                configuration_index: *configuration_index,
                memory_object_index: *memory_object_index,
                length: *length,
            }),
        DynamicInfo::StreamFormat {
            direction,
            stream_index,
            format,
        } => stream_mut(tree, *direction, *stream_index)
            .and_then(|stream| replace(&mut stream.current_format, *format).then_some(()))
            .map(|()| ControllerEvent::StreamFormatChanged {
                entity_id,
                direction: *direction,
                stream_index: *stream_index,
                format: *format,
            }),
        DynamicInfo::StreamInfo {
            direction,
            stream_index,
            info,
        } => stream_mut(tree, *direction, *stream_index).and_then(|stream| {
            if replace(&mut stream.current_format, info.stream_format) {
                format_event = Some(ControllerEvent::StreamFormatChanged {
                    entity_id,
                    direction: *direction,
                    stream_index: *stream_index,
                    format: info.stream_format,
                });
            }
            replace(&mut stream.stream_info, Some(info.clone())).then(|| {
                ControllerEvent::StreamInfoChanged {
                    entity_id,
                    direction: *direction,
                    stream_index: *stream_index,
                    info: info.clone(),
                }
            })
        }),
        DynamicInfo::StreamRunning {
            direction,
            stream_index,
            running,
        } => stream_mut(tree, *direction, *stream_index)
            .and_then(|stream| replace(&mut stream.is_running, Some(*running)).then_some(()))
            .map(|()| ControllerEvent::StreamRunningChanged {
                entity_id,
                direction: *direction,
                stream_index: *stream_index,
                running: *running,
            }),
        DynamicInfo::InputStreamState {
            stream_index,
            connection,
        } => stream_mut(tree, StreamDirection::Input, *stream_index)
            .and_then(|stream| replace(&mut stream.connection, Some(*connection)).then_some(()))
            .map(|()| ControllerEvent::StreamInputConnectionChanged {
                entity_id,
                stream_index: *stream_index,
                connection: *connection,
            }),
        DynamicInfo::OutputStreamState {
            stream_index,
            connection_count,
        } => stream_mut(tree, StreamDirection::Output, *stream_index)
            .and_then(|stream| {
                let stale = stream.connections.len() != usize::from(*connection_count);
                (stale && !stream.connections.is_empty()).then(|| {
                    stream.connections.clear();
                    Vec::new()
                })
            })
            .map(|listeners| ControllerEvent::StreamOutputConnectionsChanged {
                entity_id,
                stream_index: *stream_index,
                listeners,
            }),
        DynamicInfo::OutputStreamConnection {
            stream_index,
            listener_stream,
            ..
        } => stream_mut(tree, StreamDirection::Output, *stream_index)
            .and_then(|stream| {
                stream
                    .connections
                    .insert(*listener_stream)
                    .then(|| stream.connections.iter().copied().collect())
            })
            .map(|listeners| ControllerEvent::StreamOutputConnectionsChanged {
                entity_id,
                stream_index: *stream_index,
                listeners,
            }),
        DynamicInfo::AsPath {
            avb_interface_index,
            as_path,
        } => tree
            .current_configuration_mut()
            .and_then(|cfg| cfg.avb_interfaces.get_mut(avb_interface_index))
            .and_then(|node| {
                replace(&mut node.dynamic_model.as_path, Some(as_path.clone())).then_some(())
            })
            .map(|()| ControllerEvent::AsPathChanged {
                entity_id,
                avb_interface_index: *avb_interface_index,
                as_path: as_path.clone(),
            }),
        DynamicInfo::AvbInfo {
            avb_interface_index,
            info,
        } => tree
            .current_configuration_mut()
            .and_then(|cfg| cfg.avb_interfaces.get_mut(avb_interface_index))
            .and_then(|node| {
                replace(&mut node.dynamic_model.avb_info, Some(info.clone())).then_some(())
            })
            .map(|()| ControllerEvent::AvbInfoChanged {
                entity_id,
                avb_interface_index: *avb_interface_index,
                info: info.clone(),
            }),
        DynamicInfo::Counters {
            descriptor_type,
            descriptor_index,
            counters,
        } => {
            let new = Some(counters.clone());
            let did_change = match descriptor_type {
                DescriptorType::Entity => Some(replace(&mut tree.dynamic_model.counters, new)),
                DescriptorType::AvbInterface => tree
                    .current_configuration_mut()
                    .and_then(|cfg| cfg.avb_interfaces.get_mut(descriptor_index))
                    .map(|node| replace(&mut node.dynamic_model.counters, new)),
                DescriptorType::ClockDomain => tree
                    .current_configuration_mut()
                    .and_then(|cfg| cfg.clock_domains.get_mut(descriptor_index))
                    .map(|node| replace(&mut node.dynamic_model.counters, new)),
                DescriptorType::StreamInput => {
                    stream_mut(tree, StreamDirection::Input, *descriptor_index)
                        .map(|stream| replace(&mut stream.counters, new))
                }
                DescriptorType::StreamOutput => {
                    stream_mut(tree, StreamDirection::Output, *descriptor_index)
                        .map(|stream| replace(&mut stream.counters, new))
                }
                _ => None,
            };
            did_change
                .unwrap_or(false)
                .then(|| ControllerEvent::CountersChanged {
                    entity_id,
                    descriptor_type: *descriptor_type,
                    descriptor_index: *descriptor_index,
                    counters: counters.clone(),
                })
        }
        DynamicInfo::AudioMap {
            direction,
            stream_port_index,
            map_index,
            mappings,
            ..
        } => tree
            .current_configuration_mut()
            .and_then(|cfg| cfg.stream_ports_mut(*direction).get_mut(stream_port_index))
            .and_then(|node| {
                let current = &mut node.dynamic_model.dynamic_mappings;
                let mut next = if *map_index == 0 {
                    Vec::new()
                } else {
                    current.clone()
                };
                for mapping in mappings {
                    if !next.contains(mapping) {
                        next.push(*mapping);
                    }
                }
                replace(current, next.clone()).then_some(next)
            })
            .map(|mappings| ControllerEvent::AudioMappingsChanged {
                entity_id,
                direction: *direction,
                stream_port_index: *stream_port_index,
                mappings,
            }),
        DynamicInfo::AudioMappingsAdded {
            direction,
            stream_port_index,
            mappings,
        } => tree
            .current_configuration_mut()
            .and_then(|cfg| cfg.stream_ports_mut(*direction).get_mut(stream_port_index))
            .and_then(|node| {
                let current = &mut node.dynamic_model.dynamic_mappings;
                let before = current.len();
                for mapping in mappings {
                    if !current.contains(mapping) {
                        current.push(*mapping);
                    }
                }
                (current.len() != before).then(|| current.clone())
            })
            .map(|mappings| ControllerEvent::AudioMappingsChanged {
                entity_id,
                direction: *direction,
                stream_port_index: *stream_port_index,
                mappings,
            }),
        DynamicInfo::AudioMappingsRemoved {
            direction,
            stream_port_index,
            mappings,
        } => tree
            .current_configuration_mut()
            .and_then(|cfg| cfg.stream_ports_mut(*direction).get_mut(stream_port_index))
            .and_then(|node| {
                let current = &mut node.dynamic_model.dynamic_mappings;
                let before = current.len();
                current.retain(|m| !mappings.contains(m));
                (current.len() != before).then(|| current.clone())
            })
            .map(|mappings| ControllerEvent::AudioMappingsChanged {
                entity_id,
                direction: *direction,
                stream_port_index: *stream_port_index,
                mappings,
            }),
        DynamicInfo::AcquiredState { .. }
        | DynamicInfo::LockedState { .. }
        | DynamicInfo::AssociationId { .. }
        | DynamicInfo::OperationStatus { .. } => None,
    };

    // Identify control values also drive the remote identification record.
    if let DynamicInfo::ControlValues {
        control_index,
        values,
    } = value
    {
        if entity.identify_control_index() == Some(*control_index) {
            let identifying = values.0.iter().any(|v| *v != 0);
            let now = Instant::now();
            if let Some(started) = ctx.scheduler.remote_identification(entity_id, identifying, now) {
                let event = if started {
                    ControllerEvent::IdentificationStarted { entity_id }
                } else {
                    ControllerEvent::IdentificationStopped { entity_id }
                };
                ctx.notify(entity, event);
            }
        }
    }

    let mut outcome = UpdateOutcome::Unchanged;
    for event in format_event.into_iter().chain(event) {
        ctx.notify(entity, event);
        outcome = UpdateOutcome::Changed;
    }
    outcome
}
