// ── Dynamic query sets ──

use avdecc_api::{DescriptorType, DynamicInfo, DynamicInfoQuery, StreamDirection};

use super::send_dynamic_queries;
use crate::controller::ControllerInner;
use crate::model::ControlledEntity;
use crate::pending::Outbox;

const DIRECTIONS: [StreamDirection; 2] = [StreamDirection::Input, StreamDirection::Output];

/// Values that live in descriptors but may have changed since the model
/// was cached: object names, sampling rates, clock sources, control values
/// and memory object lengths.
pub(super) fn descriptor_dynamic_queries(entity: &ControlledEntity) -> Vec<DynamicInfoQuery> {
    let Some(tree) = entity.tree.as_ref() else {
        return Vec::new();
    };
    let mut queries = Vec::new();

    for configuration_index in tree.configurations.keys() {
        queries.push(DynamicInfoQuery::ObjectName {
            configuration_index: *configuration_index,
            descriptor_type: DescriptorType::Configuration,
            descriptor_index: *configuration_index,
        });
    }

    let configuration_index = tree.current_configuration_index();
    let Some(configuration) = tree.current_configuration() else {
        return queries;
    };

    for (descriptor_type, descriptor_index) in configuration.named_descriptors() {
        queries.push(DynamicInfoQuery::ObjectName {
            configuration_index,
            descriptor_type,
            descriptor_index,
        });
    }
    for audio_unit_index in configuration.audio_units.keys() {
        queries.push(DynamicInfoQuery::SamplingRate {
            audio_unit_index: *audio_unit_index,
        });
    }
    for clock_domain_index in configuration.clock_domains.keys() {
        queries.push(DynamicInfoQuery::ClockSource {
            clock_domain_index: *clock_domain_index,
        });
    }
    for control_index in configuration.controls.keys() {
        queries.push(DynamicInfoQuery::ControlValues {
            control_index: *control_index,
        });
    }
    for memory_object_index in configuration.memory_objects.keys() {
        queries.push(DynamicInfoQuery::MemoryObjectLength {
            configuration_index,
            memory_object_index: *memory_object_index,
        });
    }
    queries
}

/// Values never stored in descriptors: access state, stream and
/// interface state, stream connections, counters and dynamic audio maps.
pub(super) fn dynamic_queries(entity: &ControlledEntity) -> Vec<DynamicInfoQuery> {
    let mut queries = vec![DynamicInfoQuery::AcquiredState, DynamicInfoQuery::LockedState];

    let Some(configuration) = entity.tree.as_ref().and_then(|tree| tree.current_configuration())
    else {
        return queries;
    };

    queries.push(DynamicInfoQuery::Counters {
        descriptor_type: DescriptorType::Entity,
        descriptor_index: 0,
    });
    for direction in DIRECTIONS {
        for stream_index in configuration.streams(direction).keys() {
            let stream_index = *stream_index;
            queries.push(DynamicInfoQuery::StreamInfo {
                direction,
                stream_index,
            });
            queries.push(match direction {
                StreamDirection::Input => DynamicInfoQuery::InputStreamState { stream_index },
                StreamDirection::Output => DynamicInfoQuery::OutputStreamState { stream_index },
            });
        }
    }
    for avb_interface_index in configuration.avb_interfaces.keys() {
        queries.push(DynamicInfoQuery::AvbInfo {
            avb_interface_index: *avb_interface_index,
        });
        queries.push(DynamicInfoQuery::AsPath {
            avb_interface_index: *avb_interface_index,
        });
        queries.push(DynamicInfoQuery::Counters {
            descriptor_type: DescriptorType::AvbInterface,
            descriptor_index: *avb_interface_index,
        });
    }
    for clock_domain_index in configuration.clock_domains.keys() {
        queries.push(DynamicInfoQuery::Counters {
            descriptor_type: DescriptorType::ClockDomain,
            descriptor_index: *clock_domain_index,
        });
    }
    for (descriptor_type, streams) in [
        (DescriptorType::StreamInput, &configuration.stream_inputs),
        (DescriptorType::StreamOutput, &configuration.stream_outputs),
    ] {
        for stream_index in streams.keys() {
            queries.push(DynamicInfoQuery::Counters {
                descriptor_type,
                descriptor_index: *stream_index,
            });
        }
    }
    // Ports without static maps carry their mappings dynamically.
    for direction in DIRECTIONS {
        for (stream_port_index, port) in configuration.stream_ports(direction) {
            if port.static_model.number_of_maps == 0 {
                queries.push(DynamicInfoQuery::AudioMap {
                    direction,
                    stream_port_index: *stream_port_index,
                    map_index: 0,
                });
            }
        }
    }
    queries
}

/// Queue the queries a result announces: further audio map pages, or
/// one connection query per listener of a talker stream. Only while
/// enumerating; advertised entities keep what notifications tell them.
pub(super) fn queue_follow_ups(
    ctx: &ControllerInner,
    entity: &mut ControlledEntity,
    value: &DynamicInfo,
    out: &mut Outbox,
) {
    if entity.advertised {
        return;
    }
    match value {
        DynamicInfo::AudioMap { .. } => on_audio_map_page(ctx, entity, value, out),
        DynamicInfo::OutputStreamState {
            stream_index,
            connection_count,
        } => {
            let queries = (0..*connection_count)
                .map(|connection_index| DynamicInfoQuery::OutputStreamConnection {
                    stream_index: *stream_index,
                    connection_index,
                })
                .collect();
            send_dynamic_queries(ctx, entity, queries, out);
        }
        _ => {}
    }
}

/// Request the next page of a paginated dynamic audio map.
fn on_audio_map_page(
    ctx: &ControllerInner,
    entity: &mut ControlledEntity,
    value: &DynamicInfo,
    out: &mut Outbox,
) {
    let DynamicInfo::AudioMap {
        direction,
        stream_port_index,
        map_index,
        number_of_maps,
        ..
    } = value
    else {
        return;
    };
    let Some(next) = map_index.checked_add(1) else {
        return;
    };
    if next >= *number_of_maps {
        return;
    }
    send_dynamic_queries(
        ctx,
        entity,
        vec![DynamicInfoQuery::AudioMap {
            direction: *direction,
            stream_port_index: *stream_port_index,
            map_index: next,
        }],
        out,
    );
}
