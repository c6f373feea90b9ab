// ── Static model walk ──
//
// Reads the descriptor tree top-down. Each descriptor that references
// children (configuration, audio unit, stream port, PTP instance) queues
// the reads for them, so the GetStaticModel step naturally completes when
// the last leaf arrives.

use avdecc_api::{CommandStatus, ConfigurationIndex, Descriptor, DescriptorIndex, DescriptorType};
use tracing::{debug, error, info, warn};

use super::query::QueryKey;
use super::steps::EnumerationStep;
use super::{downgrade, expect_query, raise_fatal};
use crate::controller::ControllerInner;
use crate::event::QueryErrorKind;
use crate::model::{sanity, CompatibilityFlags, ConfigurationNode, ControlledEntity, EntityNode};
use crate::pending::Outbox;

/// Types read straight from a configuration's descriptor counts. The
/// remaining types are reached through their parents.
fn is_top_level(descriptor_type: DescriptorType) -> bool {
    !matches!(
        descriptor_type,
        DescriptorType::Entity
            | DescriptorType::Configuration
            | DescriptorType::StreamPortInput
            | DescriptorType::StreamPortOutput
            | DescriptorType::AudioCluster
            | DescriptorType::AudioMap
            | DescriptorType::PtpPort
    )
}

fn is_localization(descriptor_type: DescriptorType) -> bool {
    matches!(descriptor_type, DescriptorType::Locale | DescriptorType::Strings)
}

/// Whether the whole tree of `configuration_index` is read, as opposed to
/// its localization descriptors only.
fn reads_full_tree(
    ctx: &ControllerInner,
    entity: &ControlledEntity,
    configuration_index: ConfigurationIndex,
) -> bool {
    ctx.config.full_static_enumeration
        || entity
            .tree
            .as_ref()
            .is_some_and(|tree| tree.current_configuration_index() == configuration_index)
}

fn expect_descriptor(
    entity: &mut ControlledEntity,
    configuration_index: ConfigurationIndex,
    descriptor_type: DescriptorType,
    descriptor_index: DescriptorIndex,
    out: &mut Outbox,
) {
    let already_read = entity
        .tree
        .as_ref()
        .and_then(|tree| tree.configurations.get(&configuration_index))
        .is_some_and(|configuration| configuration.contains(descriptor_type, descriptor_index));
    if !already_read {
        expect_query(
            entity,
            QueryKey::descriptor(configuration_index, descriptor_type, descriptor_index),
            out,
        );
    }
}

fn expect_range(
    entity: &mut ControlledEntity,
    configuration_index: ConfigurationIndex,
    descriptor_type: DescriptorType,
    base: DescriptorIndex,
    count: u16,
    out: &mut Outbox,
) {
    for offset in 0..count {
        let Some(index) = base.checked_add(offset) else {
            break;
        };
        expect_descriptor(entity, configuration_index, descriptor_type, index, out);
    }
}

/// Store a descriptor read during the static walk and queue its children.
/// A descriptor that cannot be placed in the tree is a protocol error.
pub(super) fn on_descriptor(
    ctx: &ControllerInner,
    entity: &mut ControlledEntity,
    configuration_index: ConfigurationIndex,
    descriptor_index: DescriptorIndex,
    descriptor: Descriptor,
    out: &mut Outbox,
) -> Result<(), CommandStatus> {
    match descriptor {
        Descriptor::Entity(descriptor) => {
            on_entity_descriptor(ctx, entity, EntityNode::from_descriptor(descriptor), out);
            Ok(())
        }
        Descriptor::Configuration(descriptor) => {
            let tree = entity.tree.as_mut().ok_or(CommandStatus::ProtocolError)?;
            let is_current = tree.current_configuration_index() == descriptor_index;
            let counts = descriptor.descriptor_counts.clone();
            let mut node = ConfigurationNode::new(descriptor);
            node.dynamic_model.is_active_configuration = is_current;
            tree.configurations.insert(descriptor_index, node);

            let full = reads_full_tree(ctx, entity, descriptor_index);
            for (descriptor_type, count) in counts {
                let wanted = if full {
                    is_top_level(descriptor_type)
                } else {
                    is_localization(descriptor_type)
                };
                if wanted {
                    expect_range(entity, descriptor_index, descriptor_type, 0, count, out);
                }
            }
            Ok(())
        }
        descriptor => {
            let full = reads_full_tree(ctx, entity, configuration_index);
            let children = children_of(&descriptor);
            let configuration = entity
                .tree
                .as_mut()
                .and_then(|tree| tree.configurations.get_mut(&configuration_index))
                .ok_or(CommandStatus::ProtocolError)?;
            if !configuration.insert_descriptor(descriptor_index, descriptor) {
                return Err(CommandStatus::ProtocolError);
            }
            if full {
                for (descriptor_type, base, count) in children {
                    expect_range(entity, configuration_index, descriptor_type, base, count, out);
                }
            }
            Ok(())
        }
    }
}

/// Child ranges referenced by a descriptor, as (type, base, count).
fn children_of(descriptor: &Descriptor) -> Vec<(DescriptorType, DescriptorIndex, u16)> {
    match descriptor {
        Descriptor::AudioUnit(unit) => vec![
            (
                DescriptorType::StreamPortInput,
                unit.base_stream_input_port,
                unit.number_of_stream_input_ports,
            ),
            (
                DescriptorType::StreamPortOutput,
                unit.base_stream_output_port,
                unit.number_of_stream_output_ports,
            ),
        ],
        Descriptor::StreamPortInput(port) | Descriptor::StreamPortOutput(port) => vec![
            (DescriptorType::AudioCluster, port.base_cluster, port.number_of_clusters),
            (DescriptorType::AudioMap, port.base_map, port.number_of_maps),
        ],
        Descriptor::PtpInstance(instance) => vec![(
            DescriptorType::PtpPort,
            instance.base_ptp_port,
            instance.number_of_ptp_ports,
        )],
        _ => Vec::new(),
    }
}

fn on_entity_descriptor(
    ctx: &ControllerInner,
    entity: &mut ControlledEntity,
    mut tree: EntityNode,
    out: &mut Outbox,
) {
    let entity_id = entity.entity_id();
    let model_id = entity.entity.entity_model_id;
    let current = tree.current_configuration_index();

    if !entity.enumeration.ignore_cached_model
        && ctx.cache.is_model_valid_for_configuration(model_id, current)
    {
        if let Some(cached) = ctx.cache.get_cached_entity_model(model_id) {
            info!(entity_id = %entity_id, entity_model_id = %model_id, "using cached entity model");
            tree.configurations = cached.configurations;
            tree.mark_active_configuration();
            entity.tree = Some(tree);
            entity.enumeration.from_cache = true;
            entity
                .enumeration
                .steps
                .insert(EnumerationStep::GetDescriptorDynamicInfo);
            return;
        }
    }

    let configurations_count = tree.static_model.configurations_count;
    debug!(entity_id = %entity_id, configurations_count, current, "reading static model");
    entity.tree = Some(tree);
    for index in 0..configurations_count {
        expect_descriptor(entity, index, DescriptorType::Configuration, index, out);
    }
}

/// Runs when the GetStaticModel step completes: resolve localized
/// strings, validate the tree and offer it to the model cache.
pub(super) fn finalize_static_model(ctx: &ControllerInner, entity: &mut ControlledEntity) {
    if entity.enumeration.from_cache {
        return;
    }
    let entity_id = entity.entity_id();
    let model_id = entity.entity.entity_model_id;
    let full_static = ctx.config.full_static_enumeration;
    let Some(tree) = entity.tree.as_mut() else {
        return;
    };

    tree.mark_active_configuration();
    for configuration in tree.configurations.values_mut() {
        configuration.select_locale(&ctx.config.preferred_locale);
    }

    let current = tree.current_configuration_index();
    match sanity::validate(tree, |index| full_static || index == current) {
        Ok(()) => {
            let is_full = full_static || tree.static_model.configurations_count <= 1;
            ctx.cache.cache_entity_model(model_id, tree.clone(), is_full);
        }
        Err(e) if ctx.config.strict_sanity_checks => {
            error!(entity_id = %entity_id, error = %e, "entity model failed sanity checks");
            raise_fatal(ctx, entity, QueryErrorKind::SanityCheck);
        }
        Err(e) => {
            warn!(entity_id = %entity_id, error = %e, "entity model failed sanity checks, downgrading");
            downgrade(
                ctx,
                entity,
                CompatibilityFlags::IEEE17221.union(CompatibilityFlags::MILAN),
            );
            entity.compatibility.mark_misbehaving();
        }
    }
}
