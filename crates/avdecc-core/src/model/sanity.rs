// ── Entity model sanity checks ──
//
// Structural validation run once the static model of an entity has been
// read: declared descriptor counts must match what was read, indices must
// be contiguous from zero, and fixed-size strings must fit.

use avdecc_api::descriptor::MAX_STRING_LENGTH;
use avdecc_api::{ConfigurationIndex, DescriptorIndex, DescriptorType};
use thiserror::Error;

use super::tree::{ConfigurationNode, EntityNode};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SanityError {
    #[error("current configuration {0} was not read")]
    MissingCurrentConfiguration(ConfigurationIndex),

    #[error("configuration {configuration_index}: {descriptor_type} indices are not contiguous")]
    NonContiguousIndices {
        configuration_index: ConfigurationIndex,
        descriptor_type: DescriptorType,
    },

    #[error(
        "configuration {configuration_index}: {declared} {descriptor_type} declared, {found} read"
    )]
    CountMismatch {
        configuration_index: ConfigurationIndex,
        descriptor_type: DescriptorType,
        declared: u16,
        found: usize,
    },

    #[error("{field} is {length} bytes long (max 64)")]
    StringTooLong { field: String, length: usize },
}

/// `true` when the sorted `indices` are exactly `0..len`.
pub(crate) fn is_contiguous<'a>(indices: impl IntoIterator<Item = &'a DescriptorIndex>) -> bool {
    indices
        .into_iter()
        .enumerate()
        .all(|(position, index)| usize::from(*index) == position)
}

/// Compare every declared descriptor count against what was read.
pub fn check_counts(
    configuration_index: ConfigurationIndex,
    configuration: &ConfigurationNode,
) -> Result<(), SanityError> {
    for (descriptor_type, declared) in &configuration.static_model.descriptor_counts {
        let found = configuration.indices(*descriptor_type).len();
        if usize::from(*declared) != found {
            return Err(SanityError::CountMismatch {
                configuration_index,
                descriptor_type: *descriptor_type,
                declared: *declared,
                found,
            });
        }
    }
    Ok(())
}

fn check_contiguity(
    configuration_index: ConfigurationIndex,
    configuration: &ConfigurationNode,
) -> Result<(), SanityError> {
    for descriptor_type in configuration.static_model.descriptor_counts.keys() {
        if !is_contiguous(&configuration.indices(*descriptor_type)) {
            return Err(SanityError::NonContiguousIndices {
                configuration_index,
                descriptor_type: *descriptor_type,
            });
        }
    }
    Ok(())
}

fn check_string(field: impl FnOnce() -> String, value: &str) -> Result<(), SanityError> {
    if value.len() > MAX_STRING_LENGTH {
        return Err(SanityError::StringTooLong {
            field: field(),
            length: value.len(),
        });
    }
    Ok(())
}

/// Validate a freshly enumerated tree. `fully_read` tells which
/// configurations had their whole descriptor tree read; the others only
/// get index and string checks.
pub fn validate(
    tree: &EntityNode,
    fully_read: impl Fn(ConfigurationIndex) -> bool,
) -> Result<(), SanityError> {
    let entity = &tree.static_model;
    check_string(|| "entity_name".into(), &entity.entity_name)?;
    check_string(|| "group_name".into(), &entity.group_name)?;
    check_string(|| "firmware_version".into(), &entity.firmware_version)?;
    check_string(|| "serial_number".into(), &entity.serial_number)?;

    let current = tree.current_configuration_index();
    if !tree.configurations.contains_key(&current) {
        return Err(SanityError::MissingCurrentConfiguration(current));
    }

    for (index, configuration) in &tree.configurations {
        check_contiguity(*index, configuration)?;
        if fully_read(*index) {
            check_counts(*index, configuration)?;
        }
        check_string(
            || format!("configuration {index} object_name"),
            &configuration.static_model.object_name,
        )?;
        for (descriptor_type, descriptor_index) in configuration.named_descriptors() {
            if let Some(name) = configuration.object_name(descriptor_type, descriptor_index) {
                check_string(
                    || format!("{descriptor_type} {descriptor_index} object_name"),
                    name,
                )?;
            }
        }
    }
    Ok(())
}
