// ── AEM descriptor payloads ──
//
// Decoded descriptor contents as the transport hands them over. Only the
// fields a controller needs to walk and maintain the model are kept; the
// binary layout belongs to the codec.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::entity::EntityCapabilities;
use crate::identifier::{DescriptorIndex, EntityId, EntityModelId, MacAddress};

/// Maximum length, in bytes, of an AEM fixed string (names, versions).
pub const MAX_STRING_LENGTH: usize = 64;

/// Number of strings carried by one STRINGS descriptor.
pub const STRINGS_PER_DESCRIPTOR: usize = 7;

/// `control_type` of the IEEE 1722.1 IDENTIFY control.
pub const IDENTIFY_CONTROL_TYPE: u64 = 0x90E0_F000_0000_0001;

// ── DescriptorType ──────────────────────────────────────────────────

/// AEM descriptor types handled by the controller.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Default,
    Display,
    EnumIter,
)]
#[repr(u16)]
pub enum DescriptorType {
    #[default]
    Entity = 0x0000,
    Configuration = 0x0001,
    AudioUnit = 0x0002,
    StreamInput = 0x0005,
    StreamOutput = 0x0006,
    JackInput = 0x0007,
    JackOutput = 0x0008,
    AvbInterface = 0x0009,
    ClockSource = 0x000A,
    MemoryObject = 0x000B,
    Locale = 0x000C,
    Strings = 0x000D,
    StreamPortInput = 0x000E,
    StreamPortOutput = 0x000F,
    AudioCluster = 0x0014,
    AudioMap = 0x0017,
    Control = 0x001A,
    ClockDomain = 0x0024,
    Timing = 0x0026,
    PtpInstance = 0x0027,
    PtpPort = 0x0028,
}

impl DescriptorType {
    #[allow(clippy::as_conversions)]
    pub const fn value(self) -> u16 {
        self as u16
    }

    /// Whether descriptors of this type carry a user-settable object name.
    pub const fn has_object_name(self) -> bool {
        !matches!(
            self,
            Self::Locale | Self::Strings | Self::StreamPortInput | Self::StreamPortOutput | Self::AudioMap
        )
    }
}

// ── Small value types ───────────────────────────────────────────────

/// Direction of a stream or stream port, seen from the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
pub enum StreamDirection {
    Input,
    Output,
}

/// Packed IEEE 1722 stream format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamFormat(pub u64);

/// Sampling rate in Hz (pull field folded in by the codec).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SamplingRate(pub u32);

/// Reference into the localized strings table: upper 13 bits select the
/// STRINGS descriptor (relative to the locale's base), lower 3 bits the
/// string inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalizedStringReference(pub u16);

impl LocalizedStringReference {
    pub const NO_STRING: Self = Self(0xFFFF);

    pub const fn is_valid(self) -> bool {
        self.0 != Self::NO_STRING.0
    }

    pub const fn descriptor_offset(self) -> u16 {
        self.0 >> 3
    }

    pub const fn string_index(self) -> u16 {
        self.0 & 0x7
    }
}

impl Default for LocalizedStringReference {
    fn default() -> Self {
        Self::NO_STRING
    }
}

/// One channel mapping between a stream channel and a cluster channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AudioMapping {
    pub stream_index: u16,
    pub stream_channel: u16,
    pub cluster_offset: u16,
    pub cluster_channel: u16,
}

/// Current values of a CONTROL descriptor, already decoded to integers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlValues(pub Vec<u64>);

// ── Descriptor payloads ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub entity_id: EntityId,
    pub entity_model_id: EntityModelId,
    pub entity_capabilities: EntityCapabilities,
    pub entity_name: String,
    pub vendor_name_string: LocalizedStringReference,
    pub model_name_string: LocalizedStringReference,
    pub firmware_version: String,
    pub group_name: String,
    pub serial_number: String,
    pub configurations_count: u16,
    pub current_configuration: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationDescriptor {
    pub object_name: String,
    pub localized_description: LocalizedStringReference,
    pub descriptor_counts: BTreeMap<DescriptorType, u16>,
}

impl ConfigurationDescriptor {
    pub fn count_of(&self, descriptor_type: DescriptorType) -> u16 {
        self.descriptor_counts
            .get(&descriptor_type)
            .copied()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioUnitDescriptor {
    pub object_name: String,
    pub localized_description: LocalizedStringReference,
    pub clock_domain_index: DescriptorIndex,
    pub number_of_stream_input_ports: u16,
    pub base_stream_input_port: DescriptorIndex,
    pub number_of_stream_output_ports: u16,
    pub base_stream_output_port: DescriptorIndex,
    pub current_sampling_rate: SamplingRate,
    pub sampling_rates: BTreeSet<SamplingRate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub object_name: String,
    pub localized_description: LocalizedStringReference,
    pub clock_domain_index: DescriptorIndex,
    pub stream_flags: u16,
    pub current_format: StreamFormat,
    pub formats: BTreeSet<StreamFormat>,
    pub avb_interface_index: DescriptorIndex,
    pub buffer_length: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JackDescriptor {
    pub object_name: String,
    pub localized_description: LocalizedStringReference,
    pub jack_flags: u16,
    pub jack_type: u16,
    pub number_of_controls: u16,
    pub base_control: DescriptorIndex,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvbInterfaceDescriptor {
    pub object_name: String,
    pub localized_description: LocalizedStringReference,
    pub mac_address: MacAddress,
    pub interface_flags: u16,
    pub clock_identity: u64,
    pub priority1: u8,
    pub clock_class: u8,
    pub domain_number: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockSourceDescriptor {
    pub object_name: String,
    pub localized_description: LocalizedStringReference,
    pub clock_source_flags: u16,
    pub clock_source_type: u16,
    pub clock_source_identifier: u64,
    pub clock_source_location_type: DescriptorType,
    pub clock_source_location_index: DescriptorIndex,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryObjectDescriptor {
    pub object_name: String,
    pub localized_description: LocalizedStringReference,
    pub memory_object_type: u16,
    pub target_descriptor_type: DescriptorType,
    pub target_descriptor_index: DescriptorIndex,
    pub start_address: u64,
    pub maximum_length: u64,
    pub length: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocaleDescriptor {
    /// RFC 5646 language tag, e.g. `en-US`.
    pub locale_id: String,
    pub number_of_string_descriptors: u16,
    pub base_string_descriptor_index: DescriptorIndex,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringsDescriptor {
    pub strings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPortDescriptor {
    pub clock_domain_index: DescriptorIndex,
    pub port_flags: u16,
    pub number_of_controls: u16,
    pub base_control: DescriptorIndex,
    pub number_of_clusters: u16,
    pub base_cluster: DescriptorIndex,
    /// Zero means the port's mappings are dynamic and must be queried.
    pub number_of_maps: u16,
    pub base_map: DescriptorIndex,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioClusterDescriptor {
    pub object_name: String,
    pub localized_description: LocalizedStringReference,
    pub signal_type: DescriptorType,
    pub signal_index: DescriptorIndex,
    pub signal_output: u16,
    pub path_latency: u32,
    pub block_latency: u32,
    pub channel_count: u16,
    pub format: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioMapDescriptor {
    pub mappings: Vec<AudioMapping>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlDescriptor {
    pub object_name: String,
    pub localized_description: LocalizedStringReference,
    pub block_latency: u32,
    pub control_latency: u32,
    pub control_domain: u16,
    pub control_type: u64,
    pub reset_time: u32,
    pub signal_type: DescriptorType,
    pub signal_index: DescriptorIndex,
    pub number_of_values: u16,
    pub values: ControlValues,
}

impl ControlDescriptor {
    pub fn is_identify(&self) -> bool {
        self.control_type == IDENTIFY_CONTROL_TYPE
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockDomainDescriptor {
    pub object_name: String,
    pub localized_description: LocalizedStringReference,
    pub clock_source_index: DescriptorIndex,
    pub clock_sources: Vec<DescriptorIndex>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingDescriptor {
    pub object_name: String,
    pub localized_description: LocalizedStringReference,
    pub algorithm: u16,
    pub ptp_instances: Vec<DescriptorIndex>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtpInstanceDescriptor {
    pub object_name: String,
    pub localized_description: LocalizedStringReference,
    pub clock_identity: u64,
    pub flags: u32,
    pub number_of_controls: u16,
    pub base_control: DescriptorIndex,
    pub number_of_ptp_ports: u16,
    pub base_ptp_port: DescriptorIndex,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtpPortDescriptor {
    pub object_name: String,
    pub localized_description: LocalizedStringReference,
    pub port_number: u16,
    pub port_type: u16,
    pub flags: u32,
    pub avb_interface_index: DescriptorIndex,
    pub profile_identifier: u64,
}

// ── Descriptor ──────────────────────────────────────────────────────

/// A decoded READ_DESCRIPTOR response payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Descriptor {
    Entity(EntityDescriptor),
    Configuration(ConfigurationDescriptor),
    AudioUnit(AudioUnitDescriptor),
    StreamInput(StreamDescriptor),
    StreamOutput(StreamDescriptor),
    JackInput(JackDescriptor),
    JackOutput(JackDescriptor),
    AvbInterface(AvbInterfaceDescriptor),
    ClockSource(ClockSourceDescriptor),
    MemoryObject(MemoryObjectDescriptor),
    Locale(LocaleDescriptor),
    Strings(StringsDescriptor),
    StreamPortInput(StreamPortDescriptor),
    StreamPortOutput(StreamPortDescriptor),
    AudioCluster(AudioClusterDescriptor),
    AudioMap(AudioMapDescriptor),
    Control(ControlDescriptor),
    ClockDomain(ClockDomainDescriptor),
    Timing(TimingDescriptor),
    PtpInstance(PtpInstanceDescriptor),
    PtpPort(PtpPortDescriptor),
}

impl Descriptor {
    pub fn descriptor_type(&self) -> DescriptorType {
        match self {
            Self::Entity(_) => DescriptorType::Entity,
            Self::Configuration(_) => DescriptorType::Configuration,
            Self::AudioUnit(_) => DescriptorType::AudioUnit,
            Self::StreamInput(_) => DescriptorType::StreamInput,
            Self::StreamOutput(_) => DescriptorType::StreamOutput,
            Self::JackInput(_) => DescriptorType::JackInput,
            Self::JackOutput(_) => DescriptorType::JackOutput,
            Self::AvbInterface(_) => DescriptorType::AvbInterface,
            Self::ClockSource(_) => DescriptorType::ClockSource,
            Self::MemoryObject(_) => DescriptorType::MemoryObject,
            Self::Locale(_) => DescriptorType::Locale,
            Self::Strings(_) => DescriptorType::Strings,
            Self::StreamPortInput(_) => DescriptorType::StreamPortInput,
            Self::StreamPortOutput(_) => DescriptorType::StreamPortOutput,
            Self::AudioCluster(_) => DescriptorType::AudioCluster,
            Self::AudioMap(_) => DescriptorType::AudioMap,
            Self::Control(_) => DescriptorType::Control,
            Self::ClockDomain(_) => DescriptorType::ClockDomain,
            Self::Timing(_) => DescriptorType::Timing,
            Self::PtpInstance(_) => DescriptorType::PtpInstance,
            Self::PtpPort(_) => DescriptorType::PtpPort,
        }
    }
}

// ── Dynamic state payloads ──────────────────────────────────────────

/// GET_STREAM_INFO result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub stream_info_flags: u32,
    pub stream_format: StreamFormat,
    pub stream_id: u64,
    pub msrp_accumulated_latency: u32,
    pub stream_dest_mac: MacAddress,
    pub stream_vlan_id: u16,
}

/// GET_AVB_INFO result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvbInfo {
    pub gptp_grandmaster_id: u64,
    pub propagation_delay: u32,
    pub gptp_domain_number: u8,
    pub flags: u8,
}

/// GET_AS_PATH result: the gPTP clock identities from the grandmaster
/// down to this interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsPath {
    pub sequence: Vec<u64>,
}

/// One end of a stream connection.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct StreamIdentification {
    pub entity_id: EntityId,
    pub stream_index: DescriptorIndex,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum InputConnectionState {
    #[default]
    NotConnected,
    FastConnecting,
    Connected,
}

/// GET_RX_STATE result for a stream input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamInputConnectionInfo {
    pub state: InputConnectionState,
    /// Meaningless while `state` is `NotConnected`.
    pub talker_stream: StreamIdentification,
}

impl StreamInputConnectionInfo {
    pub const fn not_connected() -> Self {
        Self {
            state: InputConnectionState::NotConnected,
            talker_stream: StreamIdentification {
                entity_id: EntityId::NULL,
                stream_index: 0,
            },
        }
    }

    pub const fn connected(talker_stream: StreamIdentification) -> Self {
        Self {
            state: InputConnectionState::Connected,
            talker_stream,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state != InputConnectionState::NotConnected
    }
}

/// GET_COUNTERS result: validity bitmask plus the 32 counter slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorCounters {
    pub valid_flags: u32,
    pub counters: Vec<u32>,
}

/// Milan certification version, `major.minor` packed as `0xMMmm_0000`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MilanVersion(pub u32);

impl MilanVersion {
    pub const V1_0: Self = Self::new(1, 0);
    pub const V1_1: Self = Self::new(1, 1);
    pub const V1_2: Self = Self::new(1, 2);
    pub const V1_3: Self = Self::new(1, 3);

    pub const fn new(major: u8, minor: u8) -> Self {
        Self(u32::from_be_bytes([major, minor, 0, 0]))
    }

    pub const fn major(self) -> u8 {
        self.0.to_be_bytes()[0]
    }

    pub const fn minor(self) -> u8 {
        self.0.to_be_bytes()[1]
    }
}

impl std::fmt::Display for MilanVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

/// GET_MILAN_INFO result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilanInfo {
    /// Milan protocol version; zero means the entity is not Milan.
    pub protocol_version: u32,
    pub features_flags: u32,
    pub certification_version: MilanVersion,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn milan_version_ordering() {
        assert!(MilanVersion::V1_0 < MilanVersion::V1_2);
        assert_eq!(MilanVersion::V1_2.to_string(), "1.2");
    }

    #[test]
    fn localized_reference_split() {
        let r = LocalizedStringReference((2 << 3) | 5);
        assert_eq!(r.descriptor_offset(), 2);
        assert_eq!(r.string_index(), 5);
        assert!(!LocalizedStringReference::NO_STRING.is_valid());
    }

    #[test]
    fn descriptor_reports_its_type() {
        let d = Descriptor::StreamPortOutput(StreamPortDescriptor::default());
        assert_eq!(d.descriptor_type(), DescriptorType::StreamPortOutput);
        assert!(!DescriptorType::StreamPortOutput.has_object_name());
        assert!(DescriptorType::Control.has_object_name());
    }

    #[test]
    fn descriptor_counts_survive_json() {
        let configuration = ConfigurationDescriptor {
            object_name: "Live".into(),
            localized_description: LocalizedStringReference::NO_STRING,
            descriptor_counts: BTreeMap::from([
                (DescriptorType::AudioUnit, 1),
                (DescriptorType::StreamInput, 4),
            ]),
        };
        let json = serde_json::to_string(&configuration).unwrap();
        assert!(json.contains("\"StreamInput\":4"));
        let back: ConfigurationDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, configuration);
        assert_eq!(back.count_of(DescriptorType::Control), 0);
    }
}
