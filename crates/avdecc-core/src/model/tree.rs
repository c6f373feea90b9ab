// ── Entity model tree ──
//
// Configuration-indexed tree of descriptors, each node split into the
// static part (as read from the entity) and the dynamic part (live values
// kept current by queries and notifications). Serialized form mirrors this
// layout with `static` / `dynamic` sub-objects per node.

use std::collections::{BTreeMap, BTreeSet};

use avdecc_api::{
    AsPath, AudioClusterDescriptor, AudioMapDescriptor, AudioMapping, AudioUnitDescriptor, AvbInfo,
    AvbInterfaceDescriptor, ClockDomainDescriptor, ClockSourceDescriptor, ConfigurationDescriptor,
    ConfigurationIndex, ControlDescriptor, ControlValues, Descriptor, DescriptorCounters,
    DescriptorIndex, DescriptorType, EntityDescriptor, EntityId, JackDescriptor, LocaleDescriptor,
    LocalizedStringReference, MemoryObjectDescriptor, PtpInstanceDescriptor, PtpPortDescriptor,
    SamplingRate, StreamDescriptor, StreamDirection, StreamFormat, StreamIdentification,
    StreamInfo, StreamInputConnectionInfo, StreamPortDescriptor, StringsDescriptor,
    TimingDescriptor,
};
use avdecc_api::descriptor::STRINGS_PER_DESCRIPTOR;
use serde::{Deserialize, Serialize};

/// Descriptors of one type within one configuration, keyed by index.
pub type DescriptorMap<T> = BTreeMap<DescriptorIndex, T>;

/// A descriptor node: static model plus dynamic state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node<S, D> {
    #[serde(rename = "static")]
    pub static_model: S,
    #[serde(rename = "dynamic")]
    pub dynamic_model: D,
}

// ── Dynamic models ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedDynamic {
    pub object_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDynamic {
    pub entity_name: String,
    pub group_name: String,
    pub firmware_version: String,
    pub serial_number: String,
    pub current_configuration: ConfigurationIndex,
    pub association_id: Option<EntityId>,
    pub counters: Option<DescriptorCounters>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationDynamic {
    pub object_name: String,
    pub is_active_configuration: bool,
    /// LOCALE descriptor picked for string resolution.
    pub selected_locale: Option<DescriptorIndex>,
    /// Strings of the selected locale, keyed by `offset * 7 + index`.
    pub localized_strings: BTreeMap<u16, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioUnitDynamic {
    pub object_name: String,
    pub current_sampling_rate: SamplingRate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDynamic {
    pub object_name: String,
    pub current_format: StreamFormat,
    pub stream_info: Option<StreamInfo>,
    pub is_running: Option<bool>,
    pub counters: Option<DescriptorCounters>,
    /// Stream inputs only: which talker feeds this listener.
    #[serde(default)]
    pub connection: Option<StreamInputConnectionInfo>,
    /// Stream outputs only: listeners the talker reports.
    #[serde(default)]
    pub connections: BTreeSet<StreamIdentification>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvbInterfaceDynamic {
    pub object_name: String,
    pub avb_info: Option<AvbInfo>,
    #[serde(default)]
    pub as_path: Option<AsPath>,
    pub counters: Option<DescriptorCounters>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockDomainDynamic {
    pub object_name: String,
    pub clock_source_index: DescriptorIndex,
    pub counters: Option<DescriptorCounters>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlDynamic {
    pub object_name: String,
    pub values: ControlValues,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryObjectDynamic {
    pub object_name: String,
    pub length: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPortDynamic {
    pub dynamic_mappings: Vec<AudioMapping>,
}

pub type AudioUnitNode = Node<AudioUnitDescriptor, AudioUnitDynamic>;
pub type StreamNode = Node<StreamDescriptor, StreamDynamic>;
pub type JackNode = Node<JackDescriptor, NamedDynamic>;
pub type AvbInterfaceNode = Node<AvbInterfaceDescriptor, AvbInterfaceDynamic>;
pub type ClockSourceNode = Node<ClockSourceDescriptor, NamedDynamic>;
pub type MemoryObjectNode = Node<MemoryObjectDescriptor, MemoryObjectDynamic>;
pub type StreamPortNode = Node<StreamPortDescriptor, StreamPortDynamic>;
pub type AudioClusterNode = Node<AudioClusterDescriptor, NamedDynamic>;
pub type ControlNode = Node<ControlDescriptor, ControlDynamic>;
pub type ClockDomainNode = Node<ClockDomainDescriptor, ClockDomainDynamic>;
pub type TimingNode = Node<TimingDescriptor, NamedDynamic>;
pub type PtpInstanceNode = Node<PtpInstanceDescriptor, NamedDynamic>;
pub type PtpPortNode = Node<PtpPortDescriptor, NamedDynamic>;

fn named<S>(static_model: S, object_name: &str) -> Node<S, NamedDynamic> {
    Node {
        static_model,
        dynamic_model: NamedDynamic {
            object_name: object_name.to_owned(),
        },
    }
}

// ── ConfigurationNode ───────────────────────────────────────────────

/// One configuration and every descriptor read under it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationNode {
    #[serde(rename = "static")]
    pub static_model: ConfigurationDescriptor,
    #[serde(rename = "dynamic")]
    pub dynamic_model: ConfigurationDynamic,
    #[serde(default)]
    pub audio_units: DescriptorMap<AudioUnitNode>,
    #[serde(default)]
    pub stream_inputs: DescriptorMap<StreamNode>,
    #[serde(default)]
    pub stream_outputs: DescriptorMap<StreamNode>,
    #[serde(default)]
    pub jack_inputs: DescriptorMap<JackNode>,
    #[serde(default)]
    pub jack_outputs: DescriptorMap<JackNode>,
    #[serde(default)]
    pub avb_interfaces: DescriptorMap<AvbInterfaceNode>,
    #[serde(default)]
    pub clock_sources: DescriptorMap<ClockSourceNode>,
    #[serde(default)]
    pub memory_objects: DescriptorMap<MemoryObjectNode>,
    #[serde(default)]
    pub locales: DescriptorMap<LocaleDescriptor>,
    #[serde(default)]
    pub strings: DescriptorMap<StringsDescriptor>,
    #[serde(default)]
    pub stream_port_inputs: DescriptorMap<StreamPortNode>,
    #[serde(default)]
    pub stream_port_outputs: DescriptorMap<StreamPortNode>,
    #[serde(default)]
    pub audio_clusters: DescriptorMap<AudioClusterNode>,
    #[serde(default)]
    pub audio_maps: DescriptorMap<AudioMapDescriptor>,
    #[serde(default)]
    pub controls: DescriptorMap<ControlNode>,
    #[serde(default)]
    pub clock_domains: DescriptorMap<ClockDomainNode>,
    #[serde(default)]
    pub timings: DescriptorMap<TimingNode>,
    #[serde(default)]
    pub ptp_instances: DescriptorMap<PtpInstanceNode>,
    #[serde(default)]
    pub ptp_ports: DescriptorMap<PtpPortNode>,
}

impl ConfigurationNode {
    pub fn new(descriptor: ConfigurationDescriptor) -> Self {
        let object_name = descriptor.object_name.clone();
        Self {
            static_model: descriptor,
            dynamic_model: ConfigurationDynamic {
                object_name,
                ..ConfigurationDynamic::default()
            },
            ..Self::default()
        }
    }

    /// Store a child descriptor read under this configuration. Returns
    /// `false` for types that do not live inside a configuration.
    pub fn insert_descriptor(&mut self, index: DescriptorIndex, descriptor: Descriptor) -> bool {
        match descriptor {
            Descriptor::Entity(_) | Descriptor::Configuration(_) => return false,
            Descriptor::AudioUnit(d) => {
                let dynamic_model = AudioUnitDynamic {
                    object_name: d.object_name.clone(),
                    current_sampling_rate: d.current_sampling_rate,
                };
                self.audio_units.insert(index, Node { static_model: d, dynamic_model });
            }
            Descriptor::StreamInput(d) => {
                self.stream_inputs.insert(index, stream_node(d));
            }
            Descriptor::StreamOutput(d) => {
                self.stream_outputs.insert(index, stream_node(d));
            }
            Descriptor::JackInput(d) => {
                let name = d.object_name.clone();
                self.jack_inputs.insert(index, named(d, &name));
            }
            Descriptor::JackOutput(d) => {
                let name = d.object_name.clone();
                self.jack_outputs.insert(index, named(d, &name));
            }
            Descriptor::AvbInterface(d) => {
                let dynamic_model = AvbInterfaceDynamic {
                    object_name: d.object_name.clone(),
                    ..AvbInterfaceDynamic::default()
                };
                self.avb_interfaces.insert(index, Node { static_model: d, dynamic_model });
            }
            Descriptor::ClockSource(d) => {
                let name = d.object_name.clone();
                self.clock_sources.insert(index, named(d, &name));
            }
            Descriptor::MemoryObject(d) => {
                let dynamic_model = MemoryObjectDynamic {
                    object_name: d.object_name.clone(),
                    length: d.length,
                };
                self.memory_objects.insert(index, Node { static_model: d, dynamic_model });
            }
            Descriptor::Locale(d) => {
                self.locales.insert(index, d);
            }
            Descriptor::Strings(d) => {
                self.strings.insert(index, d);
            }
            Descriptor::StreamPortInput(d) => {
                self.stream_port_inputs.insert(index, Node { static_model: d, dynamic_model: StreamPortDynamic::default() });
            }
            Descriptor::StreamPortOutput(d) => {
                self.stream_port_outputs.insert(index, Node { static_model: d, dynamic_model: StreamPortDynamic::default() });
            }
            Descriptor::AudioCluster(d) => {
                let name = d.object_name.clone();
                self.audio_clusters.insert(index, named(d, &name));
            }
            Descriptor::AudioMap(d) => {
                self.audio_maps.insert(index, d);
            }
            Descriptor::Control(d) => {
                let dynamic_model = ControlDynamic {
                    object_name: d.object_name.clone(),
                    values: d.values.clone(),
                };
                self.controls.insert(index, Node { static_model: d, dynamic_model });
            }
            Descriptor::ClockDomain(d) => {
                let dynamic_model = ClockDomainDynamic {
                    object_name: d.object_name.clone(),
                    clock_source_index: d.clock_source_index,
                    counters: None,
                };
                self.clock_domains.insert(index, Node { static_model: d, dynamic_model });
            }
            Descriptor::Timing(d) => {
                let name = d.object_name.clone();
                self.timings.insert(index, named(d, &name));
            }
            Descriptor::PtpInstance(d) => {
                let name = d.object_name.clone();
                self.ptp_instances.insert(index, named(d, &name));
            }
            Descriptor::PtpPort(d) => {
                let name = d.object_name.clone();
                self.ptp_ports.insert(index, named(d, &name));
            }
        }
        true
    }

    /// Indices present for `descriptor_type`, in ascending order.
    pub fn indices(&self, descriptor_type: DescriptorType) -> Vec<DescriptorIndex> {
        fn keys<T>(map: &DescriptorMap<T>) -> Vec<DescriptorIndex> {
            map.keys().copied().collect()
        }
        match descriptor_type {
            DescriptorType::Entity | DescriptorType::Configuration => Vec::new(),
            DescriptorType::AudioUnit => keys(&self.audio_units),
            DescriptorType::StreamInput => keys(&self.stream_inputs),
            DescriptorType::StreamOutput => keys(&self.stream_outputs),
            DescriptorType::JackInput => keys(&self.jack_inputs),
            DescriptorType::JackOutput => keys(&self.jack_outputs),
            DescriptorType::AvbInterface => keys(&self.avb_interfaces),
            DescriptorType::ClockSource => keys(&self.clock_sources),
            DescriptorType::MemoryObject => keys(&self.memory_objects),
            DescriptorType::Locale => keys(&self.locales),
            DescriptorType::Strings => keys(&self.strings),
            DescriptorType::StreamPortInput => keys(&self.stream_port_inputs),
            DescriptorType::StreamPortOutput => keys(&self.stream_port_outputs),
            DescriptorType::AudioCluster => keys(&self.audio_clusters),
            DescriptorType::AudioMap => keys(&self.audio_maps),
            DescriptorType::Control => keys(&self.controls),
            DescriptorType::ClockDomain => keys(&self.clock_domains),
            DescriptorType::Timing => keys(&self.timings),
            DescriptorType::PtpInstance => keys(&self.ptp_instances),
            DescriptorType::PtpPort => keys(&self.ptp_ports),
        }
    }

    pub fn contains(&self, descriptor_type: DescriptorType, index: DescriptorIndex) -> bool {
        self.indices(descriptor_type).contains(&index)
    }

    pub fn object_name(&self, descriptor_type: DescriptorType, index: DescriptorIndex) -> Option<&str> {
        let name = match descriptor_type {
            DescriptorType::Configuration => &self.dynamic_model.object_name,
            DescriptorType::AudioUnit => &self.audio_units.get(&index)?.dynamic_model.object_name,
            DescriptorType::StreamInput => &self.stream_inputs.get(&index)?.dynamic_model.object_name,
            DescriptorType::StreamOutput => &self.stream_outputs.get(&index)?.dynamic_model.object_name,
            DescriptorType::JackInput => &self.jack_inputs.get(&index)?.dynamic_model.object_name,
            DescriptorType::JackOutput => &self.jack_outputs.get(&index)?.dynamic_model.object_name,
            DescriptorType::AvbInterface => &self.avb_interfaces.get(&index)?.dynamic_model.object_name,
            DescriptorType::ClockSource => &self.clock_sources.get(&index)?.dynamic_model.object_name,
            DescriptorType::MemoryObject => &self.memory_objects.get(&index)?.dynamic_model.object_name,
            DescriptorType::AudioCluster => &self.audio_clusters.get(&index)?.dynamic_model.object_name,
            DescriptorType::Control => &self.controls.get(&index)?.dynamic_model.object_name,
            DescriptorType::ClockDomain => &self.clock_domains.get(&index)?.dynamic_model.object_name,
            DescriptorType::Timing => &self.timings.get(&index)?.dynamic_model.object_name,
            DescriptorType::PtpInstance => &self.ptp_instances.get(&index)?.dynamic_model.object_name,
            DescriptorType::PtpPort => &self.ptp_ports.get(&index)?.dynamic_model.object_name,
            _ => return None,
        };
        Some(name.as_str())
    }

    pub fn object_name_mut(
        &mut self,
        descriptor_type: DescriptorType,
        index: DescriptorIndex,
    ) -> Option<&mut String> {
        let name = match descriptor_type {
            DescriptorType::Configuration => &mut self.dynamic_model.object_name,
            DescriptorType::AudioUnit => &mut self.audio_units.get_mut(&index)?.dynamic_model.object_name,
            DescriptorType::StreamInput => &mut self.stream_inputs.get_mut(&index)?.dynamic_model.object_name,
            DescriptorType::StreamOutput => &mut self.stream_outputs.get_mut(&index)?.dynamic_model.object_name,
            DescriptorType::JackInput => &mut self.jack_inputs.get_mut(&index)?.dynamic_model.object_name,
            DescriptorType::JackOutput => &mut self.jack_outputs.get_mut(&index)?.dynamic_model.object_name,
            DescriptorType::AvbInterface => &mut self.avb_interfaces.get_mut(&index)?.dynamic_model.object_name,
            DescriptorType::ClockSource => &mut self.clock_sources.get_mut(&index)?.dynamic_model.object_name,
            DescriptorType::MemoryObject => &mut self.memory_objects.get_mut(&index)?.dynamic_model.object_name,
            DescriptorType::AudioCluster => &mut self.audio_clusters.get_mut(&index)?.dynamic_model.object_name,
            DescriptorType::Control => &mut self.controls.get_mut(&index)?.dynamic_model.object_name,
            DescriptorType::ClockDomain => &mut self.clock_domains.get_mut(&index)?.dynamic_model.object_name,
            DescriptorType::Timing => &mut self.timings.get_mut(&index)?.dynamic_model.object_name,
            DescriptorType::PtpInstance => &mut self.ptp_instances.get_mut(&index)?.dynamic_model.object_name,
            DescriptorType::PtpPort => &mut self.ptp_ports.get_mut(&index)?.dynamic_model.object_name,
            _ => return None,
        };
        Some(name)
    }

    /// Every (type, index) below this configuration that carries an object name.
    pub fn named_descriptors(&self) -> Vec<(DescriptorType, DescriptorIndex)> {
        const NAMED: [DescriptorType; 14] = [
            DescriptorType::AudioUnit,
            DescriptorType::StreamInput,
            DescriptorType::StreamOutput,
            DescriptorType::JackInput,
            DescriptorType::JackOutput,
            DescriptorType::AvbInterface,
            DescriptorType::ClockSource,
            DescriptorType::MemoryObject,
            DescriptorType::AudioCluster,
            DescriptorType::Control,
            DescriptorType::ClockDomain,
            DescriptorType::Timing,
            DescriptorType::PtpInstance,
            DescriptorType::PtpPort,
        ];
        NAMED
            .iter()
            .flat_map(|ty| self.indices(*ty).into_iter().map(move |i| (*ty, i)))
            .collect()
    }

    pub fn streams(&self, direction: StreamDirection) -> &DescriptorMap<StreamNode> {
        match direction {
            StreamDirection::Input => &self.stream_inputs,
            StreamDirection::Output => &self.stream_outputs,
        }
    }

    pub fn streams_mut(&mut self, direction: StreamDirection) -> &mut DescriptorMap<StreamNode> {
        match direction {
            StreamDirection::Input => &mut self.stream_inputs,
            StreamDirection::Output => &mut self.stream_outputs,
        }
    }

    pub fn stream_ports(&self, direction: StreamDirection) -> &DescriptorMap<StreamPortNode> {
        match direction {
            StreamDirection::Input => &self.stream_port_inputs,
            StreamDirection::Output => &self.stream_port_outputs,
        }
    }

    pub fn stream_ports_mut(&mut self, direction: StreamDirection) -> &mut DescriptorMap<StreamPortNode> {
        match direction {
            StreamDirection::Input => &mut self.stream_port_inputs,
            StreamDirection::Output => &mut self.stream_port_outputs,
        }
    }

    /// Index of the IDENTIFY control, if this configuration declares one.
    pub fn identify_control(&self) -> Option<DescriptorIndex> {
        self.controls
            .iter()
            .find(|(_, node)| node.static_model.is_identify())
            .map(|(index, _)| *index)
    }

    // ── Localization ─────────────────────────────────────────────────

    /// Pick the locale matching `preferred` (exact, then language prefix),
    /// falling back to `en` and finally to the first locale, then build the
    /// localized string table from that locale's STRINGS descriptors.
    pub fn select_locale(&mut self, preferred: &str) {
        let chosen = find_locale(&self.locales, preferred)
            .or_else(|| find_locale(&self.locales, "en"))
            .or_else(|| self.locales.keys().next().copied());

        self.dynamic_model.selected_locale = chosen;
        self.dynamic_model.localized_strings.clear();

        let Some(locale) = chosen.and_then(|i| self.locales.get(&i)) else {
            return;
        };
        for offset in 0..locale.number_of_string_descriptors {
            let Some(strings) = locale
                .base_string_descriptor_index
                .checked_add(offset)
                .and_then(|i| self.strings.get(&i))
            else {
                continue;
            };
            for (slot, text) in strings.strings.iter().take(STRINGS_PER_DESCRIPTOR).enumerate() {
                let Ok(slot) = u16::try_from(slot) else {
                    continue;
                };
                let key = offset.saturating_mul(7).saturating_add(slot);
                self.dynamic_model.localized_strings.insert(key, text.clone());
            }
        }
    }

    /// Resolve a localized string reference against the selected locale.
    pub fn localized_string(&self, reference: LocalizedStringReference) -> Option<&str> {
        if !reference.is_valid() {
            return None;
        }
        let key = reference
            .descriptor_offset()
            .saturating_mul(7)
            .saturating_add(reference.string_index());
        self.dynamic_model.localized_strings.get(&key).map(String::as_str)
    }
}

fn stream_node(d: StreamDescriptor) -> StreamNode {
    let dynamic_model = StreamDynamic {
        object_name: d.object_name.clone(),
        current_format: d.current_format,
        ..StreamDynamic::default()
    };
    Node { static_model: d, dynamic_model }
}

fn find_locale(locales: &DescriptorMap<LocaleDescriptor>, wanted: &str) -> Option<DescriptorIndex> {
    let wanted = wanted.to_ascii_lowercase();
    let language = wanted.split('-').next().unwrap_or_default().to_owned();
    locales
        .iter()
        .find(|(_, l)| l.locale_id.to_ascii_lowercase() == wanted)
        .or_else(|| {
            locales.iter().find(|(_, l)| {
                let id = l.locale_id.to_ascii_lowercase();
                id.split('-').next() == Some(language.as_str())
            })
        })
        .map(|(index, _)| *index)
}

// ── EntityNode ──────────────────────────────────────────────────────

/// Root of an entity's model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityNode {
    #[serde(rename = "static")]
    pub static_model: EntityDescriptor,
    #[serde(rename = "dynamic")]
    pub dynamic_model: EntityDynamic,
    #[serde(default)]
    pub configurations: DescriptorMap<ConfigurationNode>,
}

impl EntityNode {
    pub fn from_descriptor(descriptor: EntityDescriptor) -> Self {
        let dynamic_model = EntityDynamic {
            entity_name: descriptor.entity_name.clone(),
            group_name: descriptor.group_name.clone(),
            firmware_version: descriptor.firmware_version.clone(),
            serial_number: descriptor.serial_number.clone(),
            current_configuration: descriptor.current_configuration,
            association_id: None,
            counters: None,
        };
        Self {
            static_model: descriptor,
            dynamic_model,
            configurations: DescriptorMap::new(),
        }
    }

    pub fn current_configuration_index(&self) -> ConfigurationIndex {
        self.dynamic_model.current_configuration
    }

    pub fn current_configuration(&self) -> Option<&ConfigurationNode> {
        self.configurations.get(&self.dynamic_model.current_configuration)
    }

    pub fn current_configuration_mut(&mut self) -> Option<&mut ConfigurationNode> {
        self.configurations
            .get_mut(&self.dynamic_model.current_configuration)
    }

    /// Flag the active configuration node.
    pub fn mark_active_configuration(&mut self) {
        let current = self.dynamic_model.current_configuration;
        for (index, configuration) in &mut self.configurations {
            configuration.dynamic_model.is_active_configuration = *index == current;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn locale(id: &str, base: u16) -> LocaleDescriptor {
        LocaleDescriptor {
            locale_id: id.into(),
            number_of_string_descriptors: 1,
            base_string_descriptor_index: base,
        }
    }

    fn strings(first: &str) -> StringsDescriptor {
        StringsDescriptor {
            strings: vec![first.into(), "second".into()],
        }
    }

    #[test]
    fn select_locale_prefers_exact_match() {
        let mut cfg = ConfigurationNode::default();
        cfg.locales.insert(0, locale("en-US", 0));
        cfg.locales.insert(1, locale("fr-FR", 1));
        cfg.strings.insert(0, strings("Hello"));
        cfg.strings.insert(1, strings("Bonjour"));

        cfg.select_locale("fr-FR");
        assert_eq!(cfg.dynamic_model.selected_locale, Some(1));
        assert_eq!(cfg.localized_string(LocalizedStringReference(0)), Some("Bonjour"));
    }

    #[test]
    fn select_locale_falls_back_to_english() {
        let mut cfg = ConfigurationNode::default();
        cfg.locales.insert(0, locale("de-DE", 0));
        cfg.locales.insert(1, locale("en-GB", 1));
        cfg.strings.insert(0, strings("Hallo"));
        cfg.strings.insert(1, strings("Hello"));

        cfg.select_locale("ja-JP");
        assert_eq!(cfg.dynamic_model.selected_locale, Some(1));
        assert_eq!(cfg.localized_string(LocalizedStringReference(1)), Some("second"));
        assert_eq!(cfg.localized_string(LocalizedStringReference::NO_STRING), None);
    }

    #[test]
    fn insert_descriptor_rejects_top_level_types() {
        let mut cfg = ConfigurationNode::default();
        assert!(!cfg.insert_descriptor(0, Descriptor::Configuration(ConfigurationDescriptor::default())));
        assert!(cfg.insert_descriptor(0, Descriptor::Control(ControlDescriptor::default())));
        assert_eq!(cfg.indices(DescriptorType::Control), vec![0]);
    }

    #[test]
    fn object_name_round_trip_through_dynamic_model() {
        let mut cfg = ConfigurationNode::default();
        let unit = AudioUnitDescriptor {
            object_name: "Main".into(),
            ..AudioUnitDescriptor::default()
        };
        cfg.insert_descriptor(0, Descriptor::AudioUnit(unit));
        *cfg.object_name_mut(DescriptorType::AudioUnit, 0).unwrap() = "Renamed".into();
        assert_eq!(cfg.object_name(DescriptorType::AudioUnit, 0), Some("Renamed"));
        assert_eq!(cfg.audio_units[&0].static_model.object_name, "Main");
    }
}
