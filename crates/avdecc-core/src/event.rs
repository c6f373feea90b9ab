// ── Controller events ──
//
// Observer notifications, fanned out over a `broadcast` channel. Field
// change events are only emitted for advertised entities; lifecycle
// events mark the transitions observers key their own state on.

use avdecc_api::{
    AsPath, AudioMapping, AvbInfo, ConfigurationIndex, ControlValues, DescriptorCounters,
    DescriptorIndex, DescriptorType, EntityId, OperationId, SamplingRate, StreamDirection,
    StreamFormat, StreamIdentification, StreamInfo, StreamInputConnectionInfo,
};
use strum::Display;

use crate::enumeration::steps::EnumerationStep;
use crate::model::{AcquireState, CompatibilityFlags, LockState};

/// Why an entity's enumeration reported an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum QueryErrorKind {
    MilanInfo,
    RegisterUnsolicitedNotifications,
    PackedDynamicInfo,
    StaticModel,
    DescriptorDynamicInfo,
    DynamicInfo,
    /// Model failed structural validation with strict checks enabled.
    SanityCheck,
}

impl From<EnumerationStep> for QueryErrorKind {
    fn from(step: EnumerationStep) -> Self {
        match step {
            EnumerationStep::GetMilanInfo => Self::MilanInfo,
            EnumerationStep::RegisterUnsol => Self::RegisterUnsolicitedNotifications,
            EnumerationStep::CheckPackedDynamicInfoSupported => Self::PackedDynamicInfo,
            EnumerationStep::GetStaticModel => Self::StaticModel,
            EnumerationStep::GetDescriptorDynamicInfo => Self::DescriptorDynamicInfo,
            EnumerationStep::GetDynamicInfo => Self::DynamicInfo,
        }
    }
}

/// Everything observers can be told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    // ── Lifecycle ────────────────────────────────────────────────────
    EntityOnline {
        entity_id: EntityId,
    },
    EntityOffline {
        entity_id: EntityId,
    },
    /// Discovery data of an advertised entity changed.
    EntityUpdated {
        entity_id: EntityId,
    },
    EntityQueryError {
        entity_id: EntityId,
        kind: QueryErrorKind,
    },
    CompatibilityChanged {
        entity_id: EntityId,
        flags: CompatibilityFlags,
    },

    // ── Model changes ────────────────────────────────────────────────
    EntityNameChanged {
        entity_id: EntityId,
        name: String,
    },
    EntityGroupNameChanged {
        entity_id: EntityId,
        name: String,
    },
    /// The entity switched configuration; it is re-enumerated afterwards.
    ConfigurationChanged {
        entity_id: EntityId,
        configuration_index: ConfigurationIndex,
    },
    ObjectNameChanged {
        entity_id: EntityId,
        configuration_index: ConfigurationIndex,
        descriptor_type: DescriptorType,
        descriptor_index: DescriptorIndex,
        name: String,
    },
    StreamFormatChanged {
        entity_id: EntityId,
        direction: StreamDirection,
        stream_index: DescriptorIndex,
        format: StreamFormat,
    },
    StreamInfoChanged {
        entity_id: EntityId,
        direction: StreamDirection,
        stream_index: DescriptorIndex,
        info: StreamInfo,
    },
    StreamRunningChanged {
        entity_id: EntityId,
        direction: StreamDirection,
        stream_index: DescriptorIndex,
        running: bool,
    },
    StreamInputConnectionChanged {
        entity_id: EntityId,
        stream_index: DescriptorIndex,
        connection: StreamInputConnectionInfo,
    },
    StreamOutputConnectionsChanged {
        entity_id: EntityId,
        stream_index: DescriptorIndex,
        listeners: Vec<StreamIdentification>,
    },
    SamplingRateChanged {
        entity_id: EntityId,
        audio_unit_index: DescriptorIndex,
        sampling_rate: SamplingRate,
    },
    ClockSourceChanged {
        entity_id: EntityId,
        clock_domain_index: DescriptorIndex,
        clock_source_index: DescriptorIndex,
    },
    ControlValuesChanged {
        entity_id: EntityId,
        control_index: DescriptorIndex,
        values: ControlValues,
    },
    AudioMappingsChanged {
        entity_id: EntityId,
        direction: StreamDirection,
        stream_port_index: DescriptorIndex,
        mappings: Vec<AudioMapping>,
    },
    AvbInfoChanged {
        entity_id: EntityId,
        avb_interface_index: DescriptorIndex,
        info: AvbInfo,
    },
    AsPathChanged {
        entity_id: EntityId,
        avb_interface_index: DescriptorIndex,
        as_path: AsPath,
    },
    CountersChanged {
        entity_id: EntityId,
        descriptor_type: DescriptorType,
        descriptor_index: DescriptorIndex,
        counters: DescriptorCounters,
    },
    MemoryObjectLengthChanged {
        entity_id: EntityId,
        configuration_index: ConfigurationIndex,
        memory_object_index: DescriptorIndex,
        length: u64,
    },
    AssociationIdChanged {
        entity_id: EntityId,
        association_id: Option<EntityId>,
    },
    OperationProgress {
        entity_id: EntityId,
        descriptor_type: DescriptorType,
        descriptor_index: DescriptorIndex,
        operation_id: OperationId,
        percent_complete: u16,
    },

    // ── Access ───────────────────────────────────────────────────────
    AcquireStateChanged {
        entity_id: EntityId,
        state: AcquireState,
        owner: EntityId,
    },
    LockStateChanged {
        entity_id: EntityId,
        state: LockState,
        locker: EntityId,
    },
    UnsolicitedRegistrationChanged {
        entity_id: EntityId,
        subscribed: bool,
    },

    // ── Diagnostics ──────────────────────────────────────────────────
    StatisticsChanged {
        entity_id: EntityId,
    },
    IdentificationStarted {
        entity_id: EntityId,
    },
    IdentificationStopped {
        entity_id: EntityId,
    },
}

impl ControllerEvent {
    /// Entity the event is about.
    pub fn entity_id(&self) -> EntityId {
        match self {
            Self::EntityOnline { entity_id }
            | Self::EntityOffline { entity_id }
            | Self::EntityUpdated { entity_id }
            | Self::EntityQueryError { entity_id, .. }
            | Self::CompatibilityChanged { entity_id, .. }
            | Self::EntityNameChanged { entity_id, .. }
            | Self::EntityGroupNameChanged { entity_id, .. }
            | Self::ConfigurationChanged { entity_id, .. }
            | Self::ObjectNameChanged { entity_id, .. }
            | Self::StreamFormatChanged { entity_id, .. }
            | Self::StreamInfoChanged { entity_id, .. }
            | Self::StreamRunningChanged { entity_id, .. }
            | Self::StreamInputConnectionChanged { entity_id, .. }
            | Self::StreamOutputConnectionsChanged { entity_id, .. }
            | Self::SamplingRateChanged { entity_id, .. }
            | Self::ClockSourceChanged { entity_id, .. }
            | Self::ControlValuesChanged { entity_id, .. }
            | Self::AudioMappingsChanged { entity_id, .. }
            | Self::AvbInfoChanged { entity_id, .. }
            | Self::AsPathChanged { entity_id, .. }
            | Self::CountersChanged { entity_id, .. }
            | Self::MemoryObjectLengthChanged { entity_id, .. }
            | Self::AssociationIdChanged { entity_id, .. }
            | Self::OperationProgress { entity_id, .. }
            | Self::AcquireStateChanged { entity_id, .. }
            | Self::LockStateChanged { entity_id, .. }
            | Self::UnsolicitedRegistrationChanged { entity_id, .. }
            | Self::StatisticsChanged { entity_id }
            | Self::IdentificationStarted { entity_id }
            | Self::IdentificationStopped { entity_id } => *entity_id,
        }
    }
}
