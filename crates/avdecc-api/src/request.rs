// ── Requests and responses ──
//
// The controller speaks to the transport in terms of these enums. A
// `Request` is handed over together with a `RequestId`; the transport
// answers exactly once per id with a `Response`. Unsolicited notifications
// reuse `DynamicInfo` so they flow through the same update path as
// query results.

use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use crate::descriptor::{
    AsPath, AudioMapping, AvbInfo, ControlValues, Descriptor, DescriptorCounters, DescriptorType,
    MilanInfo, SamplingRate, StreamDirection, StreamFormat, StreamIdentification, StreamInfo,
    StreamInputConnectionInfo,
};
use crate::identifier::{ConfigurationIndex, DescriptorIndex, EntityId};
use crate::status::CommandStatus;

/// Controller-assigned correlation id for one outstanding request.
pub type RequestId = u64;

/// Id of a memory-object operation, assigned by the remote entity.
pub type OperationId = u16;

/// Memory-object operations a controller may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum MemoryObjectOperation {
    StoreAndReboot,
    Read,
    Erase,
    Upload,
}

// ── DynamicInfoQuery ────────────────────────────────────────────────

/// A single dynamic-field read. Sent on its own through [`Request::Get`]
/// or batched through [`Request::GetDynamicInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, IntoStaticStr)]
pub enum DynamicInfoQuery {
    AcquiredState,
    LockedState,
    ObjectName {
        configuration_index: ConfigurationIndex,
        descriptor_type: DescriptorType,
        descriptor_index: DescriptorIndex,
    },
    SamplingRate {
        audio_unit_index: DescriptorIndex,
    },
    ClockSource {
        clock_domain_index: DescriptorIndex,
    },
    ControlValues {
        control_index: DescriptorIndex,
    },
    MemoryObjectLength {
        configuration_index: ConfigurationIndex,
        memory_object_index: DescriptorIndex,
    },
    StreamInfo {
        direction: StreamDirection,
        stream_index: DescriptorIndex,
    },
    AvbInfo {
        avb_interface_index: DescriptorIndex,
    },
    Counters {
        descriptor_type: DescriptorType,
        descriptor_index: DescriptorIndex,
    },
    AudioMap {
        direction: StreamDirection,
        stream_port_index: DescriptorIndex,
        map_index: DescriptorIndex,
    },
    /// ACMP GET_RX_STATE.
    InputStreamState {
        stream_index: DescriptorIndex,
    },
    /// ACMP GET_TX_STATE.
    OutputStreamState {
        stream_index: DescriptorIndex,
    },
    /// ACMP GET_TX_CONNECTION, one per connection announced by the talker.
    OutputStreamConnection {
        stream_index: DescriptorIndex,
        connection_index: u16,
    },
    AsPath {
        avb_interface_index: DescriptorIndex,
    },
}

// ── DynamicInfo ─────────────────────────────────────────────────────

/// A self-describing dynamic value: the answer to a [`DynamicInfoQuery`],
/// the echo of a successful setter, or an unsolicited change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr)]
pub enum DynamicInfo {
    AcquiredState {
        owner: EntityId,
    },
    LockedState {
        locker: EntityId,
    },
    EntityName(String),
    EntityGroupName(String),
    CurrentConfiguration {
        configuration_index: ConfigurationIndex,
    },
    ObjectName {
        configuration_index: ConfigurationIndex,
        descriptor_type: DescriptorType,
        descriptor_index: DescriptorIndex,
        name: String,
    },
    SamplingRate {
        audio_unit_index: DescriptorIndex,
        sampling_rate: SamplingRate,
    },
    ClockSource {
        clock_domain_index: DescriptorIndex,
        clock_source_index: DescriptorIndex,
    },
    ControlValues {
        control_index: DescriptorIndex,
        values: ControlValues,
    },
    MemoryObjectLength {
        configuration_index: ConfigurationIndex,
        memory_object_index: DescriptorIndex,
        length: u64,
    },
    StreamFormat {
        direction: StreamDirection,
        stream_index: DescriptorIndex,
        format: StreamFormat,
    },
    StreamInfo {
        direction: StreamDirection,
        stream_index: DescriptorIndex,
        info: StreamInfo,
    },
    StreamRunning {
        direction: StreamDirection,
        stream_index: DescriptorIndex,
        running: bool,
    },
    AvbInfo {
        avb_interface_index: DescriptorIndex,
        info: AvbInfo,
    },
    Counters {
        descriptor_type: DescriptorType,
        descriptor_index: DescriptorIndex,
        counters: DescriptorCounters,
    },
    /// One page of a dynamic audio map. `number_of_maps` is the total
    /// page count announced by the entity.
    AudioMap {
        direction: StreamDirection,
        stream_port_index: DescriptorIndex,
        map_index: DescriptorIndex,
        number_of_maps: u16,
        mappings: Vec<AudioMapping>,
    },
    AudioMappingsAdded {
        direction: StreamDirection,
        stream_port_index: DescriptorIndex,
        mappings: Vec<AudioMapping>,
    },
    InputStreamState {
        stream_index: DescriptorIndex,
        connection: StreamInputConnectionInfo,
    },
    /// Talker side of the connection table. A new count invalidates the
    /// listeners known so far.
    OutputStreamState {
        stream_index: DescriptorIndex,
        connection_count: u16,
    },
    OutputStreamConnection {
        stream_index: DescriptorIndex,
        connection_index: u16,
        listener_stream: StreamIdentification,
    },
    AsPath {
        avb_interface_index: DescriptorIndex,
        as_path: AsPath,
    },
    AudioMappingsRemoved {
        direction: StreamDirection,
        stream_port_index: DescriptorIndex,
        mappings: Vec<AudioMapping>,
    },
    AssociationId {
        association_id: Option<EntityId>,
    },
    OperationStatus {
        descriptor_type: DescriptorType,
        descriptor_index: DescriptorIndex,
        operation_id: OperationId,
        percent_complete: u16,
    },
}

// ── Request ─────────────────────────────────────────────────────────

/// Everything the controller may ask the transport to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr)]
pub enum Request {
    // ── Enumeration ─────────────────────────────────────────────────
    ReadDescriptor {
        configuration_index: ConfigurationIndex,
        descriptor_type: DescriptorType,
        descriptor_index: DescriptorIndex,
    },
    GetMilanInfo,
    RegisterUnsolicitedNotifications,
    DeregisterUnsolicitedNotifications,
    Get(DynamicInfoQuery),
    /// Packed dynamic-info read; answered by [`ResponsePayload::Packed`]
    /// with one result per query, in order.
    GetDynamicInfo(Vec<DynamicInfoQuery>),

    // ── Exclusive access ────────────────────────────────────────────
    AcquireEntity {
        persistent: bool,
    },
    ReleaseEntity,
    LockEntity,
    UnlockEntity,

    // ── Setters ─────────────────────────────────────────────────────
    SetEntityName(String),
    SetEntityGroupName(String),
    SetObjectName {
        configuration_index: ConfigurationIndex,
        descriptor_type: DescriptorType,
        descriptor_index: DescriptorIndex,
        name: String,
    },
    SetConfiguration {
        configuration_index: ConfigurationIndex,
    },
    SetStreamFormat {
        direction: StreamDirection,
        stream_index: DescriptorIndex,
        format: StreamFormat,
    },
    SetSamplingRate {
        audio_unit_index: DescriptorIndex,
        sampling_rate: SamplingRate,
    },
    SetClockSource {
        clock_domain_index: DescriptorIndex,
        clock_source_index: DescriptorIndex,
    },
    SetControlValues {
        control_index: DescriptorIndex,
        values: ControlValues,
    },
    StartStreaming {
        direction: StreamDirection,
        stream_index: DescriptorIndex,
    },
    StopStreaming {
        direction: StreamDirection,
        stream_index: DescriptorIndex,
    },
    AddAudioMappings {
        direction: StreamDirection,
        stream_port_index: DescriptorIndex,
        mappings: Vec<AudioMapping>,
    },
    RemoveAudioMappings {
        direction: StreamDirection,
        stream_port_index: DescriptorIndex,
        mappings: Vec<AudioMapping>,
    },
    SetMemoryObjectLength {
        configuration_index: ConfigurationIndex,
        memory_object_index: DescriptorIndex,
        length: u64,
    },
    SetAssociationId {
        association_id: Option<EntityId>,
    },

    // ── Memory-object operations ────────────────────────────────────
    StartOperation {
        descriptor_type: DescriptorType,
        descriptor_index: DescriptorIndex,
        operation: MemoryObjectOperation,
        payload: Vec<u8>,
    },
    AbortOperation {
        descriptor_type: DescriptorType,
        descriptor_index: DescriptorIndex,
        operation_id: OperationId,
    },
}

impl Request {
    /// Static name of the request kind, for logs and error messages.
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

// ── Response ────────────────────────────────────────────────────────

/// One sub-result of a packed dynamic-info response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedResult {
    pub status: CommandStatus,
    pub value: Option<DynamicInfo>,
}

/// Decoded response payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponsePayload {
    #[default]
    None,
    Descriptor(Descriptor),
    MilanInfo(MilanInfo),
    Dynamic(DynamicInfo),
    Packed(Vec<PackedResult>),
    OperationStarted {
        operation_id: OperationId,
    },
}

/// The single answer to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: CommandStatus,
    pub payload: ResponsePayload,
}

impl Response {
    pub fn success(payload: ResponsePayload) -> Self {
        Self {
            status: CommandStatus::Success,
            payload,
        }
    }

    pub fn failure(status: CommandStatus) -> Self {
        Self {
            status,
            payload: ResponsePayload::None,
        }
    }

    /// Shorthand for a successful descriptor read.
    pub fn descriptor(descriptor: Descriptor) -> Self {
        Self::success(ResponsePayload::Descriptor(descriptor))
    }

    /// Shorthand for a successful dynamic value.
    pub fn dynamic(value: DynamicInfo) -> Self {
        Self::success(ResponsePayload::Dynamic(value))
    }
}
