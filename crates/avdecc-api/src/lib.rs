// avdecc-api: protocol vocabulary and transport contract for AVDECC controllers

pub mod descriptor;
pub mod entity;
pub mod error;
pub mod identifier;
pub mod request;
pub mod status;
pub mod transport;

pub use descriptor::{
    AsPath, AudioClusterDescriptor, AudioMapDescriptor, AudioMapping, AudioUnitDescriptor,
    AvbInfo, AvbInterfaceDescriptor, ClockDomainDescriptor, ClockSourceDescriptor,
    ConfigurationDescriptor, ControlDescriptor, ControlValues, Descriptor, DescriptorCounters,
    DescriptorType, EntityDescriptor, InputConnectionState, JackDescriptor, LocaleDescriptor,
    LocalizedStringReference, MemoryObjectDescriptor, MilanInfo, MilanVersion,
    PtpInstanceDescriptor, PtpPortDescriptor, SamplingRate, StreamDescriptor, StreamDirection,
    StreamFormat, StreamIdentification, StreamInfo, StreamInputConnectionInfo,
    StreamPortDescriptor, StringsDescriptor, TimingDescriptor,
};
pub use entity::{AvbInterfaceIndex, Entity, EntityCapabilities, InterfaceInformation};
pub use error::Error;
pub use identifier::{ConfigurationIndex, DescriptorIndex, EntityId, EntityModelId, MacAddress};
pub use request::{
    DynamicInfo, DynamicInfoQuery, MemoryObjectOperation, OperationId, PackedResult, Request,
    RequestId, Response, ResponsePayload,
};
pub use status::CommandStatus;
pub use transport::ProtocolInterface;
