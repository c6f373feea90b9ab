// ── Controller-side entity model ──

pub mod entity;
pub mod sanity;
pub mod tree;

pub use entity::{
    AcquireState, CompatibilityFlags, ControlledEntity, EntityStatistics, LockState,
};
pub use sanity::SanityError;
pub use tree::{
    AudioUnitDynamic, AvbInterfaceDynamic, ClockDomainDynamic, ConfigurationDynamic,
    ConfigurationNode, ControlDynamic, DescriptorMap, EntityDynamic, EntityNode,
    MemoryObjectDynamic, NamedDynamic, Node, StreamDynamic, StreamPortDynamic,
};
