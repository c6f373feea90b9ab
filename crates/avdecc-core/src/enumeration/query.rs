// ── Enumeration query keys ──

use avdecc_api::{
    ConfigurationIndex, DescriptorIndex, DescriptorType, DynamicInfoQuery, Request,
};

/// Query sent on a single entity to probe packed dynamic-info support.
pub const PACKED_PROBE_QUERY: DynamicInfoQuery = DynamicInfoQuery::Counters {
    descriptor_type: DescriptorType::Entity,
    descriptor_index: 0,
};

/// Identity of one outstanding enumeration query. An entity's
/// enumeration step completes when its set of expected keys drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    MilanInfo,
    RegisterUnsol,
    PackedProbe,
    Descriptor {
        configuration_index: ConfigurationIndex,
        descriptor_type: DescriptorType,
        descriptor_index: DescriptorIndex,
    },
    Dynamic(DynamicInfoQuery),
}

impl QueryKey {
    pub const fn descriptor(
        configuration_index: ConfigurationIndex,
        descriptor_type: DescriptorType,
        descriptor_index: DescriptorIndex,
    ) -> Self {
        Self::Descriptor {
            configuration_index,
            descriptor_type,
            descriptor_index,
        }
    }

    /// Discrete request for this key.
    pub fn to_request(self) -> Request {
        match self {
            Self::MilanInfo => Request::GetMilanInfo,
            Self::RegisterUnsol => Request::RegisterUnsolicitedNotifications,
            Self::PackedProbe => Request::GetDynamicInfo(vec![PACKED_PROBE_QUERY]),
            Self::Descriptor {
                configuration_index,
                descriptor_type,
                descriptor_index,
            } => Request::ReadDescriptor {
                configuration_index,
                descriptor_type,
                descriptor_index,
            },
            Self::Dynamic(query) => Request::Get(query),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::MilanInfo => "MilanInfo",
            Self::RegisterUnsol => "RegisterUnsol",
            Self::PackedProbe => "PackedProbe",
            Self::Descriptor { .. } => "Descriptor",
            Self::Dynamic(query) => query.into(),
        }
    }
}
