// ── Discovered entity record ──
//
// What the discovery protocol (ADP) tells us about a remote entity.
// The controller treats an `Entity` as read-only: every discovery event
// carries a complete replacement.

use std::collections::BTreeMap;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use crate::identifier::{EntityId, EntityModelId, MacAddress};

/// Index of a network interface on an entity (AVB_INTERFACE descriptor index).
pub type AvbInterfaceIndex = u16;

// ── EntityCapabilities ──────────────────────────────────────────────

/// Entity capability bits advertised in ADP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityCapabilities(u32);

impl EntityCapabilities {
    pub const EFU_MODE: Self = Self(0x0000_0001);
    pub const ADDRESS_ACCESS_SUPPORTED: Self = Self(0x0000_0002);
    pub const GATEWAY_ENTITY: Self = Self(0x0000_0004);
    pub const AEM_SUPPORTED: Self = Self(0x0000_0008);
    pub const LEGACY_AVC: Self = Self(0x0000_0010);
    pub const ASSOCIATION_ID_SUPPORTED: Self = Self(0x0000_0020);
    pub const ASSOCIATION_ID_VALID: Self = Self(0x0000_0040);
    pub const VENDOR_UNIQUE_SUPPORTED: Self = Self(0x0000_0080);
    pub const CLASS_A_SUPPORTED: Self = Self(0x0000_0100);
    pub const CLASS_B_SUPPORTED: Self = Self(0x0000_0200);
    pub const GPTP_SUPPORTED: Self = Self(0x0000_0400);
    pub const AEM_AUTHENTICATION_SUPPORTED: Self = Self(0x0000_0800);
    pub const AEM_AUTHENTICATION_REQUIRED: Self = Self(0x0000_1000);
    pub const AEM_PERSISTENT_ACQUIRE_SUPPORTED: Self = Self(0x0000_2000);
    pub const AEM_IDENTIFY_CONTROL_INDEX_VALID: Self = Self(0x0000_4000);
    pub const AEM_INTERFACE_INDEX_VALID: Self = Self(0x0000_8000);
    pub const GENERAL_CONTROLLER_IGNORE: Self = Self(0x0001_0000);
    pub const ENTITY_NOT_READY: Self = Self(0x0002_0000);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for EntityCapabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ── InterfaceInformation ────────────────────────────────────────────

/// Per-interface discovery information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceInformation {
    pub mac_address: MacAddress,
    /// Advertisement validity, in 2-second units.
    pub valid_time: u8,
    pub available_index: u32,
    pub gptp_grandmaster_id: Option<u64>,
    pub gptp_domain_number: Option<u8>,
}

// ── Entity ──────────────────────────────────────────────────────────

/// A discovered entity, as reported by the discovery layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: EntityId,
    pub entity_model_id: EntityModelId,
    pub entity_capabilities: EntityCapabilities,
    pub talker_stream_sources: u16,
    pub talker_capabilities: u16,
    pub listener_stream_sinks: u16,
    pub listener_capabilities: u16,
    pub controller_capabilities: u32,
    pub identify_control_index: Option<u16>,
    pub association_id: Option<EntityId>,
    pub interfaces: BTreeMap<AvbInterfaceIndex, InterfaceInformation>,
}

impl Entity {
    /// A minimal AEM-capable entity with no interfaces. Discovery layers
    /// fill in the rest with struct update syntax.
    pub fn new(entity_id: EntityId, entity_model_id: EntityModelId) -> Self {
        Self {
            entity_id,
            entity_model_id,
            entity_capabilities: EntityCapabilities::AEM_SUPPORTED,
            talker_stream_sources: 0,
            talker_capabilities: 0,
            listener_stream_sinks: 0,
            listener_capabilities: 0,
            controller_capabilities: 0,
            identify_control_index: None,
            association_id: None,
            interfaces: BTreeMap::new(),
        }
    }

    pub fn is_aem_supported(&self) -> bool {
        self.entity_capabilities
            .contains(EntityCapabilities::AEM_SUPPORTED)
    }

    pub fn is_vendor_unique_supported(&self) -> bool {
        self.entity_capabilities
            .contains(EntityCapabilities::VENDOR_UNIQUE_SUPPORTED)
    }
}
