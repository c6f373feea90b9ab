// ── Controlled entity ──
//
// Everything the controller knows about one remote entity: discovery
// data, the enumerated model tree, access state, compatibility and
// enumeration bookkeeping. Always mutated under the registry's
// per-entity mutex.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use avdecc_api::{DescriptorIndex, Entity, EntityId, MilanInfo, MilanVersion};
use serde::{Deserialize, Serialize};
use strum::Display;

use super::tree::EntityNode;
use crate::config::ControllerConfig;
use crate::enumeration::query::QueryKey;
use crate::enumeration::steps::{EnumerationStep, EnumerationSteps};

// ── Access state ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum AcquireState {
    #[default]
    Undefined,
    NotAcquired,
    InProgress,
    Acquired,
    AcquiredByOther,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum LockState {
    #[default]
    Undefined,
    NotLocked,
    InProgress,
    Locked,
    LockedByOther,
}

// ── Compatibility ───────────────────────────────────────────────────

/// Protocol compliance claimed by an entity, as far as the controller
/// has been able to verify it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompatibilityFlags(u8);

impl CompatibilityFlags {
    pub const IEEE17221: Self = Self(0x01);
    pub const MILAN: Self = Self(0x02);
    pub const MISBEHAVING: Self = Self(0x04);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for CompatibilityFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::IEEE17221) {
            names.push("IEEE17221");
        }
        if self.contains(Self::MILAN) {
            names.push("Milan");
        }
        if self.contains(Self::MISBEHAVING) {
            names.push("Misbehaving");
        }
        if names.is_empty() {
            f.write_str("None")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

/// Compatibility flags plus the set of flags that were revoked. A revoked
/// flag is never granted again for the lifetime of the entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Compatibility {
    flags: CompatibilityFlags,
    revoked: CompatibilityFlags,
}

impl Compatibility {
    pub(crate) fn flags(self) -> CompatibilityFlags {
        self.flags
    }

    /// Returns `true` when the flags changed.
    pub(crate) fn grant(&mut self, flags: CompatibilityFlags) -> bool {
        let before = self.flags;
        self.flags = self.flags.union(flags.difference(self.revoked));
        before != self.flags
    }

    /// Returns `true` when the flags changed.
    pub(crate) fn revoke(&mut self, flags: CompatibilityFlags) -> bool {
        let before = self.flags;
        self.revoked = self.revoked.union(flags);
        self.flags = self.flags.difference(flags);
        before != self.flags
    }

    pub(crate) fn mark_misbehaving(&mut self) -> bool {
        let before = self.flags;
        self.flags = self.flags.union(CompatibilityFlags::MISBEHAVING);
        before != self.flags
    }
}

// ── Statistics ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStatistics {
    pub aecp_retry_counter: u64,
    pub aecp_timeout_counter: u64,
    pub aecp_unexpected_response_counter: u64,
    pub aecp_response_average_time: Duration,
    pub aecp_response_count: u64,
    pub unsolicited_notification_counter: u64,
    pub enumeration_time: Option<Duration>,
}

impl EntityStatistics {
    pub(crate) fn record_response_time(&mut self, elapsed: Duration) {
        let count = self.aecp_response_count.saturating_add(1);
        let total = self
            .aecp_response_average_time
            .saturating_mul(u32::try_from(self.aecp_response_count).unwrap_or(u32::MAX))
            .saturating_add(elapsed);
        self.aecp_response_count = count;
        self.aecp_response_average_time = total / u32::try_from(count).unwrap_or(u32::MAX);
    }
}

// ── Enumeration bookkeeping ─────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) struct EnumerationState {
    pub(crate) steps: EnumerationSteps,
    pub(crate) current: Option<EnumerationStep>,
    pub(crate) expected: HashSet<QueryKey>,
    pub(crate) retries: HashMap<QueryKey, u32>,
    /// Bumped whenever in-flight enumeration work must be discarded.
    pub(crate) generation: u64,
    pub(crate) packed_supported: Option<bool>,
    pub(crate) from_cache: bool,
    pub(crate) ignore_cached_model: bool,
    pub(crate) started_at: Instant,
}

impl EnumerationState {
    fn new(entity: &Entity, config: &ControllerConfig) -> Self {
        let mut steps = EnumerationSteps::empty();
        if entity.is_vendor_unique_supported() {
            steps.insert(EnumerationStep::GetMilanInfo);
        }
        let mut packed_supported = Some(false);
        if entity.is_aem_supported() {
            steps.insert(EnumerationStep::RegisterUnsol);
            if config.packed_dynamic_info {
                steps.insert(EnumerationStep::CheckPackedDynamicInfoSupported);
                packed_supported = None;
            }
            steps.insert(EnumerationStep::GetStaticModel);
            steps.insert(EnumerationStep::GetDynamicInfo);
        }
        Self {
            steps,
            current: None,
            expected: HashSet::new(),
            retries: HashMap::new(),
            generation: 0,
            packed_supported,
            from_cache: false,
            ignore_cached_model: false,
            started_at: Instant::now(),
        }
    }

    /// Drop all in-flight work and restart from the static model, ignoring
    /// any cached model.
    pub(crate) fn restart_static_model(&mut self) {
        self.expected.clear();
        self.retries.clear();
        self.current = None;
        self.generation = self.generation.wrapping_add(1);
        self.from_cache = false;
        self.ignore_cached_model = true;
        self.steps.remove(EnumerationStep::GetDescriptorDynamicInfo);
        self.steps.insert(EnumerationStep::GetStaticModel);
    }
}

// ── ControlledEntity ────────────────────────────────────────────────

/// A remote entity as seen by this controller.
#[derive(Debug, Clone)]
pub struct ControlledEntity {
    pub(crate) entity: Entity,
    pub(crate) tree: Option<EntityNode>,
    pub(crate) enumeration: EnumerationState,
    pub(crate) acquire_state: AcquireState,
    pub(crate) owning_controller: EntityId,
    pub(crate) lock_state: LockState,
    pub(crate) locking_controller: EntityId,
    pub(crate) compatibility: Compatibility,
    pub(crate) milan_info: Option<MilanInfo>,
    pub(crate) subscribed_to_unsolicited: bool,
    pub(crate) advertised: bool,
    pub(crate) fatal_enumeration_error: bool,
    pub(crate) statistics: EntityStatistics,
}

impl ControlledEntity {
    pub(crate) fn new(entity: Entity, config: &ControllerConfig) -> Self {
        let mut compatibility = Compatibility::default();
        if entity.is_aem_supported() {
            compatibility.grant(CompatibilityFlags::IEEE17221);
        }
        Self {
            enumeration: EnumerationState::new(&entity, config),
            entity,
            tree: None,
            acquire_state: AcquireState::Undefined,
            owning_controller: EntityId::NULL,
            lock_state: LockState::Undefined,
            locking_controller: EntityId::NULL,
            compatibility,
            milan_info: None,
            subscribed_to_unsolicited: false,
            advertised: false,
            fatal_enumeration_error: false,
            statistics: EntityStatistics::default(),
        }
    }

    /// A fully-populated entity that needs no enumeration.
    pub(crate) fn virtual_entity(entity: Entity, tree: EntityNode, config: &ControllerConfig) -> Self {
        let mut controlled = Self::new(entity, config);
        controlled.tree = Some(tree);
        controlled.enumeration.steps = EnumerationSteps::empty();
        controlled.enumeration.packed_supported = Some(false);
        controlled.acquire_state = AcquireState::NotAcquired;
        controlled.lock_state = LockState::NotLocked;
        controlled
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity.entity_id
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    /// The enumerated model, once the static model has been read.
    pub fn model(&self) -> Option<&EntityNode> {
        self.tree.as_ref()
    }

    pub fn acquire_state(&self) -> AcquireState {
        self.acquire_state
    }

    pub fn owning_controller(&self) -> EntityId {
        self.owning_controller
    }

    pub fn lock_state(&self) -> LockState {
        self.lock_state
    }

    pub fn locking_controller(&self) -> EntityId {
        self.locking_controller
    }

    pub fn compatibility_flags(&self) -> CompatibilityFlags {
        self.compatibility.flags()
    }

    pub fn milan_info(&self) -> Option<MilanInfo> {
        self.milan_info
    }

    pub fn is_subscribed_to_unsolicited_notifications(&self) -> bool {
        self.subscribed_to_unsolicited
    }

    pub fn is_advertised(&self) -> bool {
        self.advertised
    }

    pub fn got_fatal_enumeration_error(&self) -> bool {
        self.fatal_enumeration_error
    }

    pub fn statistics(&self) -> &EntityStatistics {
        &self.statistics
    }

    /// Whether the model came from the entity model cache.
    pub fn is_model_from_cache(&self) -> bool {
        self.enumeration.from_cache
    }

    /// Steps not yet completed.
    pub fn pending_enumeration_steps(&self) -> EnumerationSteps {
        self.enumeration.steps
    }

    /// Milan version the failure policy holds the entity to, if any.
    pub(crate) fn milan_version(&self) -> Option<MilanVersion> {
        if !self.compatibility_flags().contains(CompatibilityFlags::MILAN) {
            return None;
        }
        self.milan_info
            .filter(|info| info.protocol_version >= 1)
            .map(|info| info.certification_version.max(MilanVersion::V1_0))
    }

    /// Index of the IDENTIFY control: the one advertised over discovery,
    /// or the first identify control of the current configuration.
    pub fn identify_control_index(&self) -> Option<DescriptorIndex> {
        self.entity.identify_control_index.or_else(|| {
            self.tree
                .as_ref()
                .and_then(EntityNode::current_configuration)
                .and_then(|configuration| configuration.identify_control())
        })
    }
}

#[cfg(test)]
mod tests {
    use avdecc_api::{EntityCapabilities, EntityModelId};
    use pretty_assertions::assert_eq;

    use super::*;

    fn entity(capabilities: EntityCapabilities) -> Entity {
        Entity {
            entity_capabilities: capabilities,
            ..Entity::new(EntityId::new(0x1), EntityModelId::new(0x0001_F2FF_0000_0001))
        }
    }

    #[test]
    fn aem_entity_gets_full_step_set() {
        let controlled = ControlledEntity::new(
            entity(EntityCapabilities::AEM_SUPPORTED),
            &ControllerConfig::default(),
        );
        let steps: Vec<_> = controlled.pending_enumeration_steps().iter().collect();
        assert_eq!(
            steps,
            vec![
                EnumerationStep::RegisterUnsol,
                EnumerationStep::CheckPackedDynamicInfoSupported,
                EnumerationStep::GetStaticModel,
                EnumerationStep::GetDynamicInfo,
            ]
        );
        assert_eq!(controlled.compatibility_flags(), CompatibilityFlags::IEEE17221);
    }

    #[test]
    fn vendor_unique_entity_starts_with_milan_info() {
        let config = ControllerConfig {
            packed_dynamic_info: false,
            ..ControllerConfig::default()
        };
        let controlled = ControlledEntity::new(
            entity(EntityCapabilities::AEM_SUPPORTED | EntityCapabilities::VENDOR_UNIQUE_SUPPORTED),
            &config,
        );
        assert_eq!(
            controlled.pending_enumeration_steps().next(),
            Some(EnumerationStep::GetMilanInfo)
        );
        assert!(
            !controlled
                .pending_enumeration_steps()
                .contains(EnumerationStep::CheckPackedDynamicInfoSupported)
        );
    }

    #[test]
    fn revoked_flags_are_never_granted_again() {
        let mut compatibility = Compatibility::default();
        assert!(compatibility.grant(CompatibilityFlags::IEEE17221.union(CompatibilityFlags::MILAN)));
        assert!(compatibility.revoke(CompatibilityFlags::MILAN));
        assert!(!compatibility.grant(CompatibilityFlags::MILAN));
        assert_eq!(compatibility.flags(), CompatibilityFlags::IEEE17221);
        assert!(compatibility.mark_misbehaving());
        assert_eq!(compatibility.flags().to_string(), "IEEE17221|Misbehaving");
    }

    #[test]
    fn response_time_average() {
        let mut stats = EntityStatistics::default();
        stats.record_response_time(Duration::from_millis(10));
        stats.record_response_time(Duration::from_millis(30));
        assert_eq!(stats.aecp_response_average_time, Duration::from_millis(20));
    }
}
