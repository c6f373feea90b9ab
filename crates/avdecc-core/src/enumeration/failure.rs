// ── Enumeration failure policy ──
//
// A failed enumeration query is first classified by its status, then
// judged against how much the entity is required to support the query.
// The result decides whether enumeration carries on, the entity loses
// compatibility flags, the static model is re-read, or enumeration stops.

use avdecc_api::{CommandStatus, DynamicInfoQuery, MilanVersion};

use super::query::QueryKey;
use super::steps::EnumerationStep;
use crate::model::CompatibilityFlags;

/// How a failure status should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureClass {
    /// Transient; worth asking again after a delay.
    Retry,
    /// The entity has nothing to report; carry on.
    Ignore,
    /// The entity does not implement the command.
    NotSupported,
    /// The exchange itself is broken.
    Fatal,
}

pub(crate) fn classify(status: CommandStatus) -> FailureClass {
    match status {
        CommandStatus::TimedOut
        | CommandStatus::InProgress
        | CommandStatus::NoResources
        | CommandStatus::LockedByOther
        | CommandStatus::AcquiredByOther
        | CommandStatus::StreamIsRunning => FailureClass::Retry,
        CommandStatus::NoSuchDescriptor
        | CommandStatus::BadArguments
        | CommandStatus::NotAuthenticated
        | CommandStatus::AuthenticationDisabled => FailureClass::Ignore,
        CommandStatus::NotImplemented | CommandStatus::NotSupported => FailureClass::NotSupported,
        _ => FailureClass::Fatal,
    }
}

/// Severity rank used to pick the worst status of a packed batch.
fn severity(status: CommandStatus) -> u8 {
    if status.is_success() {
        return 0;
    }
    match classify(status) {
        FailureClass::Ignore => 1,
        FailureClass::Retry => 2,
        FailureClass::NotSupported => 3,
        FailureClass::Fatal => 4,
    }
}

/// The more severe of two statuses.
pub(crate) fn worst(a: CommandStatus, b: CommandStatus) -> CommandStatus {
    if severity(b) > severity(a) { b } else { a }
}

/// How strongly an entity must answer a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Requirement {
    Optional,
    /// Mandatory for IEEE 1722.1 compliance.
    Mandatory,
    /// Mandatory for entities claiming Milan at or above this version.
    MilanSince(MilanVersion),
}

pub(crate) fn requirement(key: QueryKey) -> Requirement {
    match key {
        QueryKey::MilanInfo | QueryKey::PackedProbe => Requirement::Optional,
        QueryKey::RegisterUnsol => Requirement::MilanSince(MilanVersion::V1_0),
        QueryKey::Descriptor { .. } => Requirement::Mandatory,
        QueryKey::Dynamic(query) => match query {
            DynamicInfoQuery::AcquiredState
            | DynamicInfoQuery::ControlValues { .. }
            | DynamicInfoQuery::MemoryObjectLength { .. }
            | DynamicInfoQuery::OutputStreamConnection { .. } => Requirement::Optional,
            DynamicInfoQuery::LockedState
            | DynamicInfoQuery::ObjectName { .. }
            | DynamicInfoQuery::SamplingRate { .. }
            | DynamicInfoQuery::ClockSource { .. }
            | DynamicInfoQuery::StreamInfo { .. }
            | DynamicInfoQuery::AvbInfo { .. }
            | DynamicInfoQuery::Counters { .. }
            | DynamicInfoQuery::AudioMap { .. }
            | DynamicInfoQuery::InputStreamState { .. }
            | DynamicInfoQuery::OutputStreamState { .. }
            | DynamicInfoQuery::AsPath { .. } => Requirement::MilanSince(MilanVersion::V1_0),
        },
    }
}

/// What enumeration does about a failure that will not be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureOutcome {
    /// Drop the query and carry on.
    Ignore,
    /// Carry on, but the entity loses these compatibility flags.
    Downgrade(CompatibilityFlags),
    /// Discard the cached model and read the static model from the entity.
    FallbackToStaticEnumeration,
    /// Stop enumerating this entity.
    Fatal,
}

/// Facts about the entity the policy depends on.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FailureContext {
    pub(crate) step: Option<EnumerationStep>,
    pub(crate) milan_version: Option<MilanVersion>,
    pub(crate) model_from_cache: bool,
}

/// Decide the outcome for a failure whose retries (if any) are exhausted.
/// Exhausted retries are judged as if the query were unsupported.
pub(crate) fn resolve(key: QueryKey, class: FailureClass, ctx: FailureContext) -> FailureOutcome {
    let class = match class {
        FailureClass::Retry => FailureClass::NotSupported,
        other => other,
    };

    // Registration only matters to Milan entities, whatever went wrong.
    if key == QueryKey::RegisterUnsol {
        return if ctx.milan_version.is_some() {
            FailureOutcome::Downgrade(CompatibilityFlags::MILAN)
        } else {
            FailureOutcome::Ignore
        };
    }

    // Unsupported descriptor-level dynamic info on top of a cached model:
    // the entity may not match the cached model after all, so read it for
    // real.
    if ctx.model_from_cache
        && ctx.step == Some(EnumerationStep::GetDescriptorDynamicInfo)
        && class == FailureClass::NotSupported
    {
        return FailureOutcome::FallbackToStaticEnumeration;
    }

    let milan_required = |since: MilanVersion| ctx.milan_version.is_some_and(|v| v >= since);

    match (requirement(key), class) {
        (_, FailureClass::Retry) => FailureOutcome::Ignore,
        (Requirement::Optional, FailureClass::Ignore | FailureClass::NotSupported) => {
            FailureOutcome::Ignore
        }
        (Requirement::Optional, FailureClass::Fatal) => FailureOutcome::Fatal,
        (Requirement::Mandatory, FailureClass::Ignore) => FailureOutcome::Downgrade(
            CompatibilityFlags::IEEE17221.union(CompatibilityFlags::MILAN),
        ),
        (Requirement::Mandatory, FailureClass::NotSupported | FailureClass::Fatal) => {
            FailureOutcome::Fatal
        }
        (Requirement::MilanSince(since), FailureClass::Ignore | FailureClass::NotSupported) => {
            if milan_required(since) {
                FailureOutcome::Downgrade(CompatibilityFlags::MILAN)
            } else {
                FailureOutcome::Ignore
            }
        }
        (Requirement::MilanSince(_), FailureClass::Fatal) => FailureOutcome::Fatal,
    }
}
