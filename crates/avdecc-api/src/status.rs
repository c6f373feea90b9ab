// ── Command status ──
//
// Every response the transport delivers carries exactly one status. The
// AEM statuses come straight off the wire; the trailing group is produced
// locally by the transport (timeouts, send failures, decoding problems).

use serde::{Deserialize, Serialize};
use strum::Display;

/// Outcome of an AECP/ACMP exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum CommandStatus {
    // ── AEM statuses ────────────────────────────────────────────────
    Success,
    NotImplemented,
    NoSuchDescriptor,
    LockedByOther,
    AcquiredByOther,
    NotAuthenticated,
    AuthenticationDisabled,
    BadArguments,
    NoResources,
    InProgress,
    EntityMisbehaving,
    NotSupported,
    StreamIsRunning,

    // ── Transport-level statuses ────────────────────────────────────
    /// No response within the transport's retry budget.
    TimedOut,
    /// The request could not be sent at all.
    NetworkError,
    /// The response could not be decoded or did not match the request.
    ProtocolError,
    /// The target entity is not (or no longer) known to the transport.
    UnknownEntity,
    /// The transport dropped the request while shutting down.
    Aborted,
    InternalError,
}

impl CommandStatus {
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Statuses meaning the target does not implement the command at all.
    pub const fn is_unsupported(self) -> bool {
        matches!(self, Self::NotImplemented | Self::NotSupported)
    }
}
