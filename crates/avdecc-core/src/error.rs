// ── Core error types ──
//
// User-facing errors from avdecc-core. Callers never see raw transport
// errors: the `From<avdecc_api::Error>` impl folds them into controller
// variants, and failed commands surface their protocol status.

use avdecc_api::{CommandStatus, EntityId};
use thiserror::Error;

use crate::model::SanityError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Entity errors ────────────────────────────────────────────────
    #[error("Unknown entity: {entity_id}")]
    UnknownEntity { entity_id: EntityId },

    #[error("Entity {entity_id} went offline before the command completed")]
    EntityOffline { entity_id: EntityId },

    // ── Access errors ────────────────────────────────────────────────
    #[error("Another {operation} is already in progress for {entity_id}")]
    Busy {
        entity_id: EntityId,
        operation: &'static str,
    },

    #[error("Entity {entity_id} is held by controller {owner}")]
    AccessDenied { entity_id: EntityId, owner: EntityId },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("{command} failed with status {status}")]
    CommandFailed {
        command: &'static str,
        status: CommandStatus,
    },

    #[error("Operation not supported: {operation}")]
    NotSupported { operation: String },

    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("Controller is shut down")]
    ControllerShutdown,

    // ── Model errors ─────────────────────────────────────────────────
    #[error("Entity model failed sanity check: {0}")]
    Sanity(#[from] SanityError),

    #[error("Entity model serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    // ── Transport errors (wrapped, not exposed raw) ──────────────────
    #[error("Transport error: {message}")]
    Transport { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<avdecc_api::Error> for CoreError {
    fn from(err: avdecc_api::Error) -> Self {
        match err {
            avdecc_api::Error::InvalidIdentifier { input, reason } => CoreError::InvalidArgument {
                reason: format!("{input}: {reason}"),
            },
            avdecc_api::Error::TransportClosed => CoreError::ControllerShutdown,
            other => CoreError::Transport {
                message: other.to_string(),
            },
        }
    }
}

impl CoreError {
    /// Map a failed command status to the matching error.
    pub(crate) fn from_status(
        command: &'static str,
        entity_id: EntityId,
        status: CommandStatus,
        owner: Option<EntityId>,
    ) -> Self {
        match (status, owner) {
            (CommandStatus::AcquiredByOther | CommandStatus::LockedByOther, Some(owner)) => {
                CoreError::AccessDenied { entity_id, owner }
            }
            (CommandStatus::UnknownEntity, _) => CoreError::UnknownEntity { entity_id },
            (CommandStatus::NotImplemented | CommandStatus::NotSupported, _) => {
                CoreError::NotSupported {
                    operation: command.to_owned(),
                }
            }
            _ => CoreError::CommandFailed { command, status },
        }
    }
}
