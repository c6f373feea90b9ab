use thiserror::Error;

/// Top-level error type for the `avdecc-api` crate.
///
/// Covers the failures a transport can report synchronously when a request
/// is handed to it, plus parse errors for the textual identifier forms.
/// Protocol-level outcomes (timeouts, rejected commands) are not errors here:
/// they arrive later as a [`CommandStatus`](crate::CommandStatus) on the
/// response. `avdecc-core` maps these into controller diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// The protocol interface has been shut down and accepts no more requests.
    #[error("Protocol interface closed")]
    TransportClosed,

    /// The network interface backing the transport is gone or not usable.
    #[error("Network interface unavailable: {0}")]
    InterfaceUnavailable(String),

    /// The request could not be encoded into a protocol frame.
    #[error("Failed to encode {request}: {reason}")]
    Encoding { request: String, reason: String },

    /// The encoded request does not fit in a single protocol frame.
    #[error("Payload too large for {request}: {size} bytes")]
    PayloadTooLarge { request: String, size: usize },

    // ── Parsing ─────────────────────────────────────────────────────
    /// A textual identifier (entity id, MAC address) could not be parsed.
    #[error("Invalid identifier '{input}': {reason}")]
    InvalidIdentifier { input: String, reason: String },
}
