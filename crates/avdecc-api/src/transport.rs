// ── Transport contract ──
//
// The controller never touches the network itself. A `ProtocolInterface`
// takes requests, sends them, and later reports each outcome back through
// `Controller::handle_response` with the same `RequestId`.

use crate::error::Error;
use crate::identifier::EntityId;
use crate::request::{Request, RequestId};

/// The protocol layer the controller drives.
///
/// Implementations own encoding, retransmission and timeouts. `send` must
/// not block on the network: it queues the request and returns. Every
/// accepted request is answered exactly once, with a transport-level
/// status such as [`CommandStatus::TimedOut`](crate::CommandStatus::TimedOut)
/// if nothing came back.
pub trait ProtocolInterface: Send + Sync + 'static {
    /// Entity id this controller uses on the network.
    fn controller_id(&self) -> EntityId;

    /// Queue `request` for `target`. An `Err` means the request was never
    /// accepted and no response will follow.
    fn send(&self, request_id: RequestId, target: EntityId, request: Request) -> Result<(), Error>;
}
