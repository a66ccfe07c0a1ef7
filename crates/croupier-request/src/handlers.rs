//! Per-operation callbacks supplied by game feature code.

use croupier_protocol::{ErrorReply, Operation};
use serde_json::{Map, Value};

/// Hooks a game registers for one operation.
///
/// Every method has a no-op default, so a handler only overrides what it
/// cares about. All calls happen on the connector's task, in this order
/// for one reply:
///
/// ```text
/// on_recv_any → (on_recv_success | on_recv_error | on_recv_invalid)
///             → roll_back / on_abandoned (when recovery asks for them)
/// ```
pub trait RequestHandlers: Send + 'static {
    /// Operation-specific request fields (`bet`, `gameData`, ...).
    ///
    /// Called once per request cycle, when the descriptor leaves `Idle`.
    /// Retries resend the same payload. The envelope keys (`action`,
    /// `sessionId`, `sessionToken`) are added afterwards and always win.
    fn build_payload(&mut self, op: Operation) -> Map<String, Value> {
        let _ = op;
        Map::new()
    }

    /// The request went out; `attempt` counts from 1 within the cycle.
    fn on_send(&mut self, op: Operation, attempt: u32) {
        let _ = (op, attempt);
    }

    /// Any inbound message was routed to this operation. `raw` is `None`
    /// for a canned reply that carried no text.
    fn on_recv_any(&mut self, op: Operation, raw: Option<&str>) {
        let _ = (op, raw);
    }

    /// The reply matched the operation's success schema.
    fn on_recv_success(&mut self, op: Operation, reply: &Value) {
        let _ = (op, reply);
    }

    /// The reply matched the shared error schema.
    fn on_recv_error(&mut self, op: Operation, error: &ErrorReply) {
        let _ = (op, error);
    }

    /// The reply was JSON but matched neither schema.
    fn on_recv_invalid(&mut self, op: Operation, raw: &str) {
        let _ = (op, raw);
    }

    /// Undo optimistic local effects of the failed request (e.g. give the
    /// stake back to the displayed balance).
    fn roll_back(&mut self, op: Operation) {
        let _ = op;
    }

    /// The error was surfaced and the operation gave up on this cycle.
    ///
    /// The descriptor is treated as settled afterwards; no success callback
    /// fires.
    fn on_abandoned(&mut self, op: Operation, error: &ErrorReply) {
        let _ = (op, error);
    }
}

/// Handlers that do nothing; used for operations a game never registers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandlers;

impl RequestHandlers for NoopHandlers {}
