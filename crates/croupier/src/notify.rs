//! Connector-level notifications for the UI.

use croupier_protocol::{Operation, ProtocolError};
use croupier_request::{Notice, SendRefusal};
use tokio::sync::mpsc;

/// Receives everything the connector wants the player (or the log) to
/// know about.
///
/// Calls arrive on the connector task, so implementations should hand work
/// off rather than block. Every method defaults to a no-op.
pub trait Notifier: Send + 'static {
    /// The link is up (or standalone mode started).
    fn on_open(&mut self) {}

    /// A connect attempt failed; `remaining` more will be made.
    fn on_retry(&mut self, remaining: u32) {
        let _ = remaining;
    }

    /// Every connect attempt failed. Terminal.
    fn on_failed(&mut self) {}

    /// An open link went away.
    fn on_closed(&mut self) {}

    /// A send was refused before reaching the wire.
    fn on_send_failed(&mut self, op: Operation, refusal: SendRefusal) {
        let _ = (op, refusal);
    }

    /// A reply could not be decoded at all.
    fn on_receive_exception(&mut self, op: Operation, error: &ProtocolError) {
        let _ = (op, error);
    }

    /// A reply decoded but matched no schema; `reasons` lists why.
    fn on_invalid_payload(&mut self, op: Operation, reasons: &[String]) {
        let _ = (op, reasons);
    }

    /// Something to show the player.
    fn on_notice(&mut self, notice: &Notice) {
        let _ = notice;
    }
}

/// Discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {}

/// A notification as a value, for consumers that prefer a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorEvent {
    Open,
    Retry { remaining: u32 },
    Failed,
    Closed,
    SendFailed {
        operation: Operation,
        refusal: SendRefusal,
    },
    ReceiveException {
        operation: Operation,
        message: String,
    },
    InvalidPayload {
        operation: Operation,
        reasons: Vec<String>,
    },
    Notice(Notice),
}

/// Forwards notifications into a channel. Events sent after the receiver
/// is dropped are discarded.
impl Notifier for mpsc::UnboundedSender<ConnectorEvent> {
    fn on_open(&mut self) {
        let _ = self.send(ConnectorEvent::Open);
    }

    fn on_retry(&mut self, remaining: u32) {
        let _ = self.send(ConnectorEvent::Retry { remaining });
    }

    fn on_failed(&mut self) {
        let _ = self.send(ConnectorEvent::Failed);
    }

    fn on_closed(&mut self) {
        let _ = self.send(ConnectorEvent::Closed);
    }

    fn on_send_failed(&mut self, operation: Operation, refusal: SendRefusal) {
        let _ = self.send(ConnectorEvent::SendFailed { operation, refusal });
    }

    fn on_receive_exception(&mut self, operation: Operation, error: &ProtocolError) {
        let _ = self.send(ConnectorEvent::ReceiveException {
            operation,
            message: error.to_string(),
        });
    }

    fn on_invalid_payload(&mut self, operation: Operation, reasons: &[String]) {
        let _ = self.send(ConnectorEvent::InvalidPayload {
            operation,
            reasons: reasons.to_vec(),
        });
    }

    fn on_notice(&mut self, notice: &Notice) {
        let _ = self.send(ConnectorEvent::Notice(notice.clone()));
    }
}
