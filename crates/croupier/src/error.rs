//! Unified error type for Croupier.

use croupier_protocol::ProtocolError;
use croupier_request::SendRefusal;
use croupier_transport::TransportError;

/// Top-level error that wraps the layer errors.
///
/// Most failures never surface here: they are resolved inside the
/// connector and reported through the [`Notifier`](crate::Notifier).
/// What remains is construction failures and a connector task that is
/// gone.
#[derive(Debug, thiserror::Error)]
pub enum CroupierError {
    /// A transport-level error (dial, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (codec, schema compilation).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A send refused before reaching the wire.
    #[error(transparent)]
    Refused(#[from] SendRefusal),

    /// Launch parameters are missing or malformed.
    #[error("invalid launch parameters: {0}")]
    LaunchParams(String),

    /// The connector task has stopped.
    #[error("connector is no longer running")]
    Unavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let err: CroupierError = err.into();
        assert!(matches!(err, CroupierError::Transport(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let err: CroupierError = err.into();
        assert!(matches!(err, CroupierError::Protocol(_)));
    }

    #[test]
    fn test_from_send_refusal() {
        let err: CroupierError = SendRefusal::Idle.into();
        assert!(matches!(err, CroupierError::Refused(SendRefusal::Idle)));
        assert_eq!(err.to_string(), "session idle");
    }
}
