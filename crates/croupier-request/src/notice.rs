//! User-facing notices the connector asks the UI to show.

use std::fmt;

use croupier_protocol::{ErrorReply, Operation};

/// Something the player should be told about.
///
/// The connector decides *when*; the UI decides *how* (toast, modal, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A request has been out longer than the nag interval.
    WaitingForResponse { operation: Operation },

    /// A request has been out longer than the request timeout.
    RequestTimedOut { operation: Operation },

    /// A failed request is being sent again.
    Retrying {
        operation: Operation,
        attempt: u32,
        max_attempts: u32,
    },

    /// The server rejected a request; play can continue.
    ServerError {
        operation: Operation,
        error: ErrorReply,
    },

    /// The session cannot continue.
    Fatal {
        operation: Operation,
        error: ErrorReply,
    },
}

impl Notice {
    /// The operation the notice is about.
    pub fn operation(&self) -> Operation {
        match self {
            Self::WaitingForResponse { operation }
            | Self::RequestTimedOut { operation }
            | Self::Retrying { operation, .. }
            | Self::ServerError { operation, .. }
            | Self::Fatal { operation, .. } => *operation,
        }
    }

    /// Whether the UI should block play until the session is reloaded.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaitingForResponse { operation } => {
                write!(f, "Waiting for {operation} response...")
            }
            Self::RequestTimedOut { operation } => {
                write!(f, "{operation} request timed out")
            }
            Self::Retrying {
                operation,
                attempt,
                max_attempts,
            } => write!(f, "Retrying {operation} request... ({attempt}/{max_attempts})"),
            Self::ServerError { error, .. } => write!(f, "{error}"),
            Self::Fatal { error, .. } => write!(f, "Fatal error. {error}"),
        }
    }
}
