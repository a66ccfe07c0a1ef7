//! The request lifecycle state machine.

use std::fmt;

/// Where a request descriptor is in its send/reply cycle.
///
/// ```text
///   Idle ──(request)──→ Requested ──(connector sends)──→ Pending
///    ↑                      ↑                               │
///    │                      └──────(recovery: retry)────── Error ←─┤ error / invalid reply
///    └───(auto-demote)───── Success ←──────────────────────────────┘ success reply
/// ```
///
/// - **Idle**: nothing to do. Entering it resets the attempt counters.
/// - **Requested**: armed; waits for the connector to have no other
///   request in flight.
/// - **Pending**: sent; the next inbound message is its reply.
/// - **Success**: transient marker, demoted to `Idle` as soon as reply
///   handling finishes.
/// - **Error**: the last reply was an error or garbage, or the send was
///   refused. Stays here until recovery or a new `request` moves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RequestState {
    #[default]
    Idle,
    Requested,
    Pending,
    Success,
    Error,
}

impl RequestState {
    /// Returns `true` while the operation still wants to reach the server.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Requested | Self::Pending)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Requested => write!(f, "Requested"),
            Self::Pending => write!(f, "Pending"),
            Self::Success => write!(f, "Success"),
            Self::Error => write!(f, "Error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        assert_eq!(RequestState::default(), RequestState::Idle);
    }

    #[test]
    fn test_is_outstanding() {
        assert!(!RequestState::Idle.is_outstanding());
        assert!(RequestState::Requested.is_outstanding());
        assert!(RequestState::Pending.is_outstanding());
        assert!(!RequestState::Success.is_outstanding());
        assert!(!RequestState::Error.is_outstanding());
    }

    #[test]
    fn test_display() {
        assert_eq!(RequestState::Pending.to_string(), "Pending");
        assert_eq!(RequestState::Error.to_string(), "Error");
    }
}
