//! What to do after an error reply, expressed as data.
//!
//! A policy returns a [`Recovery`]; the connector applies it. Keeping the
//! decision free of side effects lets the policy table be tested without a
//! connector.

use croupier_protocol::Operation;

use crate::Notice;

/// Facts a policy may look at when deciding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorContext {
    /// The operation whose reply was an error.
    pub operation: Operation,
    /// Sends made this cycle, including the one that just failed.
    pub attempts: u32,
    /// Sends allowed this cycle.
    pub max_attempts: u32,
    /// Whether a `StartGame` has ever succeeded on this connector.
    pub session_started: bool,
}

impl ErrorContext {
    /// Whether another send is still allowed this cycle.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// Where the failing descriptor goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextState {
    /// Back to `Requested`; the connector resends the same payload.
    Retry,
    /// Stay in `Error` until something requests the operation again.
    Hold,
    /// Back to `Idle`, counters reset.
    Idle,
    /// Give up on this cycle: `on_abandoned` fires and the descriptor is
    /// settled as if the request had never been made.
    Abandon,
}

/// A side effect the connector performs after moving the descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Raise the failing descriptor's attempt ceiling.
    SetMaxAttempts(u32),
    /// Request another operation (e.g. re-open the session).
    Request(Operation),
    /// Call the failing operation's `roll_back` handler.
    RollBack,
    /// Show a notice.
    Surface(Notice),
}

/// A policy decision: the next state plus ordered side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovery {
    pub next: NextState,
    pub effects: Vec<Effect>,
}

impl Recovery {
    fn new(next: NextState) -> Self {
        Self {
            next,
            effects: Vec::new(),
        }
    }

    pub fn retry() -> Self {
        Self::new(NextState::Retry)
    }

    pub fn hold() -> Self {
        Self::new(NextState::Hold)
    }

    pub fn idle() -> Self {
        Self::new(NextState::Idle)
    }

    pub fn abandon() -> Self {
        Self::new(NextState::Abandon)
    }

    /// Appends an effect.
    pub fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effects_keep_insertion_order() {
        let r = Recovery::hold()
            .with(Effect::RollBack)
            .with(Effect::Request(Operation::StartGame));
        assert_eq!(r.next, NextState::Hold);
        assert_eq!(
            r.effects,
            vec![Effect::RollBack, Effect::Request(Operation::StartGame)]
        );
    }

    #[test]
    fn test_can_retry() {
        let mut ctx = ErrorContext {
            operation: Operation::Bet,
            attempts: 1,
            max_attempts: 3,
            session_started: true,
        };
        assert!(ctx.can_retry());
        ctx.attempts = 3;
        assert!(!ctx.can_retry());
    }
}
