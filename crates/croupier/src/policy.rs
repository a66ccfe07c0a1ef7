//! Error-recovery policies.
//!
//! A policy maps an error reply to a [`Recovery`]: the failing request's
//! next state and the side effects to run. [`CasinoRecovery`] is the rule
//! table casino servers expect; anything else can be plugged in per
//! operation through the builder.

use croupier_protocol::{ErrorReply, Operation};
use croupier_request::{Effect, ErrorContext, Notice, Recovery};

/// Decides how to recover from an error reply.
pub trait RecoveryPolicy: Send + 'static {
    fn decide(&self, ctx: &ErrorContext, error: &ErrorReply) -> Recovery;
}

impl<F> RecoveryPolicy for F
where
    F: Fn(&ErrorContext, &ErrorReply) -> Recovery + Send + 'static,
{
    fn decide(&self, ctx: &ErrorContext, error: &ErrorReply) -> Recovery {
        self(ctx, error)
    }
}

/// The fallback for any error nobody handles specially: show it and carry
/// on as if the request had not been made.
pub fn surface_and_abandon(ctx: &ErrorContext, error: &ErrorReply) -> Recovery {
    Recovery::abandon().with(Effect::Surface(Notice::ServerError {
        operation: ctx.operation,
        error: error.clone(),
    }))
}

/// Rule table keyed on the server's error `code`.
///
/// | code | action |
/// |---|---|
/// | `StartException` | restart the session, up to 4 tries for `StartGame` and 3 for the rest |
/// | `StepException` | fallback |
/// | `BetException` | roll back, then fallback |
/// | `RoundError` | restart the session |
/// | anything else | fallback ([`surface_and_abandon`]) |
#[derive(Debug, Clone, Copy, Default)]
pub struct CasinoRecovery;

impl CasinoRecovery {
    /// Attempt ceiling once a `StartException` escalates.
    pub fn start_exception_ceiling(op: Operation) -> u32 {
        match op {
            Operation::StartGame => 4,
            _ => 3,
        }
    }
}

impl RecoveryPolicy for CasinoRecovery {
    fn decide(&self, ctx: &ErrorContext, error: &ErrorReply) -> Recovery {
        match error.code.as_str() {
            "StartException" => start_exception(ctx, error),
            "BetException" => {
                let fallback = surface_and_abandon(ctx, error);
                let mut effects = vec![Effect::RollBack];
                effects.extend(fallback.effects);
                Recovery {
                    next: fallback.next,
                    effects,
                }
            }
            "RoundError" => Recovery::idle().with(Effect::Request(Operation::StartGame)),
            _ => surface_and_abandon(ctx, error),
        }
    }
}

fn start_exception(ctx: &ErrorContext, error: &ErrorReply) -> Recovery {
    if ctx.attempts <= 1 {
        // First failure of the cycle: open a retry window and restart the
        // session. For StartGame the restart is the retry itself.
        return Recovery::hold()
            .with(Effect::SetMaxAttempts(CasinoRecovery::start_exception_ceiling(
                ctx.operation,
            )))
            .with(Effect::Request(Operation::StartGame));
    }
    if ctx.can_retry() {
        return Recovery::retry().with(Effect::Surface(Notice::Retrying {
            operation: ctx.operation,
            attempt: ctx.attempts + 1,
            max_attempts: ctx.max_attempts,
        }));
    }
    if ctx.session_started {
        surface_and_abandon(ctx, error)
    } else {
        Recovery::hold().with(Effect::Surface(Notice::Fatal {
            operation: ctx.operation,
            error: error.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use croupier_request::NextState;

    use super::*;

    fn ctx(op: Operation, attempts: u32, max_attempts: u32, started: bool) -> ErrorContext {
        ErrorContext {
            operation: op,
            attempts,
            max_attempts,
            session_started: started,
        }
    }

    fn err(code: &str) -> ErrorReply {
        ErrorReply {
            code: code.into(),
            message: Some("boom".into()),
            timestamp: None,
        }
    }

    #[test]
    fn test_start_exception_first_attempt_restarts_session() {
        let r = CasinoRecovery.decide(&ctx(Operation::StartGame, 1, 1, false), &err("StartException"));
        assert_eq!(r.next, NextState::Hold);
        assert_eq!(
            r.effects,
            vec![
                Effect::SetMaxAttempts(4),
                Effect::Request(Operation::StartGame)
            ]
        );

        let r = CasinoRecovery.decide(&ctx(Operation::Bet, 1, 1, true), &err("StartException"));
        assert_eq!(r.effects[0], Effect::SetMaxAttempts(3));
    }

    #[test]
    fn test_start_exception_retries_with_notice() {
        let r = CasinoRecovery.decide(&ctx(Operation::Bet, 2, 3, true), &err("StartException"));
        assert_eq!(r.next, NextState::Retry);
        assert_eq!(
            r.effects,
            vec![Effect::Surface(Notice::Retrying {
                operation: Operation::Bet,
                attempt: 3,
                max_attempts: 3
            })]
        );
    }

    #[test]
    fn test_start_exception_exhausted_mid_session_falls_back() {
        let r = CasinoRecovery.decide(&ctx(Operation::Bet, 3, 3, true), &err("StartException"));
        assert_eq!(r.next, NextState::Abandon);
        assert!(matches!(r.effects[..], [Effect::Surface(Notice::ServerError { .. })]));
    }

    #[test]
    fn test_start_exception_exhausted_on_start_is_fatal() {
        let r = CasinoRecovery.decide(&ctx(Operation::StartGame, 4, 4, false), &err("StartException"));
        assert_eq!(r.next, NextState::Hold);
        assert!(matches!(r.effects[..], [Effect::Surface(Notice::Fatal { .. })]));
    }

    #[test]
    fn test_bet_exception_rolls_back_first() {
        let r = CasinoRecovery.decide(&ctx(Operation::Bet, 1, 1, true), &err("BetException"));
        assert_eq!(r.next, NextState::Abandon);
        assert_eq!(r.effects[0], Effect::RollBack);
        assert!(matches!(r.effects[1], Effect::Surface(Notice::ServerError { .. })));
    }

    #[test]
    fn test_round_error_restarts_session() {
        let r = CasinoRecovery.decide(&ctx(Operation::Step, 1, 1, true), &err("RoundError"));
        assert_eq!(r, Recovery::idle().with(Effect::Request(Operation::StartGame)));
    }

    #[test]
    fn test_step_and_unknown_codes_fall_back() {
        for code in ["StepException", "Whatever"] {
            let r = CasinoRecovery.decide(&ctx(Operation::Step, 1, 1, true), &err(code));
            assert_eq!(r.next, NextState::Abandon);
        }
    }

    #[test]
    fn test_closure_policy() {
        let always_retry = |_: &ErrorContext, _: &ErrorReply| Recovery::retry();
        let r = always_retry.decide(&ctx(Operation::Bet, 1, 1, true), &err("X"));
        assert_eq!(r.next, NextState::Retry);
    }
}
