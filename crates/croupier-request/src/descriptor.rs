//! The per-operation request descriptor.

use std::fmt;
use std::time::Duration;

use croupier_protocol::{ErrorReply, Operation, SchemaValidator, SessionContext};
use serde_json::Value;
use tracing::{debug, trace};

use crate::{ErrorContext, NextState, RequestHandlers, RequestState, SendRefusal};

/// Offline overrides for one operation.
///
/// With a canned reply set, the connector never touches the network for
/// this operation: the reply is fed back as if the server had sent it,
/// `send_latency` after the send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestMode {
    /// Text handed to inbound handling instead of a server reply.
    pub canned_reply: Option<String>,
    /// Delay between the send and the transmit (or the canned reply).
    pub send_latency: Duration,
}

impl TestMode {
    /// A canned reply delivered immediately.
    pub fn canned(reply: impl Into<String>) -> Self {
        Self {
            canned_reply: Some(reply.into()),
            send_latency: Duration::ZERO,
        }
    }

    /// Sets the send latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.send_latency = latency;
        self
    }

    /// Whether the connector must defer the transmit through a timer.
    pub fn is_deferred(&self) -> bool {
        self.canned_reply.is_some() || !self.send_latency.is_zero()
    }
}

/// What [`RequestDescriptor::arm`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    /// Already `Pending`; nothing changed.
    AlreadyPending,
    /// Was `Idle`: payload rebuilt, now `Requested`.
    Fresh,
    /// Was `Requested`, `Success` or `Error`: now `Requested` with the
    /// previous payload and counters.
    Rearmed,
}

/// Point-in-time view of one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestSnapshot {
    pub operation: Operation,
    pub state: RequestState,
    pub attempts: u32,
    pub max_attempts: u32,
}

/// One operation's request state, counters, payload and callbacks.
///
/// The descriptor enforces its own transition rules; the connector
/// decides when each transition happens.
pub struct RequestDescriptor {
    operation: Operation,
    state: RequestState,
    attempts: u32,
    max_attempts: u32,
    payload: Option<Value>,
    overdue: bool,
    test_mode: TestMode,
    validator: SchemaValidator,
    handlers: Box<dyn RequestHandlers>,
}

impl RequestDescriptor {
    /// Creates an `Idle` descriptor for the validator's operation.
    pub fn new(validator: SchemaValidator, handlers: Box<dyn RequestHandlers>) -> Self {
        Self {
            operation: validator.operation(),
            state: RequestState::Idle,
            attempts: 0,
            max_attempts: 1,
            payload: None,
            overdue: false,
            test_mode: TestMode::default(),
            validator,
            handlers,
        }
    }

    /// Replaces the offline overrides.
    pub fn with_test_mode(mut self, test_mode: TestMode) -> Self {
        self.test_mode = test_mode;
        self
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Sends made this cycle.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Sends allowed this cycle.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The outbound object built at the start of the current cycle.
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    pub fn test_mode(&self) -> &TestMode {
        &self.test_mode
    }

    pub fn validator(&self) -> &SchemaValidator {
        &self.validator
    }

    /// Whether the current send outlived the request timeout.
    pub fn is_overdue(&self) -> bool {
        self.overdue
    }

    pub fn mark_overdue(&mut self) {
        self.overdue = true;
    }

    /// Moves to `state`, applying the counter resets that come with it.
    ///
    /// `Idle` resets both counters; `Success` resets the attempt count but
    /// keeps the ceiling.
    pub fn set_state(&mut self, state: RequestState) {
        if state != self.state {
            trace!(operation = %self.operation, from = %self.state, to = %state, "request state changed");
        }
        match state {
            RequestState::Idle => {
                self.attempts = 0;
                self.max_attempts = 1;
            }
            RequestState::Success => self.attempts = 0,
            _ => {}
        }
        if state != RequestState::Pending {
            self.overdue = false;
        }
        self.state = state;
    }

    /// Raises (or lowers) the attempt ceiling. Never below 1.
    pub fn set_max_attempts(&mut self, max_attempts: u32) {
        self.max_attempts = max_attempts.max(1);
    }

    /// Marks the operation as wanted.
    ///
    /// A `Pending` request is left alone. Leaving `Idle` rebuilds the
    /// payload from the handlers and the session credentials.
    pub fn arm(&mut self, session: &SessionContext) -> ArmOutcome {
        match self.state {
            RequestState::Pending => ArmOutcome::AlreadyPending,
            RequestState::Idle => {
                let fields = self.handlers.build_payload(self.operation);
                self.payload = Some(session.envelope(self.operation, fields));
                self.set_state(RequestState::Requested);
                ArmOutcome::Fresh
            }
            _ => {
                self.set_state(RequestState::Requested);
                ArmOutcome::Rearmed
            }
        }
    }

    /// Takes the `Requested → Pending` step and returns the attempt number.
    ///
    /// The ceiling is checked before the idle flag. A refusal leaves the
    /// descriptor in `Error` and nothing is sent.
    ///
    /// # Errors
    /// [`SendRefusal::RetryLimit`] when every attempt is used,
    /// [`SendRefusal::Idle`] when the session has gone idle.
    pub fn begin_send(&mut self, idle: bool) -> Result<u32, SendRefusal> {
        let refusal = if self.attempts >= self.max_attempts {
            Some(SendRefusal::RetryLimit {
                attempts: self.attempts,
                max_attempts: self.max_attempts,
            })
        } else if idle {
            Some(SendRefusal::Idle)
        } else {
            None
        };
        if let Some(refusal) = refusal {
            self.set_state(RequestState::Error);
            return Err(refusal);
        }

        self.attempts += 1;
        self.set_state(RequestState::Pending);
        self.handlers.on_send(self.operation, self.attempts);
        debug!(operation = %self.operation, attempt = self.attempts, max_attempts = self.max_attempts, "request sent");
        Ok(self.attempts)
    }

    /// Hands any inbound message to `on_recv_any`.
    pub fn receive(&mut self, raw: Option<&str>) {
        self.overdue = false;
        self.handlers.on_recv_any(self.operation, raw);
    }

    /// `Pending → Success` with the validated reply.
    pub fn succeed(&mut self, reply: &Value) {
        self.set_state(RequestState::Success);
        self.handlers.on_recv_success(self.operation, reply);
    }

    /// `Pending → Error` with a validated error reply.
    pub fn reject(&mut self, error: &ErrorReply) {
        self.set_state(RequestState::Error);
        self.handlers.on_recv_error(self.operation, error);
    }

    /// `Pending → Error` for a reply that matched no schema.
    pub fn reject_invalid(&mut self, raw: &str) {
        self.set_state(RequestState::Error);
        self.handlers.on_recv_invalid(self.operation, raw);
    }

    /// `→ Error` without a reply to show for it.
    pub fn fail(&mut self) {
        self.set_state(RequestState::Error);
    }

    /// Facts for the recovery policy about the current cycle.
    pub fn error_context(&self, session_started: bool) -> ErrorContext {
        ErrorContext {
            operation: self.operation,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            session_started,
        }
    }

    /// Moves to the state a recovery decision names.
    ///
    /// `Abandon` settles the cycle as `Success` without a success
    /// callback; the caller reports it through [`Self::abandoned`] once the
    /// decision's effects have run.
    pub fn recover(&mut self, next: NextState) {
        match next {
            NextState::Retry => self.set_state(RequestState::Requested),
            NextState::Hold => self.set_state(RequestState::Error),
            NextState::Idle => self.set_state(RequestState::Idle),
            NextState::Abandon => self.set_state(RequestState::Success),
        }
    }

    /// Calls the `on_abandoned` handler.
    pub fn abandoned(&mut self, error: &ErrorReply) {
        self.handlers.on_abandoned(self.operation, error);
    }

    /// Calls the `roll_back` handler.
    pub fn roll_back(&mut self) {
        self.handlers.roll_back(self.operation);
    }

    /// Demotes a finished `Success` to `Idle`. Returns `true` if it did.
    pub fn settle(&mut self) -> bool {
        if self.state == RequestState::Success {
            self.set_state(RequestState::Idle);
            true
        } else {
            false
        }
    }

    pub fn snapshot(&self) -> RequestSnapshot {
        RequestSnapshot {
            operation: self.operation,
            state: self.state,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
        }
    }
}

impl fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("operation", &self.operation)
            .field("state", &self.state)
            .field("attempts", &self.attempts)
            .field("max_attempts", &self.max_attempts)
            .field("overdue", &self.overdue)
            .field("test_mode", &self.test_mode)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use croupier_protocol::SchemaCatalog;
    use serde_json::{Map, json};

    use super::*;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl Recorder {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    impl RequestHandlers for Recorder {
        fn build_payload(&mut self, _op: Operation) -> Map<String, Value> {
            self.0.lock().unwrap().push("build".into());
            let mut m = Map::new();
            m.insert("bet".into(), json!(5));
            m.insert("action".into(), json!("hijacked"));
            m
        }
        fn on_send(&mut self, _op: Operation, attempt: u32) {
            self.0.lock().unwrap().push(format!("send {attempt}"));
        }
        fn on_recv_success(&mut self, _op: Operation, _reply: &Value) {
            self.0.lock().unwrap().push("success".into());
        }
        fn on_abandoned(&mut self, _op: Operation, error: &ErrorReply) {
            self.0.lock().unwrap().push(format!("abandoned {}", error.code));
        }
    }

    fn descriptor(op: Operation) -> (RequestDescriptor, Recorder) {
        let validator = SchemaValidator::for_operation(op, &SchemaCatalog::default()).unwrap();
        let rec = Recorder::default();
        (RequestDescriptor::new(validator, Box::new(rec.clone())), rec)
    }

    fn error(code: &str) -> ErrorReply {
        ErrorReply {
            code: code.into(),
            message: None,
            timestamp: None,
        }
    }

    #[test]
    fn test_new_descriptor_is_idle_with_one_attempt() {
        let (d, _) = descriptor(Operation::Bet);
        assert_eq!(d.state(), RequestState::Idle);
        assert_eq!((d.attempts(), d.max_attempts()), (0, 1));
        assert!(d.payload().is_none());
    }

    #[test]
    fn test_arm_from_idle_builds_envelope() {
        let (mut d, rec) = descriptor(Operation::Bet);
        let session = SessionContext {
            session_id: "s1".into(),
            session_token: "t1".into(),
        };
        assert_eq!(d.arm(&session), ArmOutcome::Fresh);
        assert_eq!(d.state(), RequestState::Requested);
        let payload = d.payload().unwrap();
        assert_eq!(payload["action"], "bet");
        assert_eq!(payload["sessionId"], "s1");
        assert_eq!(payload["bet"], 5);
        assert_eq!(rec.take(), vec!["build"]);

        // A second request keeps the payload.
        assert_eq!(d.arm(&session), ArmOutcome::Rearmed);
        assert!(rec.take().is_empty());
    }

    #[test]
    fn test_arm_leaves_pending_alone() {
        let (mut d, _) = descriptor(Operation::Step);
        d.arm(&SessionContext::default());
        d.begin_send(false).unwrap();
        assert_eq!(d.arm(&SessionContext::default()), ArmOutcome::AlreadyPending);
        assert_eq!(d.state(), RequestState::Pending);
    }

    #[test]
    fn test_begin_send_counts_attempts() {
        let (mut d, rec) = descriptor(Operation::Bet);
        d.arm(&SessionContext::default());
        assert_eq!(d.begin_send(false), Ok(1));
        assert_eq!(d.state(), RequestState::Pending);
        assert_eq!(rec.take(), vec!["build", "send 1"]);
    }

    #[test]
    fn test_retry_limit_checked_before_idle() {
        let (mut d, _) = descriptor(Operation::Bet);
        d.arm(&SessionContext::default());
        d.begin_send(false).unwrap();
        d.fail();
        d.arm(&SessionContext::default());

        let refusal = d.begin_send(true).unwrap_err();
        assert_eq!(
            refusal,
            SendRefusal::RetryLimit {
                attempts: 1,
                max_attempts: 1
            }
        );
        assert_eq!(refusal.reason(), "retry-limit");
        assert_eq!(d.state(), RequestState::Error);
    }

    #[test]
    fn test_idle_refusal() {
        let (mut d, rec) = descriptor(Operation::UpdateBalance);
        d.arm(&SessionContext::default());
        assert_eq!(d.begin_send(true), Err(SendRefusal::Idle));
        assert_eq!(d.state(), RequestState::Error);
        assert_eq!(d.attempts(), 0);
        // No on_send for a refused send.
        assert_eq!(rec.take(), vec!["build"]);
    }

    #[test]
    fn test_success_resets_attempts_then_settles_idle() {
        let (mut d, rec) = descriptor(Operation::StartGame);
        d.arm(&SessionContext::default());
        d.set_max_attempts(4);
        d.begin_send(false).unwrap();
        d.succeed(&json!({}));
        assert_eq!(d.state(), RequestState::Success);
        assert_eq!((d.attempts(), d.max_attempts()), (0, 4));

        assert!(d.settle());
        assert_eq!(d.state(), RequestState::Idle);
        assert_eq!((d.attempts(), d.max_attempts()), (0, 1));
        assert!(!d.settle());
        assert_eq!(rec.take(), vec!["build", "send 1", "success"]);
    }

    #[test]
    fn test_abandon_skips_success_callback() {
        let (mut d, rec) = descriptor(Operation::Bet);
        d.arm(&SessionContext::default());
        d.begin_send(false).unwrap();
        let err = error("BetException");
        d.reject(&err);
        d.recover(NextState::Abandon);
        d.abandoned(&err);
        assert_eq!(d.state(), RequestState::Success);
        assert!(d.settle());
        assert_eq!(
            rec.take(),
            vec!["build", "send 1", "abandoned BetException"]
        );
    }

    #[test]
    fn test_recover_retry_requeues_with_same_payload() {
        let (mut d, _) = descriptor(Operation::Bet);
        d.arm(&SessionContext::default());
        d.set_max_attempts(3);
        d.begin_send(false).unwrap();
        let before = d.payload().cloned();
        d.reject(&error("StartException"));
        d.recover(NextState::Retry);
        assert_eq!(d.state(), RequestState::Requested);
        assert_eq!(d.begin_send(false), Ok(2));
        assert_eq!(d.payload().cloned(), before);
    }

    #[test]
    fn test_overdue_cleared_on_reply() {
        let (mut d, _) = descriptor(Operation::Bet);
        d.arm(&SessionContext::default());
        d.begin_send(false).unwrap();
        d.mark_overdue();
        assert!(d.is_overdue());
        d.receive(Some("{}"));
        assert!(!d.is_overdue());
    }

    #[test]
    fn test_set_max_attempts_floor() {
        let (mut d, _) = descriptor(Operation::Bet);
        d.set_max_attempts(0);
        assert_eq!(d.max_attempts(), 1);
    }

    #[test]
    fn test_error_context_reflects_counters() {
        let (mut d, _) = descriptor(Operation::Step);
        d.arm(&SessionContext::default());
        d.begin_send(false).unwrap();
        let ctx = d.error_context(true);
        assert_eq!(ctx.operation, Operation::Step);
        assert_eq!((ctx.attempts, ctx.max_attempts), (1, 1));
        assert!(ctx.session_started);
    }

    #[test]
    fn test_test_mode_deferral() {
        assert!(!TestMode::default().is_deferred());
        assert!(TestMode::canned("{}").is_deferred());
        assert!(
            TestMode::default()
                .with_latency(Duration::from_millis(50))
                .is_deferred()
        );
    }
}
