//! The connector's state machine, free of I/O.
//!
//! [`ConnectorCore`] owns the request registry, the timers and the
//! outbound queue. It never touches a socket: callers feed it inbound
//! messages, timer expiries and connection events, then ship whatever it
//! queued with [`take_outbound`](ConnectorCore::take_outbound). The
//! [`Connector`](crate::Connector) task is one such caller; tests are
//! another.
//!
//! ```text
//! request(op) ──→ Requested ──drain──→ Pending ──→ outbox ──→ link
//!                                        ↑
//! link ──→ handle_inbound ──→ classify ──┴─→ Success / Error → recovery
//! ```

use std::collections::VecDeque;
use std::fmt;

use croupier_protocol::{Codec, ErrorReply, JsonCodec, Operation, ProtocolError, Verdict};
use croupier_request::{
    ArmOutcome, Effect, NextState, Notice, RequestDescriptor, RequestSnapshot, RequestState,
};
use croupier_timer::TimerQueue;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{ConnectorConfig, Notifier, RecoveryPolicy};

/// Link state as the connector sees it.
///
/// ```text
/// NotConnected → Connecting → Normal → Closed
///                     └────────────────↗ (every attempt failed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    NotConnected,
    Connecting,
    Normal,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "NotConnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Normal => write!(f, "Normal"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// What a timer is for. Arming a key replaces its previous timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimerKey {
    /// Request timeout for the pending request.
    Waiting(Operation),
    /// Repeating "still waiting" notice.
    Nag(Operation),
    /// Deferred transmit or canned reply.
    Dispatch(Operation),
    /// Idle watchdog.
    Idle,
}

/// Point-in-time view of the whole connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub connection: ConnectionState,
    pub idle: bool,
    pub session_started: bool,
    /// One entry per operation, in send-priority order.
    pub requests: Vec<RequestSnapshot>,
}

impl Snapshot {
    pub fn request(&self, op: Operation) -> Option<&RequestSnapshot> {
        self.requests.iter().find(|r| r.operation == op)
    }
}

/// The request/response state machine behind a connector.
///
/// At most one request is `Pending` at any time; everything else waits in
/// `Requested` and goes out in [`Operation::ALL`] order.
pub struct ConnectorCore {
    config: ConnectorConfig,
    connection: ConnectionState,
    /// Indexed by [`Operation::index`].
    descriptors: Vec<RequestDescriptor>,
    /// Indexed by [`Operation::index`].
    policies: Vec<Box<dyn RecoveryPolicy>>,
    notifier: Box<dyn Notifier>,
    timers: TimerQueue<TimerKey>,
    outbox: VecDeque<Vec<u8>>,
    codec: JsonCodec,
    idle: bool,
    session_started: bool,
}

impl ConnectorCore {
    /// Assembles a core from one descriptor and one policy per operation,
    /// both in [`Operation::ALL`] order. The builder is the usual way in.
    pub(crate) fn new(
        config: ConnectorConfig,
        descriptors: Vec<RequestDescriptor>,
        policies: Vec<Box<dyn RecoveryPolicy>>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        debug_assert!(
            descriptors
                .iter()
                .map(RequestDescriptor::operation)
                .eq(Operation::ALL),
            "descriptors must follow Operation::ALL"
        );
        debug_assert_eq!(policies.len(), Operation::ALL.len());
        Self {
            config,
            connection: ConnectionState::NotConnected,
            descriptors,
            policies,
            notifier,
            timers: TimerQueue::new(),
            outbox: VecDeque::new(),
            codec: JsonCodec,
            idle: false,
            session_started: false,
        }
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Whether the idle watchdog has fired.
    pub fn is_idle(&self) -> bool {
        self.idle
    }

    /// Whether a `StartGame` has ever succeeded.
    pub fn session_started(&self) -> bool {
        self.session_started
    }

    pub fn descriptor(&self, op: Operation) -> &RequestDescriptor {
        &self.descriptors[op.index()]
    }

    /// The operation currently waiting for its reply.
    pub fn pending(&self) -> Option<Operation> {
        self.descriptors
            .iter()
            .find(|d| d.state() == RequestState::Pending)
            .map(RequestDescriptor::operation)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            connection: self.connection,
            idle: self.idle,
            session_started: self.session_started,
            requests: self.descriptors.iter().map(RequestDescriptor::snapshot).collect(),
        }
    }

    // -----------------------------------------------------------------------
    // Connection events
    // -----------------------------------------------------------------------

    pub fn on_connecting(&mut self) {
        self.connection = ConnectionState::Connecting;
        debug!(url = %self.config.url, "connecting");
    }

    /// The link is up. Sends anything requested while it was down.
    pub fn on_open(&mut self) {
        self.connection = ConnectionState::Normal;
        info!(url = %self.config.url, standalone = self.config.standalone, "connector open");
        self.notifier.on_open();
        self.drain();
    }

    pub fn on_retry(&mut self, remaining: u32) {
        info!(remaining, "retrying connection");
        self.notifier.on_retry(remaining);
    }

    /// Every connect attempt failed.
    pub fn on_failed(&mut self) {
        self.connection = ConnectionState::Closed;
        warn!(url = %self.config.url, "connection failed");
        self.notifier.on_failed();
    }

    /// The open link went away. There is no reconnect; a pending request
    /// keeps nagging until the player reloads.
    pub fn on_closed(&mut self) {
        if self.connection == ConnectionState::Closed {
            return;
        }
        self.connection = ConnectionState::Closed;
        warn!(url = %self.config.url, "connection closed");
        self.notifier.on_closed();
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Asks for `op` to be sent.
    ///
    /// A pending request is left alone. A request leaving `Idle` gets a
    /// fresh payload; any other state keeps the payload and counters of
    /// the current cycle. The queue is drained right away.
    pub fn request(&mut self, op: Operation) {
        if self.arm(op) != ArmOutcome::AlreadyPending {
            self.drain();
        }
    }

    fn arm(&mut self, op: Operation) -> ArmOutcome {
        let outcome = self.descriptors[op.index()].arm(&self.config.session);
        match outcome {
            ArmOutcome::AlreadyPending => debug!(operation = %op, "request already pending"),
            ArmOutcome::Fresh => info!(operation = %op, "request queued"),
            ArmOutcome::Rearmed => debug!(operation = %op, "request re-armed"),
        }
        outcome
    }

    /// Sends queued requests until one is in flight or none is left.
    fn drain(&mut self) {
        loop {
            if let Some(op) = self.pending() {
                debug!(operation = %op, "drain waits for pending request");
                return;
            }
            if self.connection != ConnectionState::Normal && !self.config.standalone {
                return;
            }
            let Some(op) = Operation::ALL
                .into_iter()
                .find(|op| self.descriptors[op.index()].state() == RequestState::Requested)
            else {
                return;
            };
            self.send(op);
        }
    }

    fn send(&mut self, op: Operation) {
        debug_assert!(self.pending().is_none(), "two requests in flight");

        let desc = &mut self.descriptors[op.index()];
        let attempt = match desc.begin_send(self.idle) {
            Ok(attempt) => attempt,
            Err(refusal) => {
                warn!(operation = %op, reason = refusal.reason(), %refusal, "send refused");
                self.notifier.on_send_failed(op, refusal);
                return;
            }
        };

        self.timers.cancel(TimerKey::Idle);
        self.timers.arm_once(TimerKey::Waiting(op), self.config.request_timeout);
        self.timers.arm_every(TimerKey::Nag(op), self.config.nag_interval);

        let test_mode = desc.test_mode();
        if self.config.standalone || test_mode.is_deferred() {
            debug!(
                operation = %op,
                attempt,
                latency_ms = test_mode.send_latency.as_millis() as u64,
                "dispatch deferred"
            );
            self.timers.arm_once(TimerKey::Dispatch(op), test_mode.send_latency);
        } else {
            self.transmit(op);
        }
    }

    /// Encodes the pending payload into the outbox.
    fn transmit(&mut self, op: Operation) {
        let desc = &mut self.descriptors[op.index()];
        let Some(payload) = desc.payload() else {
            warn!(operation = %op, "no payload to transmit");
            desc.fail();
            return;
        };
        if let Err(e) = desc.validator().check_outbound(payload) {
            warn!(operation = %op, error = %e, "outbound payload does not match its schema");
        }
        match self.codec.encode(payload) {
            Ok(bytes) => {
                debug!(operation = %op, bytes = bytes.len(), "payload queued");
                self.outbox.push_back(bytes);
            }
            Err(e) => {
                warn!(operation = %op, error = %e, "failed to encode payload");
                desc.fail();
            }
        }
    }

    /// Next encoded message for the link, oldest first.
    pub fn take_outbound(&mut self) -> Option<Vec<u8>> {
        self.outbox.pop_front()
    }

    // -----------------------------------------------------------------------
    // Replies
    // -----------------------------------------------------------------------

    /// Routes one inbound frame to the pending request.
    ///
    /// Bytes that are not UTF-8 cannot be JSON and count as a receive
    /// exception, like any other undecodable reply.
    pub fn handle_inbound_bytes(&mut self, data: &[u8]) {
        match std::str::from_utf8(data) {
            Ok(text) => self.handle_inbound(Some(text)),
            Err(e) => {
                let Some(op) = self.begin_inbound(data.len()) else {
                    return;
                };
                let text = String::from_utf8_lossy(data);
                self.descriptors[op.index()].receive(Some(text.as_ref()));
                self.receive_exception(
                    op,
                    ProtocolError::InvalidMessage(format!("reply is not UTF-8: {e}")),
                );
                self.finish_inbound(op);
            }
        }
    }

    /// Routes one inbound message to the pending request.
    ///
    /// `None` stands for "no message" (offline mode) and is treated as a
    /// successful, empty reply.
    pub fn handle_inbound(&mut self, raw: Option<&str>) {
        let Some(op) = self.begin_inbound(raw.map_or(0, str::len)) else {
            return;
        };
        self.descriptors[op.index()].receive(raw);

        match raw {
            None => self.succeed(op, &Value::Object(Map::new())),
            Some(text) => match self.codec.decode::<Value>(text.as_bytes()) {
                Ok(value) => self.route(op, text, value),
                Err(e) => self.receive_exception(op, e),
            },
        }

        self.finish_inbound(op);
    }

    /// Common prologue of every inbound frame: keeps the session alive and
    /// finds the request the frame answers.
    fn begin_inbound(&mut self, bytes: usize) -> Option<Operation> {
        self.timers.arm_once(TimerKey::Idle, self.config.idle_timeout);

        let Some(op) = self.pending() else {
            debug!(bytes, "inbound message with no pending request, dropped");
            return None;
        };
        if self.connection != ConnectionState::Closed {
            self.connection = ConnectionState::Normal;
        }
        self.cancel_request_timers(op);
        Some(op)
    }

    fn finish_inbound(&mut self, op: Operation) {
        if self.descriptors[op.index()].settle() {
            debug!(operation = %op, "request settled");
        }
        self.drain();
    }

    fn receive_exception(&mut self, op: Operation, error: ProtocolError) {
        warn!(operation = %op, error = %error, "reply is not JSON");
        self.descriptors[op.index()].fail();
        self.notifier.on_receive_exception(op, &error);
    }

    fn route(&mut self, op: Operation, text: &str, value: Value) {
        let verdict = self.descriptors[op.index()].validator().classify(&value);
        match verdict {
            Verdict::Success => self.succeed(op, &value),
            Verdict::Error => match serde_json::from_value::<ErrorReply>(value) {
                Ok(error) => {
                    info!(operation = %op, code = %error.code, "error reply");
                    self.descriptors[op.index()].reject(&error);
                    self.recover(op, &error);
                }
                Err(e) => {
                    warn!(operation = %op, error = %e, "error reply did not deserialize");
                    self.invalid(op, text, vec![e.to_string()]);
                }
            },
            Verdict::Invalid => {
                let reasons = self.descriptors[op.index()].validator().explain(&value);
                self.invalid(op, text, reasons);
            }
        }
    }

    fn succeed(&mut self, op: Operation, reply: &Value) {
        if op == Operation::StartGame && !self.session_started {
            info!("session started");
            self.session_started = true;
        }
        debug!(operation = %op, "success reply");
        self.descriptors[op.index()].succeed(reply);
    }

    fn invalid(&mut self, op: Operation, text: &str, reasons: Vec<String>) {
        warn!(operation = %op, reasons = ?reasons, "reply matches no schema");
        self.descriptors[op.index()].reject_invalid(text);
        self.notifier.on_invalid_payload(op, &reasons);
    }

    /// Asks the operation's policy what to do and applies the answer: the
    /// next state first, then the effects in order.
    fn recover(&mut self, op: Operation, error: &ErrorReply) {
        let ctx = self.descriptors[op.index()].error_context(self.session_started);
        let recovery = self.policies[op.index()].decide(&ctx, error);
        debug!(
            operation = %op,
            code = %error.code,
            attempts = ctx.attempts,
            max_attempts = ctx.max_attempts,
            next = ?recovery.next,
            "recovery decided"
        );

        self.descriptors[op.index()].recover(recovery.next);
        for effect in recovery.effects {
            match effect {
                Effect::SetMaxAttempts(n) => self.descriptors[op.index()].set_max_attempts(n),
                Effect::Request(other) => {
                    self.arm(other);
                }
                Effect::RollBack => self.descriptors[op.index()].roll_back(),
                Effect::Surface(notice) => {
                    info!(operation = %op, %notice, "notice");
                    self.notifier.on_notice(&notice);
                }
            }
        }
        if recovery.next == NextState::Abandon {
            self.descriptors[op.index()].abandoned(error);
        }
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    fn cancel_request_timers(&mut self, op: Operation) {
        self.timers.cancel_where(|key| match key {
            TimerKey::Waiting(o) | TimerKey::Nag(o) | TimerKey::Dispatch(o) => *o == op,
            TimerKey::Idle => false,
        });
    }

    /// Waits for the next timer. Pends forever while none is armed, and
    /// is cancel safe.
    pub async fn next_timer(&mut self) -> TimerKey {
        self.timers.expired().await
    }

    /// Fires every timer due at `now`, in deadline order.
    pub fn fire_due(&mut self, now: Instant) {
        while let Some(key) = self.timers.pop_expired(now) {
            self.on_timer(key);
        }
    }

    /// Whether a timer of that kind is armed.
    pub fn is_timer_armed(&self, key: TimerKey) -> bool {
        self.timers.is_armed(key)
    }

    /// Reacts to an expired timer.
    pub fn on_timer(&mut self, key: TimerKey) {
        match key {
            TimerKey::Idle => {
                if !self.idle {
                    warn!(
                        idle_ms = self.config.idle_timeout.as_millis() as u64,
                        "session went idle"
                    );
                }
                self.idle = true;
            }
            TimerKey::Waiting(op) => {
                if self.still_pending(op, key) {
                    warn!(operation = %op, "request timed out");
                    self.descriptors[op.index()].mark_overdue();
                    // Restart the nag cadence with the timed-out notice.
                    self.timers.arm_every(TimerKey::Nag(op), self.config.nag_interval);
                }
            }
            TimerKey::Nag(op) => {
                if self.still_pending(op, key) {
                    let notice = if self.descriptors[op.index()].is_overdue() {
                        Notice::RequestTimedOut { operation: op }
                    } else {
                        Notice::WaitingForResponse { operation: op }
                    };
                    debug!(operation = %op, %notice, "nag");
                    self.notifier.on_notice(&notice);
                }
            }
            TimerKey::Dispatch(op) => {
                if !self.still_pending(op, key) {
                    return;
                }
                let desc = &self.descriptors[op.index()];
                if self.config.standalone || desc.test_mode().canned_reply.is_some() {
                    let canned = desc.test_mode().canned_reply.clone();
                    debug!(operation = %op, canned = canned.is_some(), "offline reply");
                    self.handle_inbound(canned.as_deref());
                } else {
                    self.transmit(op);
                }
            }
        }
    }

    /// `false` (and the timer disarmed) when `op` is no longer in flight.
    fn still_pending(&mut self, op: Operation, key: TimerKey) -> bool {
        if self.descriptors[op.index()].state() == RequestState::Pending {
            true
        } else {
            debug!(operation = %op, ?key, "stale request timer");
            self.cancel_request_timers(op);
            false
        }
    }
}

impl fmt::Debug for ConnectorCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorCore")
            .field("connection", &self.connection)
            .field("idle", &self.idle)
            .field("session_started", &self.session_started)
            .field("descriptors", &self.descriptors)
            .field("timers", &self.timers.len())
            .field("outbox", &self.outbox.len())
            .finish_non_exhaustive()
    }
}
