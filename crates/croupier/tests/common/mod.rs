//! Shared fixtures for the connector tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use croupier::prelude::*;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;

pub const START_OK: &str =
    r#"{"credits":1000,"code":"OK","config":{"bet":{"type":"list","list":[1,2,5],"default":1}}}"#;
pub const BET_OK: &str = r#"{"credits":995,"code":"OK","win":0,"gameData":{"dice":[3,4]}}"#;
pub const STEP_OK: &str = r#"{"credits":995,"code":"OK","win":10,"gameData":{}}"#;

pub fn error_reply(code: &str) -> String {
    json!({ "code": code, "message": "server says no" }).to_string()
}

/// Handler calls across every operation, in order.
#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.lock().unwrap().iter().any(|e| e == entry)
    }
}

/// Records every callback into a [`Log`] and optionally forwards
/// success replies to a channel.
pub struct Recorder {
    log: Log,
    fields: Map<String, Value>,
    replies: Option<mpsc::UnboundedSender<(Operation, Value)>>,
}

impl Recorder {
    pub fn new(log: &Log) -> Self {
        Self {
            log: log.clone(),
            fields: Map::new(),
            replies: None,
        }
    }

    pub fn with_fields(mut self, fields: Value) -> Self {
        if let Value::Object(map) = fields {
            self.fields = map;
        }
        self
    }

    pub fn forward_replies(mut self, tx: mpsc::UnboundedSender<(Operation, Value)>) -> Self {
        self.replies = Some(tx);
        self
    }
}

impl RequestHandlers for Recorder {
    fn build_payload(&mut self, op: Operation) -> Map<String, Value> {
        self.log.push(format!("{op} build"));
        self.fields.clone()
    }

    fn on_send(&mut self, op: Operation, attempt: u32) {
        self.log.push(format!("{op} send {attempt}"));
    }

    fn on_recv_success(&mut self, op: Operation, reply: &Value) {
        self.log.push(format!("{op} success"));
        if let Some(tx) = &self.replies {
            let _ = tx.send((op, reply.clone()));
        }
    }

    fn on_recv_error(&mut self, op: Operation, error: &ErrorReply) {
        self.log.push(format!("{op} error {}", error.code));
    }

    fn on_recv_invalid(&mut self, op: Operation, _raw: &str) {
        self.log.push(format!("{op} invalid"));
    }

    fn roll_back(&mut self, op: Operation) {
        self.log.push(format!("{op} rollback"));
    }

    fn on_abandoned(&mut self, op: Operation, error: &ErrorReply) {
        self.log.push(format!("{op} abandoned {}", error.code));
    }
}

/// A builder with a recorder on every operation and a channel notifier.
pub fn recorded_builder(
    config: ConnectorConfig,
) -> (ConnectorBuilder, Log, mpsc::UnboundedReceiver<ConnectorEvent>) {
    let log = Log::default();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let builder = Connector::builder()
        .config(config)
        .notifier(events_tx)
        .handlers(Operation::StartGame, Recorder::new(&log))
        .handlers(
            Operation::Bet,
            Recorder::new(&log).with_fields(json!({ "bet": 5, "gameData": { "pick": "red" } })),
        )
        .handlers(
            Operation::Step,
            Recorder::new(&log).with_fields(json!({ "gameData": {} })),
        )
        .handlers(Operation::UpdateBalance, Recorder::new(&log));
    (builder, log, events_rx)
}

/// Drains every event currently queued.
pub fn drain_events(rx: &mut mpsc::UnboundedReceiver<ConnectorEvent>) -> Vec<ConnectorEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

/// Decodes every message the core queued for the link.
pub fn sent(core: &mut ConnectorCore) -> Vec<Value> {
    let mut out = Vec::new();
    while let Some(bytes) = core.take_outbound() {
        out.push(serde_json::from_slice(&bytes).unwrap());
    }
    out
}

pub fn state_of(core: &ConnectorCore, op: Operation) -> RequestState {
    core.descriptor(op).state()
}
