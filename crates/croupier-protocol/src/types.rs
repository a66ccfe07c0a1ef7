//! Core protocol types: the operation set and the JSON shapes on the wire.
//!
//! Replies are validated against JSON Schemas before anything reads them,
//! so the typed structs here are a convenience for result consumers. The
//! connector itself hands replies around as `serde_json::Value`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// One named request the client can make.
///
/// The set is fixed. Declaration order is the send priority: when several
/// operations wait at once, the earliest variant goes out first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Operation {
    /// Opens (or re-opens) the game session; returns credits and bet config.
    StartGame,
    /// Places a bet and plays a round.
    Bet,
    /// Advances a multi-step round.
    Step,
    /// Refreshes the credit balance.
    UpdateBalance,
}

impl Operation {
    /// Every operation, highest send priority first.
    pub const ALL: [Operation; 4] = [
        Operation::StartGame,
        Operation::Bet,
        Operation::Step,
        Operation::UpdateBalance,
    ];

    /// The `action` field sent to the server.
    pub fn action(self) -> &'static str {
        match self {
            Self::StartGame => "start",
            Self::Bet => "bet",
            Self::Step => "step",
            Self::UpdateBalance => "update",
        }
    }

    /// Position in [`Operation::ALL`]; also the send priority (0 is first).
    pub fn index(self) -> usize {
        self as usize
    }

    /// The operation's name as it appears in logs and notices.
    pub fn name(self) -> &'static str {
        match self {
            Self::StartGame => "StartGame",
            Self::Bet => "Bet",
            Self::Step => "Step",
            Self::UpdateBalance => "UpdateBalance",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = ProtocolError;

    /// Accepts the operation name in either `StartGame` or `startGame`
    /// spelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProtocolError::UnknownOperation(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// SessionContext
// ---------------------------------------------------------------------------

/// Credentials the platform hands the client at launch.
///
/// Every outbound request carries them next to its `action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub session_id: String,
    pub session_token: String,
}

impl Default for SessionContext {
    /// The platform's placeholder when no credentials were given.
    fn default() -> Self {
        Self {
            session_id: "0".to_string(),
            session_token: "0".to_string(),
        }
    }
}

impl SessionContext {
    /// Builds the outbound object for `op`: `action`, `sessionId`,
    /// `sessionToken`, then the operation's own fields.
    ///
    /// Operation fields never override the envelope keys.
    pub fn envelope(&self, op: Operation, fields: Map<String, Value>) -> Value {
        let mut out = fields;
        out.insert("action".into(), Value::from(op.action()));
        out.insert("sessionId".into(), Value::from(self.session_id.clone()));
        out.insert(
            "sessionToken".into(),
            Value::from(self.session_token.clone()),
        );
        Value::Object(out)
    }
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// Error reply, shared by every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    /// Server error code, e.g. `"BetException"`.
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl fmt::Display for ErrorReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.code, message),
            None => f.write_str(&self.code),
        }
    }
}

/// Upper bound on the amounts a `step` bet configuration expands to.
pub const MAX_BET_STEPS: usize = 1000;

/// Allowed bet amounts, sent with the `StartGame` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BetConfig {
    /// A fixed list of amounts.
    List {
        list: Vec<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<f64>,
    },
    /// `min..=max` in increments of `step`.
    Step {
        min: f64,
        max: f64,
        step: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<f64>,
    },
}

impl BetConfig {
    /// The server's suggested starting bet, if any.
    pub fn default_bet(&self) -> Option<f64> {
        match self {
            Self::List { default, .. } | Self::Step { default, .. } => *default,
        }
    }

    /// Expands the configuration into the concrete list of amounts.
    ///
    /// A `step` range yields at most [`MAX_BET_STEPS`] amounts, starting
    /// at `min`. Non-finite bounds collapse to `min` alone.
    pub fn amounts(&self) -> Vec<f64> {
        match self {
            Self::List { list, .. } => list.clone(),
            Self::Step { min, max, step, .. } => {
                if !min.is_finite() {
                    return Vec::new();
                }
                if !max.is_finite() || !step.is_finite() || *step <= 0.0 || max < min {
                    return vec![*min];
                }
                let steps = ((max - min) / step).floor().min((MAX_BET_STEPS - 1) as f64);
                (0..=steps as usize).map(|i| min + step * i as f64).collect()
            }
        }
    }
}

/// Game configuration carried by the `StartGame` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    pub bet: BetConfig,
}

/// `StartGame` success reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGameReply {
    pub credits: f64,
    pub code: String,
    pub config: GameConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_data: Option<Value>,
}

/// A message the casino wants shown to the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CasinoMessage {
    pub title: String,
    pub body: String,
}

/// `Bet` success reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetReply {
    pub credits: f64,
    pub code: String,
    pub win: f64,
    pub game_data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub casino_message: Option<CasinoMessage>,
}

/// `Step` success reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReply {
    pub credits: f64,
    pub code: String,
    pub win: f64,
    pub game_data: Value,
}

/// `UpdateBalance` success reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateBalanceReply {
    pub credits: f64,
    pub code: String,
}
