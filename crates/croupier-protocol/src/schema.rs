//! JSON Schemas for every request and reply.
//!
//! The envelope fields (`action`, credentials, `credits`, `code`, ...) are
//! fixed here. The `gameData` payloads differ per game, so they are
//! injected through [`GameDataSchemas`].

use serde_json::{Value, json};

use crate::Operation;

/// Schema for an object with no required fields.
fn empty_object() -> Value {
    json!({ "type": "object", "properties": {}, "required": [] })
}

/// Per-game schemas for the `gameData` members.
#[derive(Debug, Clone, PartialEq)]
pub struct GameDataSchemas {
    /// Optional `gameData` in the `StartGame` reply.
    pub start_reply: Value,
    /// `gameData` sent with `Bet`.
    pub bet_send: Value,
    /// `gameData` in the `Bet` reply.
    pub bet_reply: Value,
    /// `gameData` sent with `Step`.
    pub step_send: Value,
    /// `gameData` in the `Step` reply.
    pub step_reply: Value,
}

impl Default for GameDataSchemas {
    fn default() -> Self {
        Self {
            start_reply: empty_object(),
            bet_send: empty_object(),
            bet_reply: empty_object(),
            step_send: empty_object(),
            step_reply: empty_object(),
        }
    }
}

/// The full set of send, reply and error schemas for one game.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaCatalog {
    game_data: GameDataSchemas,
}

impl SchemaCatalog {
    /// Creates a catalogue around the game's `gameData` schemas.
    pub fn new(game_data: GameDataSchemas) -> Self {
        Self { game_data }
    }

    /// The game's `gameData` schemas.
    pub fn game_data(&self) -> &GameDataSchemas {
        &self.game_data
    }

    /// Schema of the outbound request for `op`.
    pub fn send(&self, op: Operation) -> Value {
        let g = &self.game_data;
        let action = json!({ "type": "string", "enum": [op.action()] });
        match op {
            Operation::StartGame | Operation::UpdateBalance => json!({
                "type": "object",
                "properties": {
                    "action": action,
                    "sessionId": { "type": "string" },
                    "sessionToken": { "type": "string" }
                },
                "required": ["action", "sessionId", "sessionToken"]
            }),
            Operation::Bet => json!({
                "type": "object",
                "properties": {
                    "action": action,
                    "sessionId": { "type": "string" },
                    "sessionToken": { "type": "string" },
                    "gameData": g.bet_send,
                    "bet": { "type": "number" },
                    "type": { "type": "string" }
                },
                "required": ["action", "sessionId", "sessionToken", "gameData", "bet"]
            }),
            Operation::Step => json!({
                "type": "object",
                "properties": {
                    "action": action,
                    "sessionId": { "type": "string" },
                    "sessionToken": { "type": "string" },
                    "gameData": g.step_send
                },
                "required": ["action", "sessionId", "sessionToken", "gameData"]
            }),
        }
    }

    /// Schema of a successful reply to `op`.
    pub fn reply(&self, op: Operation) -> Value {
        let g = &self.game_data;
        let ok = json!({ "type": "string", "enum": ["OK"] });
        match op {
            Operation::StartGame => json!({
                "type": "object",
                "properties": {
                    "credits": { "type": "number" },
                    "code": ok,
                    "gameData": g.start_reply,
                    "config": {
                        "type": "object",
                        "properties": { "bet": bet_config() },
                        "required": ["bet"]
                    }
                },
                "required": ["credits", "code", "config"]
            }),
            Operation::Bet => json!({
                "type": "object",
                "properties": {
                    "credits": { "type": "number" },
                    "code": ok,
                    "gameData": g.bet_reply,
                    "win": { "type": "number" },
                    "casinoMessage": {
                        "type": "object",
                        "properties": {
                            "title": { "type": "string" },
                            "body": { "type": "string" }
                        },
                        "required": ["title", "body"]
                    }
                },
                "required": ["credits", "code", "gameData", "win"]
            }),
            Operation::Step => json!({
                "type": "object",
                "properties": {
                    "credits": { "type": "number" },
                    "code": ok,
                    "gameData": g.step_reply,
                    "win": { "type": "number" }
                },
                "required": ["credits", "code", "gameData", "win"]
            }),
            Operation::UpdateBalance => json!({
                "type": "object",
                "properties": {
                    "credits": { "type": "number" },
                    "code": ok
                },
                "required": ["credits", "code"]
            }),
        }
    }

    /// Schema of an error reply; shared by all operations.
    pub fn error(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": { "type": "string" },
                "message": { "type": "string" },
                "timestamp": { "type": "string" }
            },
            "required": ["code"]
        })
    }
}

fn bet_config() -> Value {
    json!({
        "anyOf": [
            {
                "type": "object",
                "properties": {
                    "type": { "type": "string", "enum": ["list"] },
                    "list": { "type": "array", "items": { "type": "number" } },
                    "default": { "type": "number" }
                },
                "required": ["type", "list"]
            },
            {
                "type": "object",
                "properties": {
                    "type": { "type": "string", "enum": ["step"] },
                    "min": { "type": "number" },
                    "max": { "type": "number" },
                    "step": { "type": "number" },
                    "default": { "type": "number" }
                },
                "required": ["type", "min", "max", "step"]
            }
        ]
    })
}
