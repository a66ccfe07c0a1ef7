//! Wire protocol for Croupier.
//!
//! This crate defines what travels between the game client and the game
//! server:
//!
//! - **Types** ([`Operation`], [`SessionContext`], [`ErrorReply`], the
//!   typed reply structs) — the JSON objects on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — bytes to values and back.
//! - **Schemas** ([`SchemaCatalog`], [`GameDataSchemas`]) — the JSON Schema
//!   shape of every request and reply.
//! - **Validation** ([`SchemaValidator`], [`Verdict`]) — tells a success
//!   reply from an error reply from garbage.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (JSON value + verdict) → Request descriptor
//! ```
//!
//! Business fields inside `gameData` belong to the game; the protocol layer
//! only knows the schema they were declared with.

mod codec;
mod error;
mod schema;
mod types;
mod validate;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use schema::{GameDataSchemas, SchemaCatalog};
pub use types::{
    BetConfig, BetReply, CasinoMessage, ErrorReply, GameConfig, MAX_BET_STEPS, Operation,
    SessionContext, StartGameReply, StepReply, UpdateBalanceReply,
};
pub use validate::{SchemaValidator, Verdict};
