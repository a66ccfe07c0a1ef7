//! # Croupier
//!
//! Request/response connector for casino game clients.
//!
//! A game talks to its server through a handful of named operations
//! (`StartGame`, `Bet`, `Step`, `UpdateBalance`). Croupier keeps exactly
//! one of them in flight at a time, validates every reply against the
//! operation's JSON Schemas, and turns server errors into retries,
//! session restarts or player-facing notices.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use croupier::prelude::*;
//!
//! # async fn run() -> Result<(), CroupierError> {
//! let config = ConnectorConfig::from_launch_params(
//!     "sessionId=42&sessionToken=abc&platformUrl=Z2FtZXMuZXhhbXBsZS5jb20=&secure=true",
//! )?;
//! let connector = Connector::builder()
//!     .config(config)
//!     .spawn(WebSocketDialer)?;
//! connector.connect(Duration::from_secs(5), 3).await?;
//! connector.request(Operation::StartGame).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! - [`croupier_transport`]: dialers and links (WebSocket, in-memory)
//! - [`croupier_protocol`]: operations, wire types, schemas, verdicts
//! - [`croupier_request`]: per-operation request state machine
//! - [`croupier_timer`]: keyed timers
//! - this crate: [`ConnectorCore`], the [`Connector`] task, recovery
//!   policies and notifications

mod config;
mod connector;
mod engine;
mod error;
mod notify;
mod policy;

pub use config::ConnectorConfig;
pub use connector::{Connector, ConnectorBuilder};
pub use engine::{ConnectionState, ConnectorCore, Snapshot, TimerKey};
pub use error::CroupierError;
pub use notify::{ConnectorEvent, Notifier, NullNotifier};
pub use policy::{CasinoRecovery, RecoveryPolicy, surface_and_abandon};

pub use croupier_protocol;
pub use croupier_request;
pub use croupier_timer;
pub use croupier_transport;

/// Everything a game needs to wire up a connector.
pub mod prelude {
    pub use crate::{
        CasinoRecovery, ConnectionState, Connector, ConnectorBuilder, ConnectorConfig,
        ConnectorCore, ConnectorEvent, CroupierError, Notifier, RecoveryPolicy, Snapshot,
    };
    pub use croupier_protocol::{
        BetConfig, BetReply, ErrorReply, GameDataSchemas, Operation, SessionContext,
        StartGameReply, StepReply, UpdateBalanceReply,
    };
    pub use croupier_request::{
        Effect, ErrorContext, NextState, Notice, Recovery, RequestHandlers, RequestState,
        SendRefusal, TestMode,
    };
    pub use croupier_transport::{MemoryDialer, WebSocketDialer};
}
