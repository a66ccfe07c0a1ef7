//! Request descriptors for Croupier.
//!
//! A request descriptor is the client's record of one named operation
//! (`StartGame`, `Bet`, ...). It tracks:
//!
//! 1. **Lifecycle** — where the operation is in its send/reply cycle
//!    ([`RequestState`])
//! 2. **Attempts** — how many sends this cycle, and how many are allowed
//! 3. **Payload** — the outbound object, rebuilt at the start of each cycle
//! 4. **Callbacks** — the feature code's [`RequestHandlers`]
//!
//! # How it fits in the stack
//!
//! ```text
//! Connector (above)  ← decides WHEN a descriptor may send, routes replies
//!     ↕
//! Request layer (this crate)  ← per-operation state, counters, callbacks
//!     ↕
//! Protocol layer (below)  ← Operation, schemas, reply verdicts
//! ```
//!
//! Recovery decisions ([`Recovery`]) are plain values: the connector asks
//! a policy what to do after an error reply and applies the answer here.

mod descriptor;
mod error;
mod handlers;
mod notice;
mod recovery;
mod state;

pub use descriptor::{ArmOutcome, RequestDescriptor, RequestSnapshot, TestMode};
pub use error::SendRefusal;
pub use handlers::{NoopHandlers, RequestHandlers};
pub use notice::Notice;
pub use recovery::{Effect, ErrorContext, NextState, Recovery};
pub use state::RequestState;
