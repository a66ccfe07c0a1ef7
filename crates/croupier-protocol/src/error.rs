//! Error types for the protocol layer.

/// Errors that can occur in the protocol layer.
///
/// Decode errors are runtime conditions (the server sent something that is
/// not JSON). Schema errors are programmer errors and only surface while a
/// connector is being built.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The bytes are not valid JSON, or do not fit the target type.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A JSON Schema in the catalogue could not be compiled.
    #[error("invalid schema for {operation}: {message}")]
    InvalidSchema {
        /// Which schema failed (`"Bet reply"`, `"Error"`, ...).
        operation: String,
        /// Compiler message.
        message: String,
    },

    /// An operation name outside the fixed operation set.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// The message is well-formed JSON but violates protocol rules.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
