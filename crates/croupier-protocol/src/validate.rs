//! Reply classification against compiled JSON Schemas.

use serde_json::Value;

use crate::{Operation, ProtocolError, SchemaCatalog};

/// Which shape a decoded reply matched.
///
/// `Invalid` is its own outcome: it drives a different recovery path than
/// a well-formed error reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Matches the operation's success schema.
    Success,
    /// Matches the shared error schema.
    Error,
    /// Matches neither.
    Invalid,
}

/// Compiled send, success and error validators for one operation.
///
/// Compilation happens once, when the connector is built. A schema that
/// does not compile is a programmer error and is reported as
/// [`ProtocolError::InvalidSchema`] at that point.
#[derive(Debug)]
pub struct SchemaValidator {
    operation: Operation,
    send: jsonschema::Validator,
    reply: jsonschema::Validator,
    error: jsonschema::Validator,
}

impl SchemaValidator {
    /// Compiles the validators for `op` from the catalogue.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidSchema`] naming the schema that
    /// failed to compile.
    pub fn for_operation(
        op: Operation,
        catalog: &SchemaCatalog,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            operation: op,
            send: compile(&catalog.send(op), format!("{op} send"))?,
            reply: compile(&catalog.reply(op), format!("{op} reply"))?,
            error: compile(&catalog.error(), "Error".to_string())?,
        })
    }

    /// The operation these validators belong to.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Reports which shape `value` matches. The success shape wins when a
    /// value happens to match both.
    pub fn classify(&self, value: &Value) -> Verdict {
        if self.reply.is_valid(value) {
            Verdict::Success
        } else if self.error.is_valid(value) {
            Verdict::Error
        } else {
            Verdict::Invalid
        }
    }

    /// Checks an outbound payload against the send schema.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] with the first violation.
    pub fn check_outbound(&self, payload: &Value) -> Result<(), ProtocolError> {
        self.send
            .validate(payload)
            .map_err(|e| ProtocolError::InvalidMessage(format!("{}: {e}", self.operation)))
    }

    /// Lists every reason `value` fails the success schema, followed by the
    /// reasons it fails the error schema. Empty when it matches either.
    pub fn explain(&self, value: &Value) -> Vec<String> {
        if self.reply.is_valid(value) || self.error.is_valid(value) {
            return Vec::new();
        }
        self.reply
            .iter_errors(value)
            .chain(self.error.iter_errors(value))
            .map(|e| e.to_string())
            .collect()
    }
}

fn compile(schema: &Value, name: String) -> Result<jsonschema::Validator, ProtocolError> {
    jsonschema::validator_for(schema).map_err(|e| ProtocolError::InvalidSchema {
        operation: name,
        message: e.to_string(),
    })
}
