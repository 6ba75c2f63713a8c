//! Error types for the engine kernel.
//!
//! Each kernel component gets its own error enum so call sites can match on
//! exactly the failures they can see. The taxonomy follows the kernel's
//! propagation policy: handler, middleware, and scheduled-callback failures
//! are caught and recorded rather than propagated; migration failures are
//! fatal to the call that triggered them.

/// Errors raised by the event bus.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// Event names must be non-empty strings.
    #[error("Event name must not be empty")]
    EmptyName,

    /// Payload serialization failed
    #[error("Event payload serialization failed: {0}")]
    SerializationFailed(String),

    /// Payload deserialization failed
    #[error("Event payload deserialization failed: {0}")]
    DeserializationFailed(String),

    /// A handler reported a failure
    #[error("Handler execution failed: {0}")]
    HandlerFailed(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::SerializationFailed(err.to_string())
    }
}

/// Errors raised by command middleware.
///
/// A middleware returning an error does not stop the chain; the error is
/// recorded and the next middleware runs. The variants exist so diagnostics
/// can distinguish a deliberate denial from a malfunction.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The middleware rejected the command on validation grounds
    #[error("Command rejected: {0}")]
    Rejected(String),

    /// The middleware failed while processing the command
    #[error("Middleware execution failed: {0}")]
    ExecutionFailed(String),

    /// Command payload could not be deserialized to the expected shape
    #[error("Command payload deserialization failed: {0}")]
    DeserializationFailed(String),
}

impl From<serde_json::Error> for CommandError {
    fn from(err: serde_json::Error) -> Self {
        CommandError::DeserializationFailed(err.to_string())
    }
}

/// Errors raised by scheduled task callbacks.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The callback reported a failure; the task itself stays scheduled
    #[error("Scheduled callback failed: {0}")]
    CallbackFailed(String),
}

/// Errors raised by the migration registry.
///
/// Every variant identifies the exact point of failure so a caller can treat
/// the error as "do not load this state" with enough context to debug it.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// No edge sequence connects the two version labels
    #[error("No migration path from version `{from}` to version `{to}`")]
    NoPath { from: String, to: String },

    /// A specific edge's transform failed
    #[error("Migration edge `{from}` -> `{to}` failed: {message}")]
    EdgeFailed {
        from: String,
        to: String,
        message: String,
    },

    /// A transform returned a structurally invalid snapshot
    #[error("Migration edge `{from}` -> `{to}` produced an invalid snapshot")]
    InvalidResult { from: String, to: String },

    /// Path search visited more nodes than the configured ceiling
    #[error("Migration path search exceeded the visited-node ceiling of {limit}")]
    TraversalCeiling { limit: usize },

    /// Raised by transform functions themselves
    #[error("Transform failed: {0}")]
    TransformFailed(String),
}

impl From<serde_json::Error> for MigrationError {
    fn from(err: serde_json::Error) -> Self {
        MigrationError::TransformFailed(err.to_string())
    }
}
