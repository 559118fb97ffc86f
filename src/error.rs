// ABOUTME: Defines all error types for the gather library using thiserror.
// ABOUTME: Each concern has its own error enum, unified under GatherError.

pub use crate::payload::DecodeError;

/// Top-level error type for the gather library.
#[derive(Debug, thiserror::Error)]
pub enum GatherError {
    #[error("Operation error: {0}")]
    Operation(#[from] OperationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Anomalies raised by coordinator calls that reference operations.
///
/// These never cross the coordinator's public API; they are logged and the
/// call carries on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    #[error("operation '{0}' is not registered")]
    Unknown(String),

    #[error("operation '{0}' has already settled")]
    NotPending(String),

    #[error("no tokio runtime available to start operation '{0}'")]
    NoRuntime(String),
}

/// Errors from loading a bundle configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
