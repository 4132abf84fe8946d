//! App execution and resolution error types.

use thiserror::Error;

/// Errors raised by an app implementation while it runs.
#[derive(Debug, Error)]
pub enum AppError {
    /// The implementation ran and reported a failure.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// A validated argument still could not be used.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Process spawn error.
    #[error("Process error: {0}")]
    Process(String),

    /// Execution timed out.
    #[error("Execution timed out after {0} ms")]
    Timeout(u64),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Json(e.to_string())
    }
}

/// Errors raised when resolving an `(app, name)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Unknown app {0}")]
    UnknownApp(String),

    #[error("Unknown action {action} in app {app}")]
    UnknownAction { app: String, action: String },

    #[error("Unknown condition {condition} in app {app}")]
    UnknownCondition { app: String, condition: String },

    #[error("Unknown transform {transform} in app {app}")]
    UnknownTransform { app: String, transform: String },
}
