//! Error types for troika_worker

use thiserror::Error;

/// Errors surfaced through worker thenables
///
/// Worker-side failures are flattened to strings before they cross the
/// thread boundary, so every variant is cheap to clone for fan-out to
/// multiple thenable listeners.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// A module's `init` function failed or panicked
    #[error("worker module `{module}` failed to initialize: {message}")]
    Init { module: String, message: String },

    /// A module call failed or panicked on the worker
    #[error("call to worker module `{module}` failed: {message}")]
    Call { module: String, message: String },

    /// A call or dependency referenced a module the worker never saw
    #[error("worker module `{0}` is not registered on this worker")]
    NotRegistered(String),

    /// The worker thread is gone (terminated or crashed)
    #[error("worker `{0}` is unavailable")]
    WorkerUnavailable(String),

    /// The resolver was dropped before it settled the thenable
    #[error("request was abandoned before a response arrived")]
    Abandoned,

    /// Arguments or results could not be converted to/from JSON
    #[error("failed to convert worker payload: {0}")]
    Serialization(String),

    /// Generic rejection
    #[error("{0}")]
    Rejected(String),
}

impl From<serde_json::Error> for WorkerError {
    fn from(err: serde_json::Error) -> Self {
        WorkerError::Serialization(err.to_string())
    }
}

/// Result type for troika_worker operations
pub type Result<T> = std::result::Result<T, WorkerError>;
