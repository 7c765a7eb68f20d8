//! Error types for troika_physics

use thiserror::Error;

/// Errors raised by the physics world
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    /// A request other than `init` reached a world that was never initialized
    #[error("physics world is not initialized")]
    NotInitialized,

    /// The simulation settings cannot be used
    #[error("invalid physics config: {0}")]
    InvalidConfig(String),

    /// A body with this id is already simulated
    #[error("rigid body {0} already exists")]
    DuplicateBody(u64),

    /// No body with this id is simulated
    #[error("rigid body {0} does not exist")]
    UnknownBody(u64),

    /// The body description cannot be simulated
    #[error("invalid rigid body {id}: {message}")]
    InvalidBody { id: u64, message: String },
}

/// Result type for troika_physics operations
pub type Result<T> = std::result::Result<T, PhysicsError>;
