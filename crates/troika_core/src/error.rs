//! Error types for troika_core

use thiserror::Error;

use crate::descriptor::Key;
use crate::tree::FacadeId;

/// Errors raised while reconciling or mutating the facade tree
///
/// All of these are configuration errors: they are returned at the point of
/// detection and never coerced into a best guess.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FacadeError {
    /// Two sibling descriptors resolved to the same key
    #[error("duplicate key `{key}` among children of {parent:?}")]
    DuplicateKey { parent: FacadeId, key: Key },

    /// A descriptor without a facade kind
    #[error("descriptor `{key}` under {parent:?} has no facade kind")]
    MissingKind { parent: FacadeId, key: Key },

    /// The facade kind has no such property
    #[error("`{kind}` has no property `{property}`")]
    UnknownProperty { kind: &'static str, property: String },

    /// The property exists but rejected the value
    #[error("invalid value for `{kind}.{property}`: {message}")]
    InvalidProperty {
        kind: &'static str,
        property: String,
        message: String,
    },

    /// Structurally invalid descriptor
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// The facade was destroyed (or never existed in this tree)
    #[error("facade {0:?} has been destroyed")]
    Destroyed(FacadeId),

    /// A frame system failed
    #[error("system `{system}` failed: {message}")]
    System {
        system: &'static str,
        message: String,
    },
}

/// Errors loading a [`TroikaConfig`](crate::TroikaConfig)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Result type for troika_core operations
pub type Result<T> = std::result::Result<T, FacadeError>;
