//! Error types for troika_flex

use thiserror::Error;

/// Errors raised while computing a flex layout
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlexError {
    /// A text node references a font that was never preloaded
    #[error("font `{0}` is not loaded; preload it before requesting layout")]
    FontNotLoaded(String),

    /// Font data could not be read or parsed
    #[error("font `{font}` could not be loaded: {message}")]
    InvalidFont { font: String, message: String },

    /// Two nodes of one style tree share an id
    #[error("duplicate node id `{0}` in style tree")]
    DuplicateId(String),

    /// A style property could not be converted
    #[error("invalid `{property}` on node `{id}`: {message}")]
    InvalidStyle {
        id: String,
        property: &'static str,
        message: String,
    },

    /// The layout engine rejected the tree
    #[error("layout failed: {0}")]
    Layout(String),
}

impl From<taffy::TaffyError> for FlexError {
    fn from(err: taffy::TaffyError) -> Self {
        FlexError::Layout(err.to_string())
    }
}

/// Result type for troika_flex operations
pub type Result<T> = std::result::Result<T, FlexError>;
