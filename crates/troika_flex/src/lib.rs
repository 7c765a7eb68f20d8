//! Troika Flex
//!
//! Flexbox layout for 3D user interfaces, computed off the main thread:
//!
//! - **Style trees**: serializable [`StyleNode`] trees with camelCase flexbox
//!   properties and optional text
//! - **Layout**: [`process_flex_layout`], a pure function from a style tree
//!   to computed boxes keyed by node id
//! - **Text**: synchronous measurement of shaped glyph advances against
//!   preloaded fonts
//! - **Worker modules**: `text_metrics` and `flex_layout` on the flex worker
//! - **Facades**: [`FlexNodeFacade`] and the [`FlexLayoutSystem`] that feeds
//!   computed boxes back into the scene
//!
//! # Example
//!
//! ```rust
//! use troika_flex::{process_flex_layout, EstimatedTextMeasurer, FontRegistry, StyleNode};
//!
//! let mut root = StyleNode::new("root");
//! root.width = Some(100.0.into());
//! root.height = Some(40.0.into());
//! root.children.push(StyleNode::new("child"));
//!
//! let fonts = FontRegistry::new();
//! let layout = process_flex_layout(&root, &EstimatedTextMeasurer::new(&fonts)).unwrap();
//! assert_eq!(layout.get("root").unwrap().width, 100.0);
//! ```

pub mod error;
pub mod facade;
pub mod layout;
pub mod measure;
pub mod module;
pub mod style;
pub mod system;

pub use error::{FlexError, Result};
pub use facade::{FlexNodeFacade, COMPUTED_PROPERTIES, FLEX_BOX, FLEX_NODE};
pub use layout::{process_flex_layout, ComputedBox, LayoutResult};
pub use measure::{
    EstimatedTextMeasurer, FontFace, FontRegistry, FontStore, ShapedTextMeasurer, TextMeasurer,
    TextMetrics, TextStyle, DEFAULT_CHAR_WIDTH, DEFAULT_FONT,
};
pub use module::{flex_layout_module, preload_fonts, request_layout, text_metrics_module, FLEX_WORKER};
pub use style::{
    Align, Direction, DisplayMode, Justify, Length, PositionMode, StyleNode, WhiteSpace, Wrap,
    STYLE_PROPERTIES,
};
pub use system::FlexLayoutSystem;
