//! Style tree input
//!
//! A style tree is plain JSON: every node has a unique `id`, any subset of
//! flexbox properties (camelCase, CSS value names), optional text to
//! measure, and children.
//!
//! ```json
//! {
//!   "id": "root",
//!   "width": 100, "height": 100,
//!   "alignItems": "center", "justifyContent": "center",
//!   "children": [{ "id": "child", "width": "50%", "height": "50%" }]
//! }
//! ```
//!
//! Lengths are numbers (points), `"N%"` or `"auto"`. Unset properties take
//! CSS flexbox defaults.

use serde::{Deserialize, Serialize};
use taffy::prelude::*;

use crate::error::{FlexError, Result};

/// Default font size for text nodes
pub const DEFAULT_FONT_SIZE: f64 = 16.0;
/// Default line height, as a multiple of the font size
pub const DEFAULT_LINE_HEIGHT: f64 = 1.2;

/// A length as written in the style tree
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Length {
    Points(f64),
    Text(String),
}

impl From<f64> for Length {
    fn from(points: f64) -> Self {
        Length::Points(points)
    }
}

impl From<&str> for Length {
    fn from(text: &str) -> Self {
        Length::Text(text.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum ParsedLength {
    Points(f32),
    Percent(f32),
    Auto,
}

impl Length {
    fn parse(&self, id: &str, property: &'static str) -> Result<ParsedLength> {
        let invalid = |message: String| FlexError::InvalidStyle {
            id: id.to_string(),
            property,
            message,
        };
        match self {
            Length::Points(points) if points.is_finite() => Ok(ParsedLength::Points(*points as f32)),
            Length::Points(points) => Err(invalid(format!("{points} is not a finite length"))),
            Length::Text(text) => {
                let text = text.trim();
                if text == "auto" {
                    return Ok(ParsedLength::Auto);
                }
                let (number, percent) = match text.strip_suffix('%') {
                    Some(number) => (number.trim(), true),
                    None => (text, false),
                };
                let value: f32 = number
                    .parse()
                    .map_err(|_| invalid(format!("`{text}` is not a length")))?;
                Ok(if percent {
                    ParsedLength::Percent(value / 100.0)
                } else {
                    ParsedLength::Points(value)
                })
            }
        }
    }

    fn dimension(&self, id: &str, property: &'static str) -> Result<Dimension> {
        Ok(match self.parse(id, property)? {
            ParsedLength::Points(v) => Dimension::Length(v),
            ParsedLength::Percent(v) => Dimension::Percent(v),
            ParsedLength::Auto => Dimension::Auto,
        })
    }

    fn length_percentage_auto(&self, id: &str, property: &'static str) -> Result<LengthPercentageAuto> {
        Ok(match self.parse(id, property)? {
            ParsedLength::Points(v) => LengthPercentageAuto::Length(v),
            ParsedLength::Percent(v) => LengthPercentageAuto::Percent(v),
            ParsedLength::Auto => LengthPercentageAuto::Auto,
        })
    }

    fn length_percentage(&self, id: &str, property: &'static str) -> Result<LengthPercentage> {
        match self.parse(id, property)? {
            ParsedLength::Points(v) => Ok(LengthPercentage::Length(v)),
            ParsedLength::Percent(v) => Ok(LengthPercentage::Percent(v)),
            ParsedLength::Auto => Err(FlexError::InvalidStyle {
                id: id.to_string(),
                property,
                message: "`auto` is not allowed here".to_string(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayMode {
    Flex,
    None,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PositionMode {
    Relative,
    Absolute,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    Row,
    RowReverse,
    Column,
    ColumnReverse,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Wrap {
    Nowrap,
    Wrap,
    WrapReverse,
}

/// `alignItems` / `alignSelf`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Align {
    FlexStart,
    FlexEnd,
    Center,
    Stretch,
    Baseline,
}

/// `alignContent` / `justifyContent`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Justify {
    FlexStart,
    FlexEnd,
    Center,
    Stretch,
    SpaceBetween,
    SpaceAround,
    SpaceEvenly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WhiteSpace {
    Normal,
    Nowrap,
}

impl From<Align> for AlignItems {
    fn from(align: Align) -> Self {
        match align {
            Align::FlexStart => AlignItems::FlexStart,
            Align::FlexEnd => AlignItems::FlexEnd,
            Align::Center => AlignItems::Center,
            Align::Stretch => AlignItems::Stretch,
            Align::Baseline => AlignItems::Baseline,
        }
    }
}

impl From<Justify> for AlignContent {
    fn from(justify: Justify) -> Self {
        match justify {
            Justify::FlexStart => AlignContent::FlexStart,
            Justify::FlexEnd => AlignContent::FlexEnd,
            Justify::Center => AlignContent::Center,
            Justify::Stretch => AlignContent::Stretch,
            Justify::SpaceBetween => AlignContent::SpaceBetween,
            Justify::SpaceAround => AlignContent::SpaceAround,
            Justify::SpaceEvenly => AlignContent::SpaceEvenly,
        }
    }
}

/// One node of a style tree
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleNode {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<DisplayMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<PositionMode>,

    // Flex container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flex_direction: Option<Direction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flex_wrap: Option<Wrap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align_items: Option<Align>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align_content: Option<Justify>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justify_content: Option<Justify>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap: Option<Length>,

    // Flex item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align_self: Option<Align>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flex_grow: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flex_shrink: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flex_basis: Option<Length>,

    // Size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_width: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_height: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_height: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<f64>,

    // Insets (for absolute positioning)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<Length>,

    // Box model; per-side values win over the shorthand
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin_top: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin_right: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin_bottom: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin_left: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding_top: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding_right: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding_bottom: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding_left: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_width: Option<f64>,

    // Text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_height: Option<f64>,
    /// Extra advance per character, in ems
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub letter_spacing: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub white_space: Option<WhiteSpace>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StyleNode>,
}

/// Style property names accepted on a style node, besides `id` and `children`
pub const STYLE_PROPERTIES: &[&str] = &[
    "display",
    "position",
    "flexDirection",
    "flexWrap",
    "alignItems",
    "alignContent",
    "justifyContent",
    "gap",
    "alignSelf",
    "flexGrow",
    "flexShrink",
    "flexBasis",
    "width",
    "height",
    "minWidth",
    "minHeight",
    "maxWidth",
    "maxHeight",
    "aspectRatio",
    "top",
    "right",
    "bottom",
    "left",
    "margin",
    "marginTop",
    "marginRight",
    "marginBottom",
    "marginLeft",
    "padding",
    "paddingTop",
    "paddingRight",
    "paddingBottom",
    "paddingLeft",
    "borderWidth",
    "text",
    "font",
    "fontSize",
    "lineHeight",
    "letterSpacing",
    "whiteSpace",
];

impl StyleNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn is_text(&self) -> bool {
        self.text.is_some()
    }

    fn side(&self, side: &Option<Length>, shorthand: &Option<Length>) -> Option<Length> {
        side.clone().or_else(|| shorthand.clone())
    }

    /// Convert to the layout engine's style
    pub fn to_taffy(&self) -> Result<Style> {
        let id = self.id.as_str();
        let mut style = Style::default();

        if self.display == Some(DisplayMode::None) {
            style.display = Display::None;
        }
        if self.position == Some(PositionMode::Absolute) {
            style.position = Position::Absolute;
        }

        if let Some(direction) = self.flex_direction {
            style.flex_direction = match direction {
                Direction::Row => FlexDirection::Row,
                Direction::RowReverse => FlexDirection::RowReverse,
                Direction::Column => FlexDirection::Column,
                Direction::ColumnReverse => FlexDirection::ColumnReverse,
            };
        }
        if let Some(wrap) = self.flex_wrap {
            style.flex_wrap = match wrap {
                Wrap::Nowrap => FlexWrap::NoWrap,
                Wrap::Wrap => FlexWrap::Wrap,
                Wrap::WrapReverse => FlexWrap::WrapReverse,
            };
        }
        style.align_items = self.align_items.map(AlignItems::from);
        style.align_self = self.align_self.map(AlignItems::from);
        style.align_content = self.align_content.map(AlignContent::from);
        style.justify_content = self.justify_content.map(AlignContent::from);
        if let Some(gap) = &self.gap {
            let gap = gap.length_percentage(id, "gap")?;
            style.gap = Size {
                width: gap,
                height: gap,
            };
        }

        if let Some(grow) = self.flex_grow {
            style.flex_grow = grow as f32;
        }
        if let Some(shrink) = self.flex_shrink {
            style.flex_shrink = shrink as f32;
        }
        if let Some(basis) = &self.flex_basis {
            style.flex_basis = basis.dimension(id, "flexBasis")?;
        }

        let dimension = |value: &Option<Length>, property: &'static str| -> Result<Dimension> {
            value
                .as_ref()
                .map_or(Ok(Dimension::Auto), |value| value.dimension(id, property))
        };
        style.size = Size {
            width: dimension(&self.width, "width")?,
            height: dimension(&self.height, "height")?,
        };
        style.min_size = Size {
            width: dimension(&self.min_width, "minWidth")?,
            height: dimension(&self.min_height, "minHeight")?,
        };
        style.max_size = Size {
            width: dimension(&self.max_width, "maxWidth")?,
            height: dimension(&self.max_height, "maxHeight")?,
        };
        style.aspect_ratio = self.aspect_ratio.map(|ratio| ratio as f32);

        let inset = |value: &Option<Length>, property: &'static str| -> Result<LengthPercentageAuto> {
            value
                .as_ref()
                .map_or(Ok(LengthPercentageAuto::Auto), |value| {
                    value.length_percentage_auto(id, property)
                })
        };
        style.inset = Rect {
            top: inset(&self.top, "top")?,
            right: inset(&self.right, "right")?,
            bottom: inset(&self.bottom, "bottom")?,
            left: inset(&self.left, "left")?,
        };

        let margin = |side: &Option<Length>, property: &'static str| -> Result<LengthPercentageAuto> {
            self.side(side, &self.margin)
                .map_or(Ok(LengthPercentageAuto::Length(0.0)), |value| {
                    value.length_percentage_auto(id, property)
                })
        };
        style.margin = Rect {
            top: margin(&self.margin_top, "marginTop")?,
            right: margin(&self.margin_right, "marginRight")?,
            bottom: margin(&self.margin_bottom, "marginBottom")?,
            left: margin(&self.margin_left, "marginLeft")?,
        };

        let padding = |side: &Option<Length>, property: &'static str| -> Result<LengthPercentage> {
            self.side(side, &self.padding)
                .map_or(Ok(LengthPercentage::Length(0.0)), |value| {
                    value.length_percentage(id, property)
                })
        };
        style.padding = Rect {
            top: padding(&self.padding_top, "paddingTop")?,
            right: padding(&self.padding_right, "paddingRight")?,
            bottom: padding(&self.padding_bottom, "paddingBottom")?,
            left: padding(&self.padding_left, "paddingLeft")?,
        };

        if let Some(border) = self.border_width {
            let border = LengthPercentage::Length(border as f32);
            style.border = Rect {
                top: border,
                right: border,
                bottom: border,
                left: border,
            };
        }

        Ok(style)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_camel_case_tree() {
        let node: StyleNode = serde_json::from_value(json!({
            "id": "root",
            "width": 100,
            "alignItems": "center",
            "justifyContent": "space-between",
            "children": [{ "id": "child", "width": "50%", "text": "hi" }]
        }))
        .unwrap();
        assert_eq!(node.width, Some(Length::Points(100.0)));
        assert_eq!(node.align_items, Some(Align::Center));
        assert_eq!(node.justify_content, Some(Justify::SpaceBetween));
        assert!(node.children[0].is_text());
    }

    #[test]
    fn test_id_is_required() {
        assert!(serde_json::from_value::<StyleNode>(json!({ "width": 10 })).is_err());
    }

    #[test]
    fn test_length_conversion() {
        let mut node = StyleNode::new("n");
        node.width = Some("50%".into());
        node.height = Some("auto".into());
        node.margin = Some(4.0.into());
        node.margin_left = Some("10".into());
        let style = node.to_taffy().unwrap();
        assert_eq!(style.size.width, Dimension::Percent(0.5));
        assert_eq!(style.size.height, Dimension::Auto);
        assert_eq!(style.margin.top, LengthPercentageAuto::Length(4.0));
        assert_eq!(style.margin.left, LengthPercentageAuto::Length(10.0));
    }

    #[test]
    fn test_invalid_length_names_property() {
        let mut node = StyleNode::new("n");
        node.padding = Some("auto".into());
        assert!(matches!(
            node.to_taffy(),
            Err(FlexError::InvalidStyle { property: "paddingTop", .. })
        ));

        node.padding = None;
        node.width = Some("wide".into());
        assert!(matches!(
            node.to_taffy(),
            Err(FlexError::InvalidStyle { property: "width", .. })
        ));
    }

    #[test]
    fn test_property_list_matches_fields() {
        let empty = serde_json::to_value(StyleNode::new("x")).unwrap();
        assert_eq!(empty, json!({ "id": "x" }));

        // Every listed name is a real field: a wrong-typed value is rejected
        for name in STYLE_PROPERTIES {
            let mut map = serde_json::Map::new();
            map.insert("id".to_string(), json!("x"));
            map.insert(name.to_string(), json!([]));
            assert!(
                serde_json::from_value::<StyleNode>(serde_json::Value::Object(map)).is_err(),
                "{name}"
            );
        }
    }
}
