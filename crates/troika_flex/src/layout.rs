//! Flex layout processing
//!
//! [`process_flex_layout`] is a pure function from a style tree to a flat
//! map of computed boxes. It builds a taffy tree, solves it with rounding
//! disabled so callers get full floating point precision, and measures text
//! nodes through the supplied [`TextMeasurer`].
//!
//! Box positions are relative to the parent's border box, matching how the
//! layout engine reports them.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use taffy::prelude::*;

use crate::error::{FlexError, Result};
use crate::measure::{TextMeasurer, TextStyle};
use crate::style::{StyleNode, WhiteSpace, DEFAULT_FONT_SIZE, DEFAULT_LINE_HEIGHT};

/// Computed box of one node
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputedBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Computed boxes keyed by style node id
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayoutResult(pub FxHashMap<String, ComputedBox>);

impl LayoutResult {
    pub fn get(&self, id: &str) -> Option<&ComputedBox> {
        self.0.get(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ComputedBox)> {
        self.0.iter().map(|(id, computed)| (id.as_str(), computed))
    }
}

fn text_style(node: &StyleNode) -> Option<TextStyle> {
    node.text.as_ref().map(|text| TextStyle {
        text: text.clone(),
        font: node.font.clone(),
        font_size: node.font_size.unwrap_or(DEFAULT_FONT_SIZE),
        line_height: node.line_height.unwrap_or(DEFAULT_LINE_HEIGHT),
        letter_spacing: node.letter_spacing.unwrap_or(0.0),
        white_space: node.white_space.unwrap_or(WhiteSpace::Normal),
    })
}

struct Builder<'a> {
    taffy: TaffyTree<TextStyle>,
    measurer: &'a dyn TextMeasurer,
    ids: FxHashSet<String>,
    nodes: Vec<(String, NodeId)>,
}

impl Builder<'_> {
    fn build(&mut self, node: &StyleNode) -> Result<NodeId> {
        if !self.ids.insert(node.id.clone()) {
            return Err(FlexError::DuplicateId(node.id.clone()));
        }
        let style = node.to_taffy()?;

        let taffy_node = match text_style(node) {
            Some(text) => {
                self.measurer.ensure_font(text.font_name())?;
                if !node.children.is_empty() {
                    tracing::debug!(id = %node.id, "children of a text node are ignored");
                }
                self.taffy.new_leaf_with_context(style, text)?
            }
            None => {
                let children = node
                    .children
                    .iter()
                    .map(|child| self.build(child))
                    .collect::<Result<Vec<_>>>()?;
                self.taffy.new_with_children(style, &children)?
            }
        };
        self.nodes.push((node.id.clone(), taffy_node));
        Ok(taffy_node)
    }
}

/// Compute the layout of a style tree
pub fn process_flex_layout(root: &StyleNode, measurer: &dyn TextMeasurer) -> Result<LayoutResult> {
    let mut builder = Builder {
        taffy: TaffyTree::new(),
        measurer,
        ids: FxHashSet::default(),
        nodes: Vec::new(),
    };
    let root_node = builder.build(root)?;
    let Builder { mut taffy, nodes, .. } = builder;
    taffy.disable_rounding();

    // The measure callback cannot fail, so the first error is kept aside
    let mut failure: Option<FlexError> = None;
    taffy.compute_layout_with_measure(
        root_node,
        Size::MAX_CONTENT,
        |known, available, _node, context, _style| {
            if let Size {
                width: Some(width),
                height: Some(height),
            } = known
            {
                return Size { width, height };
            }
            let Some(text) = context else {
                return Size::ZERO;
            };

            let max_width = known.width.map(f64::from).or(match available.width {
                AvailableSpace::Definite(width) => Some(f64::from(width)),
                AvailableSpace::MinContent => Some(0.0),
                AvailableSpace::MaxContent => None,
            });
            match measurer.measure(text, max_width) {
                Ok(metrics) => Size {
                    width: known.width.unwrap_or(metrics.width as f32),
                    height: known.height.unwrap_or(metrics.height as f32),
                },
                Err(error) => {
                    failure.get_or_insert(error);
                    Size::ZERO
                }
            }
        },
    )?;
    if let Some(error) = failure {
        return Err(error);
    }

    let mut boxes = FxHashMap::default();
    boxes.reserve(nodes.len());
    for (id, node) in nodes {
        let layout = taffy.layout(node)?;
        boxes.insert(
            id,
            ComputedBox {
                left: f64::from(layout.location.x),
                top: f64::from(layout.location.y),
                width: f64::from(layout.size.width),
                height: f64::from(layout.size.height),
            },
        );
    }
    tracing::trace!(nodes = boxes.len(), root = %root.id, "flex layout computed");
    Ok(LayoutResult(boxes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::{EstimatedTextMeasurer, FontRegistry};
    use serde_json::json;

    fn layout(tree: serde_json::Value) -> Result<LayoutResult> {
        let root: StyleNode = serde_json::from_value(tree).unwrap();
        let fonts = FontRegistry::new();
        process_flex_layout(&root, &EstimatedTextMeasurer::new(&fonts))
    }

    #[test]
    fn test_centered_percent_child() {
        let result = layout(json!({
            "id": "root",
            "width": 100,
            "height": 100,
            "alignItems": "center",
            "justifyContent": "center",
            "children": [{ "id": "child", "width": "50%", "height": "50%" }]
        }))
        .unwrap();

        assert_eq!(
            result.get("child"),
            Some(&ComputedBox {
                left: 25.0,
                top: 25.0,
                width: 50.0,
                height: 50.0
            })
        );
        assert_eq!(
            result.get("root"),
            Some(&ComputedBox {
                left: 0.0,
                top: 0.0,
                width: 100.0,
                height: 100.0
            })
        );
    }

    #[test]
    fn test_no_rounding() {
        let result = layout(json!({
            "id": "root",
            "width": 10,
            "height": 10,
            "children": [
                { "id": "a", "flexGrow": 1 },
                { "id": "b", "flexGrow": 1 },
                { "id": "c", "flexGrow": 1 }
            ]
        }))
        .unwrap();
        let b = result.get("b").unwrap();
        assert!((b.width - 10.0 / 3.0).abs() < 1e-5);
        assert!((b.left - 10.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_text_node_is_measured_and_wrapped() {
        let result = layout(json!({
            "id": "root",
            "width": 40,
            "flexDirection": "column",
            "alignItems": "flex-start",
            "children": [{
                "id": "label",
                "text": "hello world",
                "fontSize": 10,
                "lineHeight": 1.2
            }]
        }))
        .unwrap();
        let label = result.get("label").unwrap();
        assert!(label.width <= 40.0);
        // Two lines of 12
        assert!((label.height - 24.0).abs() < 1e-4, "{label:?}");
    }

    #[test]
    fn test_duplicate_ids_fail() {
        let result = layout(json!({
            "id": "root",
            "children": [{ "id": "x" }, { "id": "x" }]
        }));
        assert_eq!(result, Err(FlexError::DuplicateId("x".to_string())));
    }

    #[test]
    fn test_unloaded_font_fails() {
        let result = layout(json!({
            "id": "root",
            "children": [{ "id": "t", "text": "hi", "font": "Inter" }]
        }));
        assert_eq!(result, Err(FlexError::FontNotLoaded("Inter".to_string())));
    }

    #[test]
    fn test_result_wire_shape() {
        let result = layout(json!({ "id": "only", "width": 5, "height": 6 })).unwrap();
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({ "only": { "left": 0.0, "top": 0.0, "width": 5.0, "height": 6.0 } })
        );
    }
}
