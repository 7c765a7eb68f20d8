//! Flex node facade
//!
//! A flex node carries flexbox style properties (the same camelCase names
//! as the style tree), optional text, and an embedded [`Object3D`]. The
//! layout system positions it from its computed box; a flex node whose
//! parent is not a flex node is the root of its own layout.

use std::any::Any;

use serde_json::{json, Map, Value};
use troika_core::{
    Capability, ChangeCategory, Facade, FacadeKind, Object3D, PropertyError, TRANSFORM,
};

use crate::layout::ComputedBox;
use crate::style::{StyleNode, STYLE_PROPERTIES};

/// Kind takes part in flex layout
pub const FLEX_NODE: Capability = "flex_node";

pub const FLEX_BOX: FacadeKind =
    FacadeKind::new("FlexBox", FlexNodeFacade::construct, &[TRANSFORM, FLEX_NODE]);

/// Read-only properties exposing the last computed box
pub const COMPUTED_PROPERTIES: &[&str] = &["computedLeft", "computedTop", "computedWidth", "computedHeight"];

#[derive(Debug, Default)]
pub struct FlexNodeFacade {
    pub object: Object3D,
    style: Map<String, Value>,
    computed: Option<ComputedBox>,
}

impl FlexNodeFacade {
    fn construct() -> Box<dyn Facade> {
        Box::<FlexNodeFacade>::default()
    }

    pub fn is_style_property(name: &str) -> bool {
        STYLE_PROPERTIES.contains(&name)
    }

    pub fn computed(&self) -> Option<ComputedBox> {
        self.computed
    }

    pub fn set_computed(&mut self, computed: ComputedBox) {
        self.computed = Some(computed);
    }

    pub fn font(&self) -> Option<&str> {
        self.style.get("font").and_then(Value::as_str)
    }

    /// Style node for this facade with the given id and children
    pub fn style_node(&self, id: String, children: Vec<StyleNode>) -> serde_json::Result<StyleNode> {
        let mut style = self.style.clone();
        style.insert("id".to_string(), Value::String(id));
        let mut node: StyleNode = serde_json::from_value(Value::Object(style))?;
        node.children = children;
        Ok(node)
    }

    fn set_style(&mut self, name: &str, value: &Value) -> Result<ChangeCategory, PropertyError> {
        if value.is_null() {
            self.style.remove(name);
            return Ok(ChangeCategory::layout());
        }

        // Validate by parsing a single-property node
        let mut partial = Map::new();
        partial.insert("id".to_string(), Value::String(String::new()));
        partial.insert(name.to_string(), value.clone());
        let node: StyleNode = serde_json::from_value(Value::Object(partial))
            .map_err(|error| PropertyError::Invalid(error.to_string()))?;
        node.to_taffy()
            .map_err(|error| PropertyError::Invalid(error.to_string()))?;

        self.style.insert(name.to_string(), value.clone());
        Ok(ChangeCategory::layout())
    }
}

impl Facade for FlexNodeFacade {
    fn set_property(&mut self, name: &str, value: &Value) -> Result<ChangeCategory, PropertyError> {
        if Object3D::is_property(name) {
            self.object.set_property(name, value)
        } else if Self::is_style_property(name) {
            self.set_style(name, value)
        } else {
            Err(PropertyError::Unknown)
        }
    }

    fn property(&self, name: &str) -> Option<Value> {
        if Object3D::is_property(name) {
            return self.object.property(name);
        }
        if Self::is_style_property(name) {
            return Some(self.style.get(name).cloned().unwrap_or(Value::Null));
        }
        let computed = self.computed?;
        match name {
            "computedLeft" => Some(json!(computed.left)),
            "computedTop" => Some(json!(computed.top)),
            "computedWidth" => Some(json!(computed.width)),
            "computedHeight" => Some(json!(computed.height)),
            _ => None,
        }
    }

    fn object3d(&self) -> Option<&Object3D> {
        Some(&self.object)
    }

    fn object3d_mut(&mut self) -> Option<&mut Object3D> {
        Some(&mut self.object)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{Align, Length};

    #[test]
    fn test_style_and_transform_properties() {
        let mut facade = FlexNodeFacade::default();
        assert_eq!(facade.set_property("width", &json!("50%")), Ok(ChangeCategory::layout()));
        assert_eq!(facade.set_property("x", &json!(1.0)), Ok(ChangeCategory::transform()));
        assert_eq!(facade.set_property("colour", &json!(1)), Err(PropertyError::Unknown));
        assert_eq!(facade.property("width"), Some(json!("50%")));
        assert_eq!(facade.property("height"), Some(Value::Null));
        assert_eq!(facade.property("computedWidth"), None);
    }

    #[test]
    fn test_invalid_style_is_rejected() {
        let mut facade = FlexNodeFacade::default();
        assert!(matches!(
            facade.set_property("alignItems", &json!("middle")),
            Err(PropertyError::Invalid(_))
        ));
        assert!(matches!(
            facade.set_property("width", &json!("wide")),
            Err(PropertyError::Invalid(_))
        ));
        assert_eq!(facade.property("alignItems"), Some(Value::Null));
    }

    #[test]
    fn test_style_node_round_trip() {
        let mut facade = FlexNodeFacade::default();
        facade.set_property("width", &json!(100)).unwrap();
        facade.set_property("alignItems", &json!("center")).unwrap();
        facade.set_property("width", &Value::Null).unwrap();

        let node = facade.style_node("7".to_string(), vec![StyleNode::new("8")]).unwrap();
        assert_eq!(node.id, "7");
        assert_eq!(node.width, None::<Length>);
        assert_eq!(node.align_items, Some(Align::Center));
        assert_eq!(node.children.len(), 1);
    }

    #[test]
    fn test_computed_properties() {
        let mut facade = FlexNodeFacade::default();
        facade.set_computed(ComputedBox {
            left: 1.0,
            top: 2.0,
            width: 3.0,
            height: 4.0,
        });
        assert_eq!(facade.property("computedHeight"), Some(json!(4.0)));
        assert!(FLEX_BOX.has_capability(FLEX_NODE));
        assert!(FLEX_BOX.has_capability(TRANSFORM));
    }
}
