//! The facade interface
//!
//! A facade is a persistent, stateful node behind a descriptor. The
//! reconciler only depends on this small interface: an explicit property
//! schema (`set_property` / `property`), a `property_changed` hook run after
//! each assignment, `after_update` once the node and its children are
//! current, and `destroy`.
//!
//! Optional behavior (flex layout, physics bodies) is attached through
//! capability tags declared on the [`FacadeKind`] and through composition,
//! never through inheritance.

use std::any::Any;
use std::fmt;

use serde_json::Value;

use crate::object3d::Object3D;
use crate::tree::FacadeId;

/// Tag for an optional behavior a facade kind supports
pub type Capability = &'static str;

/// Kind has an [`Object3D`] transform
pub const TRANSFORM: Capability = "transform";

/// A facade constructor plus its static metadata
///
/// Kinds are compared by name, so each kind must have a unique name.
#[derive(Clone, Copy)]
pub struct FacadeKind {
    name: &'static str,
    construct: fn() -> Box<dyn Facade>,
    capabilities: &'static [Capability],
}

impl FacadeKind {
    pub const fn new(
        name: &'static str,
        construct: fn() -> Box<dyn Facade>,
        capabilities: &'static [Capability],
    ) -> Self {
        Self {
            name,
            construct,
            capabilities,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capabilities(&self) -> &'static [Capability] {
        self.capabilities
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub(crate) fn construct(&self) -> Box<dyn Facade> {
        (self.construct)()
    }
}

impl PartialEq for FacadeKind {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for FacadeKind {}

impl fmt::Debug for FacadeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FacadeKind")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

// =============================================================================
// ChangeCategory - What Changed
// =============================================================================

/// Categories of change caused by a property assignment
///
/// Used to decide what follow-up work the frame needs:
/// - Transform changes mark the node's matrix dirty
/// - Layout changes invalidate flex layout
/// - Visual changes only need a render
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChangeCategory {
    pub transform: bool,
    pub layout: bool,
    pub visual: bool,
}

impl ChangeCategory {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn transform() -> Self {
        Self {
            transform: true,
            ..Self::default()
        }
    }

    pub fn layout() -> Self {
        Self {
            layout: true,
            ..Self::default()
        }
    }

    pub fn visual() -> Self {
        Self {
            visual: true,
            ..Self::default()
        }
    }

    pub fn any(&self) -> bool {
        self.transform || self.layout || self.visual
    }

    pub fn merge(self, other: ChangeCategory) -> Self {
        Self {
            transform: self.transform || other.transform,
            layout: self.layout || other.layout,
            visual: self.visual || other.visual,
        }
    }
}

/// Why a facade rejected a property assignment
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PropertyError {
    Unknown,
    Invalid(String),
}

impl PropertyError {
    pub fn expected(what: &str, got: &Value) -> Self {
        PropertyError::Invalid(format!("expected {what}, got {got}"))
    }
}

pub fn expect_f64(value: &Value) -> Result<f64, PropertyError> {
    value
        .as_f64()
        .ok_or_else(|| PropertyError::expected("a number", value))
}

pub fn expect_bool(value: &Value) -> Result<bool, PropertyError> {
    value
        .as_bool()
        .ok_or_else(|| PropertyError::expected("a boolean", value))
}

pub fn expect_str(value: &Value) -> Result<&str, PropertyError> {
    value
        .as_str()
        .ok_or_else(|| PropertyError::expected("a string", value))
}

// =============================================================================
// Frame requests
// =============================================================================

/// Work a facade asks the frame loop to schedule
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameRequests {
    pub update: bool,
    pub render: bool,
}

impl FrameRequests {
    pub fn any(&self) -> bool {
        self.update || self.render
    }
}

/// Handed to facade hooks
pub struct FacadeContext<'a> {
    id: FacadeId,
    parent: Option<FacadeId>,
    requests: &'a mut FrameRequests,
}

impl<'a> FacadeContext<'a> {
    pub(crate) fn new(
        id: FacadeId,
        parent: Option<FacadeId>,
        requests: &'a mut FrameRequests,
    ) -> Self {
        Self {
            id,
            parent,
            requests,
        }
    }

    pub fn id(&self) -> FacadeId {
        self.id
    }

    pub fn parent(&self) -> Option<FacadeId> {
        self.parent
    }

    /// Schedule another reconciliation pass
    pub fn request_update(&mut self) {
        self.requests.update = true;
    }

    /// Schedule a render without reconciling
    pub fn request_render(&mut self) {
        self.requests.render = true;
    }
}

/// A persistent node of the facade tree
pub trait Facade: Any {
    /// Assign one property
    ///
    /// Unknown names must return [`PropertyError::Unknown`].
    fn set_property(&mut self, name: &str, value: &Value) -> Result<ChangeCategory, PropertyError>;

    /// Current value of a property, `None` if unknown or unset
    fn property(&self, name: &str) -> Option<Value>;

    /// Runs synchronously after each successful assignment
    fn property_changed(&mut self, _name: &str, _cx: &mut FacadeContext<'_>) {}

    /// Runs once per pass after the node's children are up to date
    fn after_update(&mut self, _cx: &mut FacadeContext<'_>) {}

    /// Release owned resources; children are already destroyed
    fn destroy(&mut self, _cx: &mut FacadeContext<'_>) {}

    fn object3d(&self) -> Option<&Object3D> {
        None
    }

    fn object3d_mut(&mut self) -> Option<&mut Object3D> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_change_category_merge() {
        let merged = ChangeCategory::transform().merge(ChangeCategory::visual());
        assert!(merged.transform && merged.visual && !merged.layout);
        assert!(!ChangeCategory::none().any());
    }

    #[test]
    fn test_value_helpers() {
        assert_eq!(expect_f64(&json!(2.5)), Ok(2.5));
        assert!(matches!(expect_f64(&json!("x")), Err(PropertyError::Invalid(_))));
        assert_eq!(expect_bool(&json!(true)), Ok(true));
        assert_eq!(expect_str(&json!("a")), Ok("a"));
    }
}
