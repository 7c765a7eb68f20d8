//! Renderer collaborator
//!
//! The facade engine never draws anything itself. It mirrors facade
//! lifecycle and transforms into a [`SceneRenderer`], which owns whatever
//! render-engine objects back each facade.

use serde_json::Value;

use crate::facade::FacadeKind;
use crate::math::Mat4;
use crate::tree::FacadeId;

/// Retained-mode object graph the scene is drawn with
pub trait SceneRenderer {
    /// A facade was constructed
    fn create_node(&mut self, id: FacadeId, parent: Option<FacadeId>, kind: FacadeKind);

    /// A facade was destroyed
    fn remove_node(&mut self, id: FacadeId);

    /// World matrix of a transform facade changed
    fn set_transform(&mut self, id: FacadeId, world_matrix: &Mat4);

    fn set_visible(&mut self, id: FacadeId, visible: bool);

    /// Any other property assignment (material-like state)
    fn set_property(&mut self, _id: FacadeId, _name: &str, _value: &Value) {}

    /// Draw one frame
    fn render(&mut self);

    /// Deepest facade under a point in viewport coordinates
    fn hit_test(&self, _x: f64, _y: f64) -> Option<FacadeId> {
        None
    }
}

/// A call made on a [`RecordingRenderer`]
#[derive(Clone, Debug, PartialEq)]
pub enum RenderCall {
    Create {
        id: FacadeId,
        parent: Option<FacadeId>,
        kind: &'static str,
    },
    Remove(FacadeId),
    Transform(FacadeId, Mat4),
    Visible(FacadeId, bool),
    Property(FacadeId, String, Value),
    Render,
}

/// Renderer that records every call, for headless use and tests
#[derive(Clone, Debug, Default)]
pub struct RecordingRenderer {
    pub calls: Vec<RenderCall>,
    hit: Option<FacadeId>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every hit test report `id`
    pub fn set_hit(&mut self, id: Option<FacadeId>) {
        self.hit = id;
    }

    pub fn take_calls(&mut self) -> Vec<RenderCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn frames_rendered(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, RenderCall::Render))
            .count()
    }

    pub fn last_transform(&self, id: FacadeId) -> Option<Mat4> {
        self.calls.iter().rev().find_map(|call| match call {
            RenderCall::Transform(target, matrix) if *target == id => Some(*matrix),
            _ => None,
        })
    }
}

impl SceneRenderer for RecordingRenderer {
    fn create_node(&mut self, id: FacadeId, parent: Option<FacadeId>, kind: FacadeKind) {
        self.calls.push(RenderCall::Create {
            id,
            parent,
            kind: kind.name(),
        });
    }

    fn remove_node(&mut self, id: FacadeId) {
        self.calls.push(RenderCall::Remove(id));
    }

    fn set_transform(&mut self, id: FacadeId, world_matrix: &Mat4) {
        self.calls.push(RenderCall::Transform(id, *world_matrix));
    }

    fn set_visible(&mut self, id: FacadeId, visible: bool) {
        self.calls.push(RenderCall::Visible(id, visible));
    }

    fn set_property(&mut self, id: FacadeId, name: &str, value: &Value) {
        self.calls
            .push(RenderCall::Property(id, name.to_string(), value.clone()));
    }

    fn render(&mut self) {
        self.calls.push(RenderCall::Render);
    }

    fn hit_test(&self, _x: f64, _y: f64) -> Option<FacadeId> {
        self.hit
    }
}
