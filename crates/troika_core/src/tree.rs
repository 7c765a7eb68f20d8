//! Facade tree and reconciliation
//!
//! The tree is an arena of facade instances keyed by generational
//! [`FacadeId`]s. [`FacadeTree::update_children`] reconciles a parent's
//! children against a fresh set of descriptors:
//!
//! ```text
//! descriptors ──► validate keys and kinds (no mutation yet)
//!             ──► per descriptor: reuse (same key, same kind) or construct
//!                 ──► assign properties ──► property_changed hooks
//!                 ──► reconcile grandchildren ──► after_update
//!             ──► destroy children whose keys disappeared (depth-first)
//! ```
//!
//! Every instance created is destroyed exactly once, either explicitly or
//! when an ancestor is destroyed. Destroyed ids never resolve again, so any
//! later operation on them fails with [`FacadeError::Destroyed`].

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use crate::descriptor::{Children, Descriptor, Key};
use crate::error::{FacadeError, Result};
use crate::events::{Event, ListenerId, Listeners};
use crate::facade::{Capability, Facade, FacadeContext, FacadeKind, FrameRequests, PropertyError};
use crate::math::Mat4;
use crate::object3d::{Object3D, GROUP};
use crate::renderer::SceneRenderer;
use crate::transition::{TransitionRequest, TransitionSpec};

new_key_type! {
    /// Stable identity of a facade instance
    pub struct FacadeId;
}

impl FacadeId {
    /// Convert to a raw u64 for crossing thread or wire boundaries
    pub fn to_raw(self) -> u64 {
        slotmap::Key::data(&self).as_ffi()
    }

    /// Reconstruct from [`to_raw`](Self::to_raw)
    pub fn from_raw(raw: u64) -> Self {
        FacadeId::from(slotmap::KeyData::from_ffi(raw))
    }
}

/// Lifecycle of a facade instance
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Constructed,
    Updated,
    Destroying,
    Destroyed,
}

/// Change recorded during a pass, for the renderer and frame systems
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    Created {
        id: FacadeId,
        parent: Option<FacadeId>,
        kind: FacadeKind,
    },
    PropertyChanged {
        id: FacadeId,
        name: String,
        value: Value,
    },
    Removed {
        id: FacadeId,
        kind: FacadeKind,
    },
}

/// Instance counts since the last [`FacadeTree::take_stats`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassStats {
    pub created: usize,
    pub destroyed: usize,
}

struct FacadeNode {
    kind: FacadeKind,
    key: Key,
    parent: Option<FacadeId>,
    children: IndexMap<Key, FacadeId>,
    facade: Box<dyn Facade>,
    lifecycle: Lifecycle,
    listeners: Listeners,
    transitions: IndexMap<String, TransitionSpec>,
    /// Last value each property received from a descriptor
    declared: FxHashMap<String, Value>,
    matrix_dirty: bool,
    world_matrix: Mat4,
}

impl FacadeNode {
    fn is_live(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Constructed | Lifecycle::Updated)
    }
}

/// Arena of facade instances rooted at a single root facade
pub struct FacadeTree {
    nodes: SlotMap<FacadeId, FacadeNode>,
    root: FacadeId,
    notifications: Vec<Notification>,
    transition_requests: Vec<TransitionRequest>,
    requests: FrameRequests,
    stats: PassStats,
    next_listener_id: u64,
}

impl std::fmt::Debug for FacadeTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacadeTree")
            .field("root", &self.root)
            .field("nodes", &self.nodes.len())
            .field("pending_notifications", &self.notifications.len())
            .finish()
    }
}

impl Default for FacadeTree {
    fn default() -> Self {
        Self::new(GROUP)
    }
}

/// Numbers compare by value so that `1` and `1.0` are the same property value
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

impl FacadeTree {
    pub fn new(root_kind: FacadeKind) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(FacadeNode {
            kind: root_kind,
            key: Key::from("root"),
            parent: None,
            children: IndexMap::new(),
            facade: root_kind.construct(),
            lifecycle: Lifecycle::Constructed,
            listeners: Listeners::default(),
            transitions: IndexMap::new(),
            declared: FxHashMap::default(),
            matrix_dirty: true,
            world_matrix: Mat4::IDENTITY,
        });
        Self {
            nodes,
            root,
            notifications: vec![Notification::Created {
                id: root,
                parent: None,
                kind: root_kind,
            }],
            transition_requests: Vec::new(),
            requests: FrameRequests::default(),
            stats: PassStats::default(),
            next_listener_id: 1,
        }
    }

    pub fn root(&self) -> FacadeId {
        self.root
    }

    /// Number of live facades, including the root
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: FacadeId) -> bool {
        self.nodes.get(id).is_some_and(FacadeNode::is_live)
    }

    /// Ids no longer in the tree report [`Lifecycle::Destroyed`]
    pub fn lifecycle(&self, id: FacadeId) -> Lifecycle {
        self.nodes
            .get(id)
            .map_or(Lifecycle::Destroyed, |node| node.lifecycle)
    }

    pub fn kind(&self, id: FacadeId) -> Option<FacadeKind> {
        self.nodes.get(id).map(|node| node.kind)
    }

    pub fn key(&self, id: FacadeId) -> Option<&Key> {
        self.nodes.get(id).map(|node| &node.key)
    }

    pub fn parent(&self, id: FacadeId) -> Option<FacadeId> {
        self.nodes.get(id).and_then(|node| node.parent)
    }

    /// Children in reconciliation order
    pub fn children(&self, id: FacadeId) -> Vec<FacadeId> {
        self.nodes
            .get(id)
            .map(|node| node.children.values().copied().collect())
            .unwrap_or_default()
    }

    pub fn child(&self, id: FacadeId, key: &Key) -> Option<FacadeId> {
        self.nodes
            .get(id)
            .and_then(|node| node.children.get(key).copied())
    }

    /// `id` and its descendants in pre-order
    pub fn descendants(&self, id: FacadeId) -> Vec<FacadeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(current) {
                out.push(current);
                stack.extend(node.children.values().rev().copied());
            }
        }
        out
    }

    /// Live facades whose kind declares `capability`, in tree order
    pub fn with_capability(&self, capability: Capability) -> Vec<FacadeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|id| self.has_capability(*id, capability))
            .collect()
    }

    pub fn has_capability(&self, id: FacadeId, capability: Capability) -> bool {
        self.nodes
            .get(id)
            .is_some_and(|node| node.kind.has_capability(capability))
    }

    pub fn facade(&self, id: FacadeId) -> Option<&dyn Facade> {
        self.nodes.get(id).map(|node| node.facade.as_ref())
    }

    /// Typed access to a facade
    pub fn get<T: Facade>(&self, id: FacadeId) -> Option<&T> {
        self.nodes
            .get(id)
            .and_then(|node| node.facade.as_any().downcast_ref::<T>())
    }

    /// Typed mutable access to a facade
    ///
    /// Bypasses property notifications; prefer [`set_property`](Self::set_property).
    pub fn get_mut<T: Facade>(&mut self, id: FacadeId) -> Option<&mut T> {
        self.nodes
            .get_mut(id)
            .filter(|node| node.is_live())
            .and_then(|node| node.facade.as_any_mut().downcast_mut::<T>())
    }

    pub fn object3d(&self, id: FacadeId) -> Option<&Object3D> {
        self.nodes.get(id).and_then(|node| node.facade.object3d())
    }

    /// Mutate a facade's transform directly and mark its matrix dirty
    pub fn update_object3d<F>(&mut self, id: FacadeId, f: F) -> Result<()>
    where
        F: FnOnce(&mut Object3D),
    {
        let node = self.live_node_mut(id)?;
        let Some(object) = node.facade.object3d_mut() else {
            return Err(FacadeError::UnknownProperty {
                kind: node.kind.name(),
                property: "transform".to_string(),
            });
        };
        f(object);
        node.matrix_dirty = true;
        self.requests.render = true;
        Ok(())
    }

    pub fn world_matrix(&self, id: FacadeId) -> Option<Mat4> {
        self.nodes.get(id).map(|node| node.world_matrix)
    }

    pub fn property(&self, id: FacadeId, name: &str) -> Result<Option<Value>> {
        let node = self.live_node(id)?;
        Ok(node.facade.property(name))
    }

    /// Assign a property outside of reconciliation
    ///
    /// Declared transitions do not apply; the value is set immediately.
    pub fn set_property(&mut self, id: FacadeId, name: &str, value: &Value) -> Result<()> {
        self.assign(id, name, value, false)
    }

    fn live_node(&self, id: FacadeId) -> Result<&FacadeNode> {
        self.nodes
            .get(id)
            .filter(|node| node.is_live())
            .ok_or(FacadeError::Destroyed(id))
    }

    fn live_node_mut(&mut self, id: FacadeId) -> Result<&mut FacadeNode> {
        self.nodes
            .get_mut(id)
            .filter(|node| node.is_live())
            .ok_or(FacadeError::Destroyed(id))
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Reconcile the children of `parent` against `children`
    ///
    /// `None` removes every child. Key and kind errors are detected before
    /// any child of `parent` is touched.
    pub fn update_children(&mut self, parent: FacadeId, children: Option<&Children>) -> Result<()> {
        self.live_node(parent)?;

        let mut planned: Vec<(Key, FacadeKind, &Descriptor)> =
            Vec::with_capacity(children.map_or(0, Children::len));
        let mut seen = FxHashSet::default();
        for (index, descriptor) in children.into_iter().flat_map(Children::iter).enumerate() {
            let key = descriptor.key.clone().unwrap_or(Key::Index(index));
            if !seen.insert(key.clone()) {
                return Err(FacadeError::DuplicateKey { parent, key });
            }
            let Some(kind) = descriptor.kind else {
                return Err(FacadeError::MissingKind { parent, key });
            };
            if descriptor.list.is_some() && descriptor.children.is_some() {
                return Err(FacadeError::InvalidDescriptor(format!(
                    "list `{key}` cannot also declare children"
                )));
            }
            planned.push((key, kind, descriptor));
        }

        let mut previous = std::mem::take(&mut self.live_node_mut(parent)?.children);
        let previous_order: SmallVec<[FacadeId; 8]> = previous.values().copied().collect();
        let mut current: IndexMap<Key, FacadeId> = IndexMap::with_capacity(planned.len());
        let mut outcome = Ok(());

        for (key, kind, descriptor) in planned {
            let id = match previous.swap_remove(&key) {
                Some(existing) if self.nodes.get(existing).is_some_and(|n| n.kind == kind) => {
                    existing
                }
                Some(existing) => {
                    self.destroy_subtree(existing);
                    self.construct(parent, key.clone(), kind)
                }
                None => self.construct(parent, key.clone(), kind),
            };
            current.insert(key, id);
            if let Err(error) = self.apply_descriptor(id, descriptor) {
                outcome = Err(error);
                break;
            }
        }

        if outcome.is_ok() {
            for (_, stale) in previous {
                self.destroy_subtree(stale);
            }
        } else {
            // Keep unvisited children attached so they are still destroyed later
            for (key, id) in previous {
                current.entry(key).or_insert(id);
            }
        }

        let reordered = current.values().copied().ne(previous_order.iter().copied());
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children = current;
        }
        if reordered {
            self.requests.render = true;
        }
        outcome
    }

    fn construct(&mut self, parent: FacadeId, key: Key, kind: FacadeKind) -> FacadeId {
        let id = self.nodes.insert(FacadeNode {
            kind,
            key,
            parent: Some(parent),
            children: IndexMap::new(),
            facade: kind.construct(),
            lifecycle: Lifecycle::Constructed,
            listeners: Listeners::default(),
            transitions: IndexMap::new(),
            declared: FxHashMap::default(),
            matrix_dirty: true,
            world_matrix: Mat4::IDENTITY,
        });
        self.stats.created += 1;
        self.notifications.push(Notification::Created {
            id,
            parent: Some(parent),
            kind,
        });
        tracing::trace!(?id, kind = kind.name(), "facade constructed");
        id
    }

    fn apply_descriptor(&mut self, id: FacadeId, descriptor: &Descriptor) -> Result<()> {
        {
            let node = self.live_node_mut(id)?;
            node.listeners.set_declared(&descriptor.listeners);
            node.transitions = descriptor.transitions.clone();
        }

        for (name, value) in &descriptor.props {
            self.assign(id, name, value, true)?;
        }

        let expanded;
        let children = match &descriptor.list {
            Some(list) => {
                expanded = Children::Many(list.expand());
                Some(&expanded)
            }
            None => descriptor.children.as_ref(),
        };
        self.update_children(id, children)?;

        let node = self
            .nodes
            .get_mut(id)
            .filter(|node| node.is_live())
            .ok_or(FacadeError::Destroyed(id))?;
        node.lifecycle = Lifecycle::Updated;
        let mut cx = FacadeContext::new(id, node.parent, &mut self.requests);
        node.facade.after_update(&mut cx);
        Ok(())
    }

    fn assign(&mut self, id: FacadeId, name: &str, value: &Value, reconciling: bool) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id)
            .filter(|node| node.is_live())
            .ok_or(FacadeError::Destroyed(id))?;

        // Descriptors are compared with what they declared last time, so
        // values written since (animations, physics) survive identical passes
        if reconciling {
            if node.declared.get(name).is_some_and(|declared| values_equal(declared, value)) {
                return Ok(());
            }
            node.declared.insert(name.to_string(), value.clone());
        }

        let current = node.facade.property(name);
        if current.as_ref().is_some_and(|current| values_equal(current, value)) {
            return Ok(());
        }

        if reconciling && node.lifecycle == Lifecycle::Updated {
            if let Some(spec) = node.transitions.get(name) {
                if let (Some(from), Some(to)) = (current.as_ref().and_then(Value::as_f64), value.as_f64()) {
                    self.transition_requests.push(TransitionRequest {
                        id,
                        property: name.to_string(),
                        from,
                        to,
                        spec: *spec,
                    });
                    return Ok(());
                }
            }
        }

        let kind = node.kind.name();
        let change = match node.facade.set_property(name, value) {
            Ok(change) => change,
            Err(error) => {
                // Rejected values are reported again on the next pass
                node.declared.remove(name);
                return Err(match error {
                    PropertyError::Unknown => FacadeError::UnknownProperty {
                        kind,
                        property: name.to_string(),
                    },
                    PropertyError::Invalid(message) => FacadeError::InvalidProperty {
                        kind,
                        property: name.to_string(),
                        message,
                    },
                });
            }
        };

        if change.transform {
            node.matrix_dirty = true;
        }
        let mut cx = FacadeContext::new(id, node.parent, &mut self.requests);
        node.facade.property_changed(name, &mut cx);
        self.requests.render = true;
        self.notifications.push(Notification::PropertyChanged {
            id,
            name: name.to_string(),
            value: value.clone(),
        });
        Ok(())
    }

    // =========================================================================
    // Destruction
    // =========================================================================

    /// Destroy a facade and its subtree
    pub fn destroy(&mut self, id: FacadeId) -> Result<()> {
        if id == self.root {
            return Err(FacadeError::InvalidDescriptor(
                "the root facade cannot be destroyed".to_string(),
            ));
        }
        let node = self.live_node(id)?;
        if let Some(parent) = node.parent.and_then(|parent| self.nodes.get_mut(parent)) {
            parent.children.retain(|_, child| *child != id);
        }
        self.destroy_subtree(id);
        self.requests.render = true;
        Ok(())
    }

    /// Children first, then the node's own resources
    fn destroy_subtree(&mut self, id: FacadeId) {
        let children: SmallVec<[FacadeId; 8]> = match self.nodes.get_mut(id) {
            Some(node) if node.is_live() => {
                node.lifecycle = Lifecycle::Destroying;
                node.children.values().copied().collect()
            }
            _ => return,
        };

        for child in children {
            self.destroy_subtree(child);
        }

        if let Some(node) = self.nodes.get_mut(id) {
            let mut cx = FacadeContext::new(id, node.parent, &mut self.requests);
            node.facade.destroy(&mut cx);
            node.lifecycle = Lifecycle::Destroyed;
        }
        if let Some(node) = self.nodes.remove(id) {
            self.stats.destroyed += 1;
            self.notifications.push(Notification::Removed {
                id,
                kind: node.kind,
            });
            tracing::trace!(?id, kind = node.kind.name(), "facade destroyed");
        }
    }

    /// Destroy every facade, root included; the tree is empty afterwards
    pub fn destroy_all(&mut self) {
        let root = self.root;
        self.destroy_subtree(root);
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub fn add_event_listener<F>(&mut self, id: FacadeId, event_type: impl Into<String>, listener: F) -> Result<ListenerId>
    where
        F: Fn(&mut Event) + 'static,
    {
        let listener_id = ListenerId(self.next_listener_id);
        self.live_node_mut(id)?
            .listeners
            .add(listener_id, event_type.into(), std::rc::Rc::new(listener));
        self.next_listener_id += 1;
        Ok(listener_id)
    }

    pub fn remove_event_listener(&mut self, id: FacadeId, listener: ListenerId) -> Result<bool> {
        Ok(self.live_node_mut(id)?.listeners.remove(listener))
    }

    pub fn has_listener(&self, id: FacadeId, event_type: &str) -> bool {
        self.nodes
            .get(id)
            .is_some_and(|node| node.listeners.has_listener(event_type))
    }

    /// Deliver `event` to `target`, then bubble through its ancestors
    pub fn dispatch_event(&self, target: FacadeId, mut event: Event) -> Result<Event> {
        self.live_node(target)?;
        event.set_target(target);

        let mut current = Some(target);
        while let Some(id) = current {
            let Some(node) = self.nodes.get(id) else {
                break;
            };
            let listeners = node.listeners.for_type(&event.event_type);
            current = node.parent;

            event.set_current_target(id);
            for listener in listeners {
                (*listener)(&mut event);
            }
            if event.is_propagation_stopped() {
                break;
            }
        }
        Ok(event)
    }

    // =========================================================================
    // Frame plumbing
    // =========================================================================

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    pub fn drain_transition_requests(&mut self) -> Vec<TransitionRequest> {
        std::mem::take(&mut self.transition_requests)
    }

    pub fn take_requests(&mut self) -> FrameRequests {
        std::mem::take(&mut self.requests)
    }

    pub fn take_stats(&mut self) -> PassStats {
        std::mem::take(&mut self.stats)
    }

    /// Recompute world matrices below dirty transforms
    ///
    /// Returns the number of transforms pushed to the renderer.
    pub fn sync_transforms(&mut self, renderer: &mut dyn SceneRenderer) -> usize {
        let mut pushed = 0;
        let mut stack: Vec<(FacadeId, Mat4, bool)> = vec![(self.root, Mat4::IDENTITY, false)];

        while let Some((id, parent_world, parent_changed)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };
            let changed = parent_changed || node.matrix_dirty;
            if changed {
                match node.facade.object3d() {
                    Some(object) => {
                        node.world_matrix = parent_world * object.local_matrix();
                        renderer.set_transform(id, &node.world_matrix);
                        pushed += 1;
                    }
                    None => node.world_matrix = parent_world,
                }
                node.matrix_dirty = false;
            }
            let world = node.world_matrix;
            stack.extend(node.children.values().map(|child| (*child, world, changed)));
        }
        pushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ListTemplate;
    use crate::facade::{expect_f64, expect_str, ChangeCategory};
    use crate::object3d::OBJECT_3D;
    use crate::renderer::RecordingRenderer;
    use serde_json::json;
    use std::any::Any;
    use std::cell::RefCell;
    use std::rc::Rc;

    thread_local! {
        static LOG: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    }

    fn log(entry: String) {
        LOG.with(|log| log.borrow_mut().push(entry));
    }

    fn take_log() -> Vec<String> {
        LOG.with(|log| std::mem::take(&mut *log.borrow_mut()))
    }

    #[derive(Default)]
    struct Logged {
        label: String,
        value: f64,
    }

    impl Facade for Logged {
        fn set_property(&mut self, name: &str, value: &Value) -> std::result::Result<ChangeCategory, PropertyError> {
            match name {
                "label" => self.label = expect_str(value)?.to_string(),
                "value" => self.value = expect_f64(value)?,
                _ => return Err(PropertyError::Unknown),
            }
            Ok(ChangeCategory::visual())
        }

        fn property(&self, name: &str) -> Option<Value> {
            match name {
                "label" => Some(json!(self.label)),
                "value" => Some(json!(self.value)),
                _ => None,
            }
        }

        fn property_changed(&mut self, name: &str, _cx: &mut FacadeContext<'_>) {
            log(format!("changed {}.{name}", self.label));
        }

        fn after_update(&mut self, _cx: &mut FacadeContext<'_>) {
            log(format!("after {}", self.label));
        }

        fn destroy(&mut self, _cx: &mut FacadeContext<'_>) {
            log(format!("destroy {}", self.label));
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn construct_logged() -> Box<dyn Facade> {
        Box::<Logged>::default()
    }

    const LOGGED: FacadeKind = FacadeKind::new("Logged", construct_logged, &[]);

    fn logged(label: &str) -> Descriptor {
        Descriptor::new(LOGGED).key(label).prop("label", label)
    }

    fn scene() -> Children {
        Children::Many(vec![
            logged("a").children(vec![logged("a1"), logged("a2")]),
            logged("b").child(logged("b1")),
        ])
    }

    #[test]
    fn test_second_identical_pass_is_idempotent() {
        let mut tree = FacadeTree::default();
        let root = tree.root();
        tree.update_children(root, Some(&scene())).unwrap();
        assert_eq!(tree.take_stats(), PassStats { created: 5, destroyed: 0 });
        let first = tree.descendants(root);
        tree.drain_notifications();

        tree.update_children(root, Some(&scene())).unwrap();
        assert_eq!(tree.take_stats(), PassStats::default());
        assert_eq!(tree.descendants(root), first);
        assert!(tree.drain_notifications().is_empty());
    }

    #[test]
    fn test_children_complete_before_parent_after_update() {
        let mut tree = FacadeTree::default();
        let root = tree.root();
        take_log();
        tree.update_children(root, Some(&logged("p").child(logged("c")).into())).unwrap();
        let after: Vec<String> = take_log().into_iter().filter(|e| e.starts_with("after")).collect();
        assert_eq!(after, vec!["after c", "after p"]);
    }

    #[test]
    fn test_removed_keys_destroy_depth_first() {
        let mut tree = FacadeTree::default();
        let root = tree.root();
        tree.update_children(root, Some(&scene())).unwrap();
        take_log();

        tree.update_children(root, Some(&Children::from(vec![logged("b").child(logged("b1"))])))
            .unwrap();
        let destroyed: Vec<String> = take_log().into_iter().filter(|e| e.starts_with("destroy")).collect();
        assert_eq!(destroyed, vec!["destroy a1", "destroy a2", "destroy a"]);
        assert_eq!(tree.take_stats().destroyed, 3);
    }

    #[test]
    fn test_every_instance_destroyed_exactly_once() {
        let mut tree = FacadeTree::default();
        let root = tree.root();
        tree.update_children(root, Some(&scene())).unwrap();
        tree.update_children(root, Some(&Children::from(vec![logged("b")]))).unwrap();
        tree.update_children(root, None).unwrap();
        let stats = tree.take_stats();
        assert_eq!(stats.created, stats.destroyed);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_destroyed_facade_rejects_operations() {
        let mut tree = FacadeTree::default();
        let root = tree.root();
        tree.update_children(root, Some(&scene())).unwrap();
        let a = tree.child(root, &Key::from("a")).unwrap();

        tree.update_children(root, Some(&Children::from(vec![logged("b")]))).unwrap();
        assert_eq!(tree.lifecycle(a), Lifecycle::Destroyed);
        assert_eq!(tree.set_property(a, "label", &json!("zombie")), Err(FacadeError::Destroyed(a)));
        assert_eq!(
            tree.update_children(a, Some(&scene())),
            Err(FacadeError::Destroyed(a))
        );
        assert!(tree.dispatch_event(a, Event::new("click")).is_err());
        assert!(tree.add_event_listener(a, "click", |_| {}).is_err());

        // A new instance under the same key gets a fresh identity
        tree.update_children(root, Some(&scene())).unwrap();
        let again = tree.child(root, &Key::from("a")).unwrap();
        assert_ne!(again, a);
        assert_eq!(tree.lifecycle(a), Lifecycle::Destroyed);
    }

    #[test]
    fn test_list_preserves_identity_and_follows_data_order() {
        let list = |data: Vec<Value>| {
            Children::from(vec![Descriptor::list(
                ListTemplate::new(data, |item, _| {
                    Descriptor::new(LOGGED).prop("label", item["id"].clone())
                })
                .key(|item, _| Key::from(item["id"].as_str().unwrap_or_default())),
            )
            .key("list")])
        };

        let mut tree = FacadeTree::default();
        let root = tree.root();
        tree.update_children(root, Some(&list(vec![json!({"id": "a"}), json!({"id": "b"}), json!({"id": "c"})])))
            .unwrap();
        let list_id = tree.child(root, &Key::from("list")).unwrap();
        let before = tree.children(list_id);
        assert_eq!(before.len(), 3);
        take_log();

        tree.update_children(root, Some(&list(vec![json!({"id": "c"}), json!({"id": "a"})])))
            .unwrap();
        let after = tree.children(list_id);
        assert_eq!(after, vec![before[2], before[0]]);
        assert_eq!(tree.lifecycle(before[1]), Lifecycle::Destroyed);
        assert!(take_log().contains(&"destroy b".to_string()));
    }

    #[test]
    fn test_duplicate_keys_fail_before_mutation() {
        let mut tree = FacadeTree::default();
        let root = tree.root();
        let result = tree.update_children(root, Some(&Children::from(vec![logged("x"), logged("x")])));
        assert_eq!(
            result,
            Err(FacadeError::DuplicateKey {
                parent: root,
                key: Key::from("x")
            })
        );
        assert_eq!(tree.len(), 1);

        // Explicit key colliding with a positional key
        let mixed = Children::from(vec![Descriptor::new(LOGGED), Descriptor::new(LOGGED).key(0usize)]);
        assert!(matches!(
            tree.update_children(root, Some(&mixed)),
            Err(FacadeError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn test_missing_kind_fails_fast() {
        let mut tree = FacadeTree::default();
        let root = tree.root();
        let children = Children::from(vec![logged("ok"), Descriptor::default().key("nokind")]);
        assert_eq!(
            tree.update_children(root, Some(&children)),
            Err(FacadeError::MissingKind {
                parent: root,
                key: Key::from("nokind")
            })
        );
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_unknown_property_is_reported() {
        let mut tree = FacadeTree::default();
        let root = tree.root();
        let children = Children::from(logged("p").prop("colour", "red"));
        assert_eq!(
            tree.update_children(root, Some(&children)),
            Err(FacadeError::UnknownProperty {
                kind: "Logged",
                property: "colour".to_string()
            })
        );
        // The partially built child is still owned by the tree
        tree.update_children(root, None).unwrap();
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_kind_change_replaces_instance() {
        let mut tree = FacadeTree::default();
        let root = tree.root();
        tree.update_children(root, Some(&logged("n").into())).unwrap();
        let first = tree.child(root, &Key::from("n")).unwrap();

        tree.update_children(root, Some(&Descriptor::new(OBJECT_3D).key("n").into()))
            .unwrap();
        let second = tree.child(root, &Key::from("n")).unwrap();
        assert_ne!(first, second);
        assert_eq!(tree.kind(second), Some(OBJECT_3D));
        assert!(!tree.contains(first));
    }

    #[test]
    fn test_property_changed_hook_and_skip_unchanged() {
        let mut tree = FacadeTree::default();
        let root = tree.root();
        tree.update_children(root, Some(&logged("p").prop("value", 1).into())).unwrap();
        take_log();

        tree.update_children(root, Some(&logged("p").prop("value", 1.0).into())).unwrap();
        assert!(take_log().iter().all(|e| !e.starts_with("changed")));

        tree.update_children(root, Some(&logged("p").prop("value", 2).into())).unwrap();
        assert_eq!(
            take_log().into_iter().filter(|e| e.starts_with("changed")).collect::<Vec<_>>(),
            vec!["changed p.value"]
        );
    }

    #[test]
    fn test_identical_pass_keeps_values_written_since() {
        let desc = |y: f64| Children::from(Descriptor::new(OBJECT_3D).key("body").prop("y", y));
        let mut tree = FacadeTree::default();
        let root = tree.root();
        tree.update_children(root, Some(&desc(3.0))).unwrap();
        let id = tree.child(root, &Key::from("body")).unwrap();
        tree.update_object3d(id, |object| object.position.y = 2.5).unwrap();
        tree.drain_notifications();

        tree.update_children(root, Some(&desc(3.0))).unwrap();
        assert_eq!(tree.object3d(id).unwrap().position.y, 2.5);
        assert!(tree.drain_notifications().is_empty());

        // A new declared value still wins
        tree.update_children(root, Some(&desc(4.0))).unwrap();
        assert_eq!(tree.object3d(id).unwrap().position.y, 4.0);
        assert_eq!(tree.drain_notifications().len(), 1);
    }

    #[test]
    fn test_rejected_value_is_reported_on_every_pass() {
        let children = Children::from(logged("p").prop("value", "high"));
        let mut tree = FacadeTree::default();
        let root = tree.root();
        for _ in 0..2 {
            assert!(matches!(
                tree.update_children(root, Some(&children)),
                Err(FacadeError::InvalidProperty { .. })
            ));
        }
    }

    #[test]
    fn test_transitioned_property_files_request_on_change() {
        let spec = TransitionSpec::duration(200.0);
        let desc = |x: f64| Descriptor::new(OBJECT_3D).key("o").prop("x", x).transition("x", spec);

        let mut tree = FacadeTree::default();
        let root = tree.root();
        tree.update_children(root, Some(&desc(1.0).into())).unwrap();
        // Initial assignment is immediate
        assert!(tree.drain_transition_requests().is_empty());
        let id = tree.child(root, &Key::from("o")).unwrap();
        assert_eq!(tree.property(id, "x").unwrap(), Some(json!(1.0)));

        tree.update_children(root, Some(&desc(5.0).into())).unwrap();
        let requests = tree.drain_transition_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!((requests[0].from, requests[0].to), (1.0, 5.0));
        assert_eq!(tree.property(id, "x").unwrap(), Some(json!(1.0)));
    }

    #[test]
    fn test_events_bubble_until_stopped() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let record = |name: &'static str, stop: bool| {
            let seen = Rc::clone(&seen);
            move |event: &mut Event| {
                seen.borrow_mut().push(name);
                if stop {
                    event.stop_propagation();
                }
            }
        };

        let mut tree = FacadeTree::default();
        let root = tree.root();
        tree.add_event_listener(root, "click", record("root", false)).unwrap();
        let children = Children::from(
            logged("outer")
                .on("click", record("outer", false))
                .child(logged("inner").on("click", record("inner", false))),
        );
        tree.update_children(root, Some(&children)).unwrap();
        let outer = tree.child(root, &Key::from("outer")).unwrap();
        let inner = tree.child(outer, &Key::from("inner")).unwrap();

        let event = tree.dispatch_event(inner, Event::new("click")).unwrap();
        assert_eq!(*seen.borrow(), vec!["inner", "outer", "root"]);
        assert_eq!(event.target(), Some(inner));
        assert_eq!(event.current_target(), Some(root));

        seen.borrow_mut().clear();
        let stopping = Children::from(
            logged("outer")
                .on("click", record("outer", true))
                .child(logged("inner").on("click", record("inner", false))),
        );
        tree.update_children(root, Some(&stopping)).unwrap();
        tree.dispatch_event(inner, Event::new("click")).unwrap();
        assert_eq!(*seen.borrow(), vec!["inner", "outer"]);
    }

    #[test]
    fn test_programmatic_listener_removal() {
        let hits = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&hits);
        let mut tree = FacadeTree::default();
        let root = tree.root();
        let listener = tree
            .add_event_listener(root, "resize", move |_| *counter.borrow_mut() += 1)
            .unwrap();

        tree.dispatch_event(root, Event::new("resize")).unwrap();
        assert_eq!(tree.remove_event_listener(root, listener), Ok(true));
        assert_eq!(tree.remove_event_listener(root, listener), Ok(false));
        tree.dispatch_event(root, Event::new("resize")).unwrap();
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn test_world_matrices_compose_through_parents() {
        let mut tree = FacadeTree::default();
        let root = tree.root();
        let children = Children::from(
            Descriptor::new(OBJECT_3D)
                .key("parent")
                .prop("x", 1.0)
                .child(Descriptor::new(OBJECT_3D).key("child").prop("x", 2.0)),
        );
        tree.update_children(root, Some(&children)).unwrap();
        let parent = tree.child(root, &Key::from("parent")).unwrap();
        let child = tree.child(parent, &Key::from("child")).unwrap();

        let mut renderer = RecordingRenderer::new();
        assert_eq!(tree.sync_transforms(&mut renderer), 3);
        assert_eq!(tree.world_matrix(child).unwrap().translation().x, 3.0);

        // Clean transforms are not pushed again
        assert_eq!(tree.sync_transforms(&mut renderer), 0);

        tree.set_property(parent, "x", &json!(10.0)).unwrap();
        assert_eq!(tree.sync_transforms(&mut renderer), 2);
        assert_eq!(renderer.last_transform(child).unwrap().translation().x, 12.0);
    }

    #[test]
    fn test_capability_query_in_tree_order() {
        let mut tree = FacadeTree::default();
        let root = tree.root();
        let children = Children::from(vec![
            Descriptor::new(OBJECT_3D).key("a"),
            logged("p"),
            Descriptor::new(OBJECT_3D).key("b"),
        ]);
        tree.update_children(root, Some(&children)).unwrap();
        let found = tree.with_capability(crate::facade::TRANSFORM);
        assert_eq!(found.len(), 3);
        assert_eq!(found[0], root);
    }

    #[test]
    fn test_raw_id_round_trip() {
        let tree = FacadeTree::default();
        let root = tree.root();
        assert_eq!(FacadeId::from_raw(root.to_raw()), root);
    }
}
