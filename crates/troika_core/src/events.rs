//! Facade events
//!
//! Listeners are registered per facade and event type, either from
//! descriptors (replaced on every pass) or programmatically (kept until
//! removed). Dispatch starts at the target and bubbles up through parent
//! links until a listener calls [`Event::stop_propagation`]. All listeners
//! of the node where propagation stops still run.

use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde_json::Value;
use smallvec::SmallVec;

use crate::tree::FacadeId;

/// Well-known event types
pub mod event_types {
    pub const CLICK: &str = "click";
    pub const POINTER_DOWN: &str = "pointerdown";
    pub const POINTER_UP: &str = "pointerup";
    pub const POINTER_MOVE: &str = "pointermove";
    pub const RESIZE: &str = "resize";
    /// Raised by the physics bridge when two bodies touch
    pub const COLLISION: &str = "collision";
}

/// Event listener callback
///
/// Uses Rc since the scene is single-threaded.
pub type Listener = Rc<dyn Fn(&mut Event)>;

/// An event travelling through the facade tree
#[derive(Clone)]
pub struct Event {
    pub event_type: String,
    pub data: Value,
    target: Option<FacadeId>,
    current_target: Option<FacadeId>,
    propagation_stopped: bool,
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("event_type", &self.event_type)
            .field("target", &self.target)
            .field("current_target", &self.current_target)
            .field("propagation_stopped", &self.propagation_stopped)
            .finish()
    }
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: Value::Null,
            target: None,
            current_target: None,
            propagation_stopped: false,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Facade the event was dispatched to
    pub fn target(&self) -> Option<FacadeId> {
        self.target
    }

    /// Facade whose listeners are currently running
    pub fn current_target(&self) -> Option<FacadeId> {
        self.current_target
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    pub(crate) fn set_target(&mut self, target: FacadeId) {
        self.target = Some(target);
    }

    pub(crate) fn set_current_target(&mut self, current: FacadeId) {
        self.current_target = Some(current);
    }
}

/// Handle for removing a programmatically added listener
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// Listeners attached to one facade
#[derive(Default, Clone)]
pub struct Listeners {
    declared: FxHashMap<String, SmallVec<[Listener; 2]>>,
    added: FxHashMap<String, SmallVec<[(ListenerId, Listener); 2]>>,
}

impl Listeners {
    pub fn is_empty(&self) -> bool {
        self.declared.is_empty() && self.added.is_empty()
    }

    /// Replace the descriptor-declared listeners
    pub(crate) fn set_declared(&mut self, listeners: &[(String, Listener)]) {
        self.declared.clear();
        for (event_type, listener) in listeners {
            self.declared
                .entry(event_type.clone())
                .or_default()
                .push(Rc::clone(listener));
        }
    }

    pub(crate) fn add(&mut self, id: ListenerId, event_type: String, listener: Listener) {
        self.added.entry(event_type).or_default().push((id, listener));
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let mut removed = false;
        self.added.retain(|_, list| {
            let before = list.len();
            list.retain(|(listener_id, _)| *listener_id != id);
            removed |= list.len() != before;
            !list.is_empty()
        });
        removed
    }

    pub fn has_listener(&self, event_type: &str) -> bool {
        self.declared.contains_key(event_type) || self.added.contains_key(event_type)
    }

    /// Snapshot of the listeners for `event_type`, declared ones first
    pub(crate) fn for_type(&self, event_type: &str) -> SmallVec<[Listener; 4]> {
        let mut out = SmallVec::new();
        if let Some(list) = self.declared.get(event_type) {
            out.extend(list.iter().cloned());
        }
        if let Some(list) = self.added.get(event_type) {
            out.extend(list.iter().map(|(_, listener)| Rc::clone(listener)));
        }
        out
    }
}
