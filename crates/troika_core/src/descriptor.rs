//! Facade descriptors
//!
//! A [`Descriptor`] is a transient value describing the desired state of one
//! node for one reconciliation pass: which facade kind to use, the node's key
//! among its siblings, property values, children, event listeners and
//! property transitions. Descriptors are rebuilt every pass; the facade tree
//! is the source of truth.
//!
//! # Example
//!
//! ```rust
//! use troika_core::{Descriptor, GROUP, OBJECT_3D};
//!
//! let scene = Descriptor::new(GROUP)
//!     .key("rig")
//!     .prop("y", 2.0)
//!     .children(vec![
//!         Descriptor::new(OBJECT_3D).key("left").prop("x", -1.0),
//!         Descriptor::new(OBJECT_3D).key("right").prop("x", 1.0),
//!     ]);
//! assert_eq!(scene.props.len(), 1);
//! ```

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;
use smallvec::SmallVec;

use crate::events::{Event, Listener};
use crate::facade::FacadeKind;
use crate::list::LIST;
use crate::transition::TransitionSpec;

/// Identity of a child among its siblings
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Str(String),
    /// Position in the descriptor array, used when no key is given
    Index(usize),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(key) => f.write_str(key),
            Key::Index(index) => write!(f, "#{index}"),
        }
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Key::Str(key.to_string())
    }
}

impl From<String> for Key {
    fn from(key: String) -> Self {
        Key::Str(key)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

/// Children of a descriptor
#[derive(Clone, Debug)]
pub enum Children {
    One(Box<Descriptor>),
    Many(Vec<Descriptor>),
}

impl Children {
    pub fn len(&self) -> usize {
        match self {
            Children::One(_) => 1,
            Children::Many(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Descriptor> {
        match self {
            Children::One(one) => std::slice::from_ref(&**one).iter(),
            Children::Many(list) => list.iter(),
        }
    }
}

impl From<Descriptor> for Children {
    fn from(descriptor: Descriptor) -> Self {
        Children::One(Box::new(descriptor))
    }
}

impl From<Vec<Descriptor>> for Children {
    fn from(list: Vec<Descriptor>) -> Self {
        Children::Many(list)
    }
}

pub type TemplateFn = Rc<dyn Fn(&Value, usize) -> Descriptor>;
pub type KeyFn = Rc<dyn Fn(&Value, usize) -> Key>;

/// A data array expanded into one child descriptor per element
#[derive(Clone)]
pub struct ListTemplate {
    pub data: Vec<Value>,
    template: TemplateFn,
    key_fn: Option<KeyFn>,
}

impl fmt::Debug for ListTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListTemplate")
            .field("data", &self.data)
            .field("keyed", &self.key_fn.is_some())
            .finish()
    }
}

impl ListTemplate {
    pub fn new<F>(data: Vec<Value>, template: F) -> Self
    where
        F: Fn(&Value, usize) -> Descriptor + 'static,
    {
        Self {
            data,
            template: Rc::new(template),
            key_fn: None,
        }
    }

    /// Key each element; defaults to its index
    pub fn key<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&Value, usize) -> Key + 'static,
    {
        self.key_fn = Some(Rc::new(key_fn));
        self
    }

    /// One descriptor per element, keyed by the extractor
    pub fn expand(&self) -> Vec<Descriptor> {
        self.data
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let mut descriptor = (self.template)(item, index);
                descriptor.key = Some(match &self.key_fn {
                    Some(key_fn) => key_fn(item, index),
                    None => Key::Index(index),
                });
                descriptor
            })
            .collect()
    }
}

/// Desired state of one facade for one pass
#[derive(Clone, Default)]
pub struct Descriptor {
    pub kind: Option<FacadeKind>,
    pub key: Option<Key>,
    pub props: IndexMap<String, Value>,
    pub children: Option<Children>,
    pub list: Option<ListTemplate>,
    pub listeners: SmallVec<[(String, Listener); 2]>,
    pub transitions: IndexMap<String, TransitionSpec>,
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("kind", &self.kind.map(|kind| kind.name()))
            .field("key", &self.key)
            .field("props", &self.props)
            .field("children", &self.children)
            .field("list", &self.list)
            .field("listeners", &self.listeners.len())
            .field("transitions", &self.transitions)
            .finish()
    }
}

impl Descriptor {
    pub fn new(kind: FacadeKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// A list node expanding `template` over its data
    pub fn list(template: ListTemplate) -> Self {
        Self {
            kind: Some(LIST),
            list: Some(template),
            ..Self::default()
        }
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    pub fn child(mut self, child: Descriptor) -> Self {
        self.children = match self.children.take() {
            None => Some(Children::One(Box::new(child))),
            Some(Children::One(first)) => Some(Children::Many(vec![*first, child])),
            Some(Children::Many(mut list)) => {
                list.push(child);
                Some(Children::Many(list))
            }
        };
        self
    }

    pub fn children(mut self, children: impl Into<Children>) -> Self {
        self.children = Some(children.into());
        self
    }

    /// Listen for `event_type` on this facade (or bubbling from below)
    pub fn on<F>(mut self, event_type: impl Into<String>, listener: F) -> Self
    where
        F: Fn(&mut Event) + 'static,
    {
        self.listeners.push((event_type.into(), Rc::new(listener)));
        self
    }

    /// Animate changes of a numeric property
    pub fn transition(mut self, property: impl Into<String>, spec: TransitionSpec) -> Self {
        self.transitions.insert(property.into(), spec);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object3d::OBJECT_3D;
    use serde_json::json;

    #[test]
    fn test_child_builder_grows_list() {
        let d = Descriptor::new(OBJECT_3D)
            .child(Descriptor::new(OBJECT_3D).key("a"))
            .child(Descriptor::new(OBJECT_3D).key("b"));
        let keys: Vec<_> = d
            .children
            .as_ref()
            .unwrap()
            .iter()
            .map(|c| c.key.clone().unwrap())
            .collect();
        assert_eq!(keys, vec![Key::from("a"), Key::from("b")]);
    }

    #[test]
    fn test_list_expansion_uses_key_extractor() {
        let template = ListTemplate::new(vec![json!({"id": "a"}), json!({"id": "b"})], |_, index| {
            Descriptor::new(OBJECT_3D).prop("x", index as f64)
        })
        .key(|item, _| Key::from(item["id"].as_str().unwrap_or_default()));

        let expanded = template.expand();
        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0].key, Some(Key::from("a")));
        assert_eq!(expanded[1].key, Some(Key::from("b")));
    }

    #[test]
    fn test_list_defaults_to_index_keys() {
        let template = ListTemplate::new(vec![json!(1), json!(2)], |_, _| Descriptor::new(OBJECT_3D));
        let keys: Vec<_> = template.expand().into_iter().map(|d| d.key).collect();
        assert_eq!(keys, vec![Some(Key::Index(0)), Some(Key::Index(1))]);
    }
}
