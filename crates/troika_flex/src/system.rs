//! Frame system applying flex layout to facades
//!
//! After each update pass the system rebuilds the style tree of every flex
//! root whose subtree changed and asks the flex worker for a layout. Results
//! arrive on a later frame. A result is applied only if no newer request was
//! made since, and only to facades that still exist.
//!
//! Computed boxes are mapped into the parent's local space with the origin
//! at the parent's center and y pointing up.

use rustc_hash::FxHashSet;
use serde_json::json;
use troika_core::{
    FacadeError, FacadeId, FacadeTree, FrameSystem, Notification, Result, SystemContext,
};
use troika_worker::Thenable;

use crate::facade::{FlexNodeFacade, FLEX_NODE};
use crate::layout::{ComputedBox, LayoutResult};
use crate::module::request_layout;
use crate::style::StyleNode;

struct PendingLayout {
    generation: u64,
    root: FacadeId,
    result: Thenable<LayoutResult>,
}

#[derive(Default)]
pub struct FlexLayoutSystem {
    nodes: FxHashSet<FacadeId>,
    dirty: bool,
    generation: u64,
    pending: Vec<PendingLayout>,
}

impl FlexLayoutSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation of the most recent layout request
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn tracked(&self) -> usize {
        self.nodes.len()
    }

    fn is_flex_root(tree: &FacadeTree, id: FacadeId) -> bool {
        tree.parent(id)
            .map_or(true, |parent| !tree.has_capability(parent, FLEX_NODE))
    }

    fn style_tree(tree: &FacadeTree, id: FacadeId, fonts: &mut Vec<String>) -> Result<StyleNode> {
        let facade = tree
            .get::<FlexNodeFacade>(id)
            .ok_or(FacadeError::Destroyed(id))?;
        if let Some(font) = facade.font() {
            if !fonts.iter().any(|loaded| loaded == font) {
                fonts.push(font.to_string());
            }
        }

        let mut children = Vec::new();
        for child in tree.children(id) {
            if tree.has_capability(child, FLEX_NODE) {
                children.push(Self::style_tree(tree, child, fonts)?);
            }
        }
        facade
            .style_node(id.to_raw().to_string(), children)
            .map_err(|error| FacadeError::InvalidDescriptor(error.to_string()))
    }

    fn request(&mut self, cx: &mut SystemContext<'_>) -> Result<()> {
        let mut roots: Vec<FacadeId> = self
            .nodes
            .iter()
            .copied()
            .filter(|id| cx.tree.contains(*id) && Self::is_flex_root(cx.tree, *id))
            .collect();
        roots.sort_by_key(|id| id.to_raw());

        self.generation += 1;
        for root in roots {
            let mut fonts = Vec::new();
            let style = Self::style_tree(cx.tree, root, &mut fonts)?;
            tracing::debug!(?root, generation = self.generation, "flex layout requested");
            self.pending.push(PendingLayout {
                generation: self.generation,
                root,
                result: request_layout(cx.registry, style, fonts),
            });
        }
        Ok(())
    }

    fn apply(tree: &mut FacadeTree, root: FacadeId, layout: &LayoutResult) -> Result<usize> {
        let mut applied = 0;
        for (raw, computed) in layout.iter() {
            let Ok(raw) = raw.parse::<u64>() else {
                continue;
            };
            let id = FacadeId::from_raw(raw);
            if !tree.contains(id) {
                continue;
            }
            let Some(facade) = tree.get_mut::<FlexNodeFacade>(id) else {
                continue;
            };
            facade.set_computed(*computed);
            applied += 1;

            if id == root {
                continue;
            }
            let Some(parent) = tree
                .parent(id)
                .and_then(|parent| layout.get(&parent.to_raw().to_string()))
                .copied()
            else {
                continue;
            };
            let (x, y) = local_offset(computed, &parent);
            tree.set_property(id, "x", &json!(x))?;
            tree.set_property(id, "y", &json!(y))?;
        }
        Ok(applied)
    }
}

/// Center of `computed` relative to the center of its parent box, y up
fn local_offset(computed: &ComputedBox, parent: &ComputedBox) -> (f64, f64) {
    let x = computed.left + computed.width / 2.0 - parent.width / 2.0;
    let y = parent.height / 2.0 - computed.top - computed.height / 2.0;
    (x, y)
}

impl FrameSystem for FlexLayoutSystem {
    fn name(&self) -> &'static str {
        "flex_layout"
    }

    fn on_notification(&mut self, _tree: &FacadeTree, notification: &Notification) {
        match notification {
            Notification::Created { id, kind, .. } if kind.has_capability(FLEX_NODE) => {
                self.nodes.insert(*id);
                self.dirty = true;
            }
            Notification::PropertyChanged { id, name, .. }
                if self.nodes.contains(id) && FlexNodeFacade::is_style_property(name) =>
            {
                self.dirty = true;
            }
            Notification::Removed { id, .. } => {
                if self.nodes.remove(id) {
                    self.dirty = true;
                }
            }
            _ => {}
        }
    }

    fn run(&mut self, cx: &mut SystemContext<'_>) -> Result<()> {
        // Anything requested before a pending change is already stale
        let current = (!self.dirty).then_some(self.generation);
        let mut waiting = Vec::with_capacity(self.pending.len());
        for pending in std::mem::take(&mut self.pending) {
            match pending.result.try_result() {
                None => waiting.push(pending),
                Some(_) if current != Some(pending.generation) => {
                    tracing::debug!(root = ?pending.root, generation = pending.generation, "discarding stale layout");
                }
                Some(Ok(layout)) => {
                    let applied = Self::apply(cx.tree, pending.root, &layout)?;
                    tracing::trace!(root = ?pending.root, applied, "flex layout applied");
                }
                Some(Err(error)) => {
                    tracing::warn!(root = ?pending.root, %error, "flex layout failed");
                }
            }
        }
        self.pending = waiting;

        if self.dirty {
            self.dirty = false;
            self.request(cx)?;
        }
        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.dirty || !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::FLEX_BOX;
    use troika_core::{Descriptor, Key, RecordingRenderer, TroikaConfig, World, GROUP};
    use troika_worker::RegistryConfig;

    fn world() -> World<RecordingRenderer> {
        let config = TroikaConfig {
            worker: RegistryConfig::main_thread(),
            ..TroikaConfig::default()
        };
        let mut world = World::new(&config, RecordingRenderer::new());
        world.add_system(FlexLayoutSystem::new());
        world
    }

    fn child_of(world: &World<RecordingRenderer>, parent: FacadeId, key: &str) -> FacadeId {
        world.tree().child(parent, &Key::from(key)).unwrap()
    }

    fn computed(world: &World<RecordingRenderer>, id: FacadeId) -> Option<ComputedBox> {
        world.tree().get::<FlexNodeFacade>(id).unwrap().computed()
    }

    #[test]
    fn test_centered_child_is_laid_out() {
        let mut world = world();
        world.set_scene(
            Descriptor::new(FLEX_BOX)
                .key("root")
                .prop("width", 100)
                .prop("height", 100)
                .prop("alignItems", "center")
                .prop("justifyContent", "center")
                .child(
                    Descriptor::new(FLEX_BOX)
                        .key("child")
                        .prop("width", "50%")
                        .prop("height", "50%"),
                ),
        );

        let first = world.tick(0.0).unwrap();
        assert!(first.needs_another_frame);
        let root = child_of(&world, world.root(), "root");
        let child = child_of(&world, root, "child");
        assert_eq!(computed(&world, child), None);

        world.tick(16.0).unwrap();
        assert_eq!(
            computed(&world, child),
            Some(ComputedBox {
                left: 25.0,
                top: 25.0,
                width: 50.0,
                height: 50.0
            })
        );
        assert_eq!(world.tree().property(child, "computedWidth").unwrap(), Some(json!(50.0)));

        let idle = world.tick(32.0).unwrap();
        assert!(!idle.needs_another_frame);
    }

    #[test]
    fn test_children_are_positioned_from_parent_center() {
        let mut world = world();
        world.set_scene(
            Descriptor::new(FLEX_BOX)
                .key("row")
                .prop("width", 100)
                .prop("height", 10)
                .child(Descriptor::new(FLEX_BOX).key("a").prop("width", 20).prop("height", 10))
                .child(Descriptor::new(FLEX_BOX).key("b").prop("width", 20).prop("height", 10)),
        );
        world.tick(0.0).unwrap();
        world.tick(16.0).unwrap();

        let row = child_of(&world, world.root(), "row");
        let a = child_of(&world, row, "a");
        let b = child_of(&world, row, "b");
        assert_eq!(world.tree().property(a, "x").unwrap(), Some(json!(-40.0)));
        assert_eq!(world.tree().property(b, "x").unwrap(), Some(json!(-20.0)));
        assert_eq!(world.tree().property(b, "y").unwrap(), Some(json!(0.0)));
        // Roots keep their own position
        assert_eq!(world.tree().property(row, "x").unwrap(), Some(json!(0.0)));
    }

    #[test]
    fn test_stale_layout_is_discarded() {
        let mut world = world();
        let root = Descriptor::new(FLEX_BOX)
            .key("root")
            .prop("width", 10)
            .prop("height", 10);
        world.set_scene(root.clone());
        world.tick(0.0).unwrap();
        let id = child_of(&world, world.root(), "root");

        // Changing style before the first result lands supersedes it
        world.set_scene(root.prop("width", 30));
        world.tick(16.0).unwrap();
        assert_eq!(computed(&world, id), None);

        world.tick(32.0).unwrap();
        assert_eq!(computed(&world, id).map(|computed| computed.width), Some(30.0));
    }

    #[test]
    fn test_removed_facades_are_untracked() {
        let mut world = world();
        world.set_scene(
            Descriptor::new(GROUP)
                .key("group")
                .child(Descriptor::new(FLEX_BOX).key("a").prop("width", 5)),
        );
        world.tick(0.0).unwrap();

        world.set_scene(Descriptor::new(GROUP).key("group"));
        world.tick(16.0).unwrap();
        world.tick(32.0).unwrap();
        assert!(!world.tick(48.0).unwrap().needs_another_frame);
    }

    #[test]
    fn test_local_offset() {
        let parent = ComputedBox {
            left: 0.0,
            top: 0.0,
            width: 100.0,
            height: 50.0,
        };
        let child = ComputedBox {
            left: 0.0,
            top: 0.0,
            width: 10.0,
            height: 10.0,
        };
        assert_eq!(local_offset(&child, &parent), (-45.0, 20.0));
    }
}
