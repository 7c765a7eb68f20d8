//! The frame loop
//!
//! [`World`] owns the facade tree, the tween runner and a worker registry
//! handle, and drives them from the host's animation frame callback:
//!
//! ```text
//! tick(now)
//!   1. advance tweens            (Runner::tick)
//!   2. apply animated writes     (transition output → set_property)
//!   3. deliver worker responses  (WorkerRegistry::pump)
//!   4. reconcile                 (only when an update was requested)
//!   5. run frame systems         (flex layout, physics, ...)
//!   6. sync world matrices       (dirty transforms → renderer)
//!   7. render                    (when anything changed)
//! ```
//!
//! `tick` takes `&mut self`, so a frame can never start while another is in
//! progress. It never blocks on worker requests; systems poll their
//! thenables and apply results on whichever frame they arrive.

use std::fmt;

use serde_json::Value;
use troika_animation::Runner;
use troika_worker::WorkerRegistry;

use crate::config::TroikaConfig;
use crate::descriptor::Children;
use crate::error::{FacadeError, Result};
use crate::events::Event;
use crate::object3d::TRANSFORM_PROPERTIES;
use crate::renderer::SceneRenderer;
use crate::transition::Transitions;
use crate::tree::{FacadeId, FacadeTree, Notification};

// =============================================================================
// Scheduling
// =============================================================================

/// Tracks which kinds of frame work have been requested
#[derive(Clone, Debug, Default)]
pub struct FrameScheduler {
    update_requested: bool,
    render_requested: bool,
    continuous_render: bool,
    frame_count: u64,
}

impl FrameScheduler {
    pub fn new(continuous_render: bool) -> Self {
        Self {
            // First frame always reconciles
            update_requested: true,
            render_requested: true,
            continuous_render,
            frame_count: 0,
        }
    }

    pub fn request_update(&mut self) {
        self.update_requested = true;
    }

    pub fn request_render(&mut self) {
        self.render_requested = true;
    }

    pub fn set_continuous_render(&mut self, continuous: bool) {
        self.continuous_render = continuous;
    }

    pub fn continuous_render(&self) -> bool {
        self.continuous_render
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn has_pending_work(&self) -> bool {
        self.update_requested || self.render_requested || self.continuous_render
    }

    fn take_update(&mut self) -> bool {
        std::mem::take(&mut self.update_requested)
    }

    fn take_render(&mut self) -> bool {
        std::mem::take(&mut self.render_requested) || self.continuous_render
    }
}

// =============================================================================
// Systems
// =============================================================================

/// What a frame system can reach while it runs
pub struct SystemContext<'a> {
    pub tree: &'a mut FacadeTree,
    pub registry: &'a WorkerRegistry,
    /// Frame timestamp in milliseconds
    pub now: f64,
}

/// Work that runs once per frame after reconciliation
///
/// Systems see every lifecycle notification before they run, so they can
/// track the facades carrying the capability they care about.
pub trait FrameSystem {
    fn name(&self) -> &'static str;

    fn on_notification(&mut self, _tree: &FacadeTree, _notification: &Notification) {}

    fn run(&mut self, cx: &mut SystemContext<'_>) -> Result<()>;

    /// True while the system waits on worker results or has work queued
    fn is_busy(&self) -> bool {
        false
    }
}

// =============================================================================
// World
// =============================================================================

enum SceneSource {
    Empty,
    Static(Children),
    Builder(Box<dyn FnMut() -> Children>),
}

/// Result of one [`World::tick`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameOutcome {
    pub reconciled: bool,
    pub rendered: bool,
    /// Tweens, worker requests or requested work remain
    pub needs_another_frame: bool,
}

/// A scene: facade tree, animations, workers and a renderer
pub struct World<R: SceneRenderer> {
    tree: FacadeTree,
    runner: Runner,
    transitions: Transitions,
    registry: WorkerRegistry,
    renderer: R,
    systems: Vec<Box<dyn FrameSystem>>,
    scene: SceneSource,
    scheduler: FrameScheduler,
}

impl<R: SceneRenderer> fmt::Debug for World<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("tree", &self.tree)
            .field("transitions", &self.transitions)
            .field("systems", &self.systems.len())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl<R: SceneRenderer> World<R> {
    pub fn new(config: &TroikaConfig, renderer: R) -> Self {
        Self::with_registry(config, WorkerRegistry::new(config.worker.clone()), renderer)
    }

    /// Share an existing registry (and its worker threads)
    pub fn with_registry(config: &TroikaConfig, registry: WorkerRegistry, renderer: R) -> Self {
        Self {
            tree: FacadeTree::default(),
            runner: Runner::new(),
            transitions: Transitions::new(),
            registry,
            renderer,
            systems: Vec::new(),
            scene: SceneSource::Empty,
            scheduler: FrameScheduler::new(config.frame.continuous_render),
        }
    }

    pub fn tree(&self) -> &FacadeTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut FacadeTree {
        &mut self.tree
    }

    pub fn root(&self) -> FacadeId {
        self.tree.root()
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn runner_mut(&mut self) -> &mut Runner {
        &mut self.runner
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn add_system(&mut self, system: impl FrameSystem + 'static) {
        tracing::debug!(system = system.name(), "frame system added");
        self.systems.push(Box::new(system));
    }

    /// Replace the scene with fixed children of the root
    pub fn set_scene(&mut self, children: impl Into<Children>) {
        self.scene = SceneSource::Static(children.into());
        self.scheduler.request_update();
    }

    /// Rebuild the root's children from `builder` on every update pass
    pub fn set_scene_builder<F>(&mut self, builder: F)
    where
        F: FnMut() -> Children + 'static,
    {
        self.scene = SceneSource::Builder(Box::new(builder));
        self.scheduler.request_update();
    }

    pub fn request_update(&mut self) {
        self.scheduler.request_update();
    }

    pub fn request_render(&mut self) {
        self.scheduler.request_render();
    }

    pub fn set_continuous_render(&mut self, continuous: bool) {
        self.scheduler.set_continuous_render(continuous);
    }

    /// Dispatch to a facade, bubbling to the root
    pub fn dispatch_event(&mut self, target: FacadeId, event: Event) -> Result<Event> {
        let event = self.tree.dispatch_event(target, event)?;
        self.absorb_tree_requests();
        Ok(event)
    }

    /// Dispatch a pointer-style event at a viewport position
    ///
    /// The target is the deepest facade the renderer hits, or the root.
    pub fn dispatch_world_event(&mut self, event: Event, x: f64, y: f64) -> Result<Event> {
        let target = self
            .renderer
            .hit_test(x, y)
            .filter(|id| self.tree.contains(*id))
            .unwrap_or_else(|| self.tree.root());
        self.dispatch_event(target, event)
    }

    /// Run one frame at `now` milliseconds
    pub fn tick(&mut self, now: f64) -> Result<FrameOutcome> {
        let mut outcome = FrameOutcome::default();
        let mut dirty = false;

        // 1-2. Animations
        self.runner.tick(now);
        for write in self.transitions.drain_writes() {
            match self
                .tree
                .set_property(write.id, &write.property, &Value::from(write.value))
            {
                Ok(()) => dirty = true,
                Err(FacadeError::Destroyed(id)) => {
                    tracing::trace!(?id, "dropping animated write for destroyed facade");
                }
                Err(error) => return Err(error),
            }
        }
        self.transitions.sweep(&self.runner);

        // 3. Worker responses; thenable callbacks run here
        self.registry.pump();

        // 4. Reconcile
        self.absorb_tree_requests();
        if self.scheduler.take_update() {
            let children = match &mut self.scene {
                SceneSource::Empty => None,
                SceneSource::Static(children) => Some(children.clone()),
                SceneSource::Builder(builder) => Some(builder()),
            };
            let root = self.tree.root();
            self.tree.update_children(root, children.as_ref())?;
            for request in self.tree.drain_transition_requests() {
                self.transitions.request(&mut self.runner, request);
            }
            let stats = self.tree.take_stats();
            tracing::debug!(
                frame = self.scheduler.frame_count,
                created = stats.created,
                destroyed = stats.destroyed,
                "update pass"
            );
            outcome.reconciled = true;
            dirty = true;
        }
        dirty |= self.flush_notifications();

        // 5. Systems
        for system in &mut self.systems {
            let mut cx = SystemContext {
                tree: &mut self.tree,
                registry: &self.registry,
                now,
            };
            system.run(&mut cx).map_err(|error| match error {
                FacadeError::System { .. } => error,
                other => FacadeError::System {
                    system: system.name(),
                    message: other.to_string(),
                },
            })?;
        }
        dirty |= self.flush_notifications();

        // 6-7. Render
        let pushed = self.tree.sync_transforms(&mut self.renderer);
        dirty |= pushed > 0;
        let requests = self.tree.take_requests();
        if requests.update {
            self.scheduler.request_update();
        }
        if self.scheduler.take_render() || requests.render || dirty {
            self.renderer.render();
            outcome.rendered = true;
        }

        self.scheduler.frame_count += 1;
        outcome.needs_another_frame = self.scheduler.has_pending_work()
            || !self.runner.is_idle()
            || self.registry.pending_count() > 0
            || self.systems.iter().any(|system| system.is_busy());
        Ok(outcome)
    }

    /// Destroy every facade and shut down the workers
    pub fn shutdown(&mut self) {
        self.tree.destroy_all();
        self.flush_notifications();
        self.runner.stop_all();
        self.registry.terminate();
    }

    fn absorb_tree_requests(&mut self) {
        let requests = self.tree.take_requests();
        if requests.update {
            self.scheduler.request_update();
        }
        if requests.render {
            self.scheduler.request_render();
        }
    }

    /// Mirror lifecycle changes into the renderer and systems
    fn flush_notifications(&mut self) -> bool {
        let notifications = self.tree.drain_notifications();
        for notification in &notifications {
            match notification {
                Notification::Created { id, parent, kind } => {
                    self.renderer.create_node(*id, *parent, *kind);
                }
                Notification::Removed { id, .. } => {
                    self.transitions.forget(&mut self.runner, *id);
                    self.renderer.remove_node(*id);
                }
                Notification::PropertyChanged { id, name, value } => {
                    if name == "visible" {
                        self.renderer.set_visible(*id, value.as_bool().unwrap_or(true));
                    } else if !TRANSFORM_PROPERTIES.contains(&name.as_str()) {
                        self.renderer.set_property(*id, name, value);
                    }
                }
            }
            for system in &mut self.systems {
                system.on_notification(&self.tree, notification);
            }
        }
        !notifications.is_empty()
    }
}
