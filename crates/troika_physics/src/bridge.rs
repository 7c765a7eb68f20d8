//! Frame system connecting physics facades to the physics world
//!
//! Lifecycle notifications of [`PHYSICS_BODY`] facades become protocol
//! messages, sent once per frame in a fixed order: removals, rebuilds,
//! additions, batched updates, activation changes, then the step. Only one
//! step is outstanding at a time; wall time that passes meanwhile is carried
//! into the next step.
//!
//! Step results are applied on the frame they arrive. Transforms go straight
//! into each facade's [`Object3D`](troika_core::Object3D) without property
//! notifications, so they are never echoed back to the world. Results for
//! facades destroyed in the meantime are dropped.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde_json::json;
use troika_core::{
    event_types, Event, FacadeId, FacadeTree, FrameSystem, Notification, PhysicsConfig, Quat,
    Result, SystemContext, Vec3,
};
use troika_worker::{Outcome, Thenable, WorkerRegistry};

use crate::facade::{PhysicsObjectFacade, LIVE_PROPERTIES, PHYSICS_BODY};
use crate::module::send;
use crate::protocol::{
    ActivationState, BodyUpdate, CollisionContact, PhysicsRequest, PhysicsResponse,
    SimulationConfig, StepReport,
};

/// Longest wall time handed to a single step, in seconds
pub const MAX_STEP_DELTA: f64 = 0.25;

pub struct PhysicsBridgeSystem {
    config: SimulationConfig,
    initialized: bool,
    tracked: FxHashSet<FacadeId>,
    added: Vec<FacadeId>,
    rebuilt: Vec<FacadeId>,
    removed: Vec<u64>,
    updates: IndexMap<FacadeId, BodyUpdate>,
    activations: IndexMap<FacadeId, ActivationState>,
    last_frame: Option<f64>,
    /// Seconds not yet handed to the world
    unsimulated: f64,
    step: Option<Thenable<PhysicsResponse>>,
}

impl PhysicsBridgeSystem {
    pub fn new(config: &PhysicsConfig) -> Self {
        Self {
            config: SimulationConfig::from(config),
            initialized: false,
            tracked: FxHashSet::default(),
            added: Vec::new(),
            rebuilt: Vec::new(),
            removed: Vec::new(),
            updates: IndexMap::new(),
            activations: IndexMap::new(),
            last_frame: None,
            unsimulated: 0.0,
            step: None,
        }
    }

    /// Number of physics facades currently simulated or about to be
    pub fn body_count(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_stepping(&self) -> bool {
        self.step.is_some()
    }

    fn property_changed(&mut self, tree: &FacadeTree, id: FacadeId, name: &str) {
        if self.added.contains(&id) {
            // Read in full when the body is added
            return;
        }
        let Some(facade) = tree.get::<PhysicsObjectFacade>(id) else {
            return;
        };

        match name {
            "x" | "y" | "z" | "rotate_x" | "rotate_y" | "rotate_z" | "rotate_order" | "quaternion" => {
                let update = self
                    .updates
                    .entry(id)
                    .or_insert_with(|| BodyUpdate::new(id.to_raw()));
                update.position = Some(facade.object.position.to_array());
                update.quaternion = Some(facade.object.orientation().to_array());
            }
            "activation" => {
                self.activations.insert(id, facade.activation());
            }
            name if LIVE_PROPERTIES.contains(&name) => {
                let desc = facade.body_desc();
                let update = self
                    .updates
                    .entry(id)
                    .or_insert_with(|| BodyUpdate::new(id.to_raw()));
                update.velocity = Some(desc.velocity);
                update.angular_velocity = Some(desc.angular_velocity);
            }
            name if PhysicsObjectFacade::is_physics_property(name) => {
                if !self.rebuilt.contains(&id) {
                    self.rebuilt.push(id);
                }
            }
            _ => {}
        }
    }

    fn send_ack(registry: &WorkerRegistry, request: PhysicsRequest) {
        let method = request_name(&request);
        send(registry, &request).on_settled(move |outcome: Outcome<PhysicsResponse>| {
            if let Err(error) = outcome {
                tracing::warn!(method, %error, "physics request failed");
            }
        });
    }

    fn flush_requests(&mut self, tree: &FacadeTree, registry: &WorkerRegistry) {
        if !self.initialized {
            Self::send_ack(registry, PhysicsRequest::Init(self.config));
            self.initialized = true;
        }

        for id in self.removed.drain(..) {
            Self::send_ack(registry, PhysicsRequest::RemoveRigidBody { id });
        }

        let rebuilt = std::mem::take(&mut self.rebuilt);
        for id in &rebuilt {
            Self::send_ack(registry, PhysicsRequest::RemoveRigidBody { id: id.to_raw() });
        }
        for id in rebuilt.into_iter().chain(self.added.drain(..)) {
            let Some(facade) = tree.get::<PhysicsObjectFacade>(id) else {
                continue;
            };
            Self::send_ack(
                registry,
                PhysicsRequest::AddRigidBody {
                    id: id.to_raw(),
                    body: facade.body_desc(),
                },
            );
            if facade.activation() != ActivationState::Active {
                self.activations.insert(id, facade.activation());
            }
        }

        let updates: Vec<BodyUpdate> = self
            .updates
            .drain(..)
            .filter(|(id, update)| tree.contains(*id) && !update.is_empty())
            .map(|(_, update)| update)
            .collect();
        if !updates.is_empty() {
            Self::send_ack(registry, PhysicsRequest::BatchedBodyUpdates { updates });
        }

        for (id, state) in self.activations.drain(..) {
            if tree.contains(id) {
                Self::send_ack(
                    registry,
                    PhysicsRequest::SetBodyActivationState { id: id.to_raw(), state },
                );
            }
        }
    }

    fn apply(tree: &mut FacadeTree, report: &StepReport) -> Result<()> {
        for transform in &report.transforms {
            let id = FacadeId::from_raw(transform.id);
            if !tree.contains(id) || !tree.has_capability(id, PHYSICS_BODY) {
                tracing::trace!(body = transform.id, "dropping transform for destroyed facade");
                continue;
            }
            let [x, y, z, w] = transform.quaternion;
            tree.update_object3d(id, |object| {
                object.position = Vec3::from(transform.position);
                object.quaternion = Some(Quat::new(x, y, z, w));
            })?;
        }

        for contact in &report.collisions {
            Self::dispatch_collision(tree, contact, contact.body_a, contact.body_b, 1.0)?;
            Self::dispatch_collision(tree, contact, contact.body_b, contact.body_a, -1.0)?;
        }
        Ok(())
    }

    /// Raise a `collision` event on `target`; `normal` points towards `other`
    fn dispatch_collision(
        tree: &FacadeTree,
        contact: &CollisionContact,
        target: u64,
        other: u64,
        sign: f64,
    ) -> Result<()> {
        let id = FacadeId::from_raw(target);
        if !tree.contains(id) {
            return Ok(());
        }
        let normal = Vec3::from(contact.normal) * sign;
        let event = Event::new(event_types::COLLISION).with_data(json!({
            "other": other,
            "phase": contact.phase.as_str(),
            "point": contact.point,
            "normal": normal.to_array(),
            "depth": contact.depth,
        }));
        tree.dispatch_event(id, event)?;
        Ok(())
    }
}

fn request_name(request: &PhysicsRequest) -> &'static str {
    match request {
        PhysicsRequest::Init(_) => "init",
        PhysicsRequest::UpdatePhysicsWorld { .. } => "update_physics_world",
        PhysicsRequest::AddRigidBody { .. } => "add_rigid_body",
        PhysicsRequest::RemoveRigidBody { .. } => "remove_rigid_body",
        PhysicsRequest::BatchedBodyUpdates { .. } => "batched_body_updates",
        PhysicsRequest::SetBodyActivationState { .. } => "set_body_activation_state",
    }
}

impl FrameSystem for PhysicsBridgeSystem {
    fn name(&self) -> &'static str {
        "physics_bridge"
    }

    fn on_notification(&mut self, tree: &FacadeTree, notification: &Notification) {
        match notification {
            Notification::Created { id, kind, .. } if kind.has_capability(PHYSICS_BODY) => {
                self.tracked.insert(*id);
                self.added.push(*id);
            }
            Notification::PropertyChanged { id, name, .. } if self.tracked.contains(id) => {
                self.property_changed(tree, *id, name);
            }
            Notification::Removed { id, .. } => {
                if !self.tracked.remove(id) {
                    return;
                }
                let was_added = self.added.contains(id);
                self.added.retain(|added| added != id);
                self.rebuilt.retain(|rebuilt| rebuilt != id);
                self.updates.shift_remove(id);
                self.activations.shift_remove(id);
                if !was_added {
                    self.removed.push(id.to_raw());
                }
            }
            _ => {}
        }
    }

    fn run(&mut self, cx: &mut SystemContext<'_>) -> Result<()> {
        if let Some(last) = self.last_frame {
            self.unsimulated += ((cx.now - last) / 1000.0).max(0.0);
        }
        self.last_frame = Some(cx.now);

        if !self.initialized && self.tracked.is_empty() {
            return Ok(());
        }
        self.flush_requests(cx.tree, cx.registry);

        if let Some(step) = &self.step {
            match step.try_result() {
                None => {}
                Some(Ok(PhysicsResponse::Step(report))) => {
                    self.step = None;
                    Self::apply(cx.tree, &report)?;
                }
                Some(Ok(other)) => {
                    self.step = None;
                    tracing::warn!(?other, "unexpected response to a physics step");
                }
                Some(Err(error)) => {
                    self.step = None;
                    tracing::warn!(%error, "physics step failed");
                }
            }
        }

        if self.step.is_none() && !self.tracked.is_empty() && self.unsimulated > 0.0 {
            let delta = self.unsimulated.min(MAX_STEP_DELTA);
            self.unsimulated = 0.0;
            self.step = Some(send(cx.registry, &PhysicsRequest::UpdatePhysicsWorld { delta }));
        }
        Ok(())
    }

    fn is_busy(&self) -> bool {
        !self.tracked.is_empty() || self.step.is_some() || !self.removed.is_empty()
    }
}
