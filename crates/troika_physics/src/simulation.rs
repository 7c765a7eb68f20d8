//! Rigid body simulation
//!
//! A rapier pipeline stepped at a fixed timestep, at most `max_substeps`
//! steps per update. Each body owns one collider (sphere, cuboid or static
//! half-space) tagged with the body id, so contacts reported by rapier's
//! collision events map straight back to the facades that own them.
//!
//! Kinematic bodies are velocity based: they move by the velocity they are
//! given and push dynamic bodies out of the way.

use std::sync::{Mutex, PoisonError};

use indexmap::IndexMap;
use rapier3d::na::{Isometry3, Quaternion, Translation3, Unit, UnitQuaternion};
use rapier3d::prelude::*;
use rustc_hash::FxHashSet;
use troika_core::Vec3;

use crate::error::{PhysicsError, Result};
use crate::protocol::{
    ActivationState, BodyDesc, BodyTransform, BodyType, BodyUpdate, CollisionContact,
    ContactPhase, Shape, SimulationConfig, StepReport,
};

const EPSILON: f64 = 1e-9;

type Pair = (u64, u64);

/// Checks a body description before anything is inserted
fn validate(id: u64, desc: &BodyDesc) -> Result<()> {
    let invalid = |message: &str| PhysicsError::InvalidBody {
        id,
        message: message.to_string(),
    };

    match desc.shape {
        Shape::Sphere { radius } if !(radius > 0.0 && radius.is_finite()) => {
            return Err(invalid("sphere radius must be positive"));
        }
        Shape::Cuboid { half_extents } if !half_extents.iter().all(|h| *h > 0.0 && h.is_finite()) => {
            return Err(invalid("cuboid half extents must be positive"));
        }
        Shape::Plane { normal } => {
            if Vec3::from(normal).length() < EPSILON {
                return Err(invalid("plane normal must be non-zero"));
            }
            if desc.body_type != BodyType::Static {
                return Err(invalid("plane colliders must be static"));
            }
        }
        _ => {}
    }
    if desc.body_type == BodyType::Dynamic && !(desc.mass > 0.0 && desc.mass.is_finite()) {
        return Err(invalid("dynamic bodies need a positive mass"));
    }
    if desc.restitution < 0.0 || desc.friction < 0.0 {
        return Err(invalid("restitution and friction cannot be negative"));
    }
    Ok(())
}

fn vector_of(v: [f64; 3]) -> Vector<Real> {
    vector![v[0] as Real, v[1] as Real, v[2] as Real]
}

fn to_array(v: &Vector<Real>) -> [f64; 3] {
    [f64::from(v.x), f64::from(v.y), f64::from(v.z)]
}

/// `[x, y, z, w]` to a unit rotation; degenerate input is the identity
fn rotation_of([x, y, z, w]: [f64; 4]) -> UnitQuaternion<Real> {
    UnitQuaternion::try_new(Quaternion::new(w as Real, x as Real, y as Real, z as Real), 1e-6)
        .unwrap_or_else(UnitQuaternion::identity)
}

fn shape_of(shape: Shape) -> SharedShape {
    match shape {
        Shape::Sphere { radius } => SharedShape::ball(radius as Real),
        Shape::Cuboid { half_extents: [x, y, z] } => SharedShape::cuboid(x as Real, y as Real, z as Real),
        Shape::Plane { normal } => SharedShape::halfspace(Unit::new_normalize(vector_of(normal))),
    }
}

fn body_type_of(body_type: BodyType) -> RigidBodyType {
    match body_type {
        BodyType::Dynamic => RigidBodyType::Dynamic,
        BodyType::Kinematic => RigidBodyType::KinematicVelocityBased,
        BodyType::Static => RigidBodyType::Fixed,
    }
}

/// Collects rapier's collision events during a pipeline step
#[derive(Default)]
struct ContactCollector {
    events: Mutex<Vec<CollisionEvent>>,
}

impl ContactCollector {
    fn drain(&self) -> Vec<CollisionEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl EventHandler for ContactCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

#[derive(Clone, Copy, Debug)]
struct TrackedBody {
    handle: RigidBodyHandle,
    collider: ColliderHandle,
    /// Requested state; sleeping is read back from rapier
    activation: ActivationState,
    can_sleep: bool,
}

/// The simulated world
pub struct PhysicsSimulation {
    config: SimulationConfig,
    gravity: Vector<Real>,
    parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
    collector: ContactCollector,
    /// Bodies by facade id, in insertion order
    bodies: IndexMap<u64, TrackedBody>,
    accumulator: f64,
    /// Pairs touching after the last update, with their last contact
    touching: IndexMap<Pair, CollisionContact>,
}

impl std::fmt::Debug for PhysicsSimulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsSimulation")
            .field("config", &self.config)
            .field("bodies", &self.bodies.len())
            .field("touching", &self.touching.len())
            .field("accumulator", &self.accumulator)
            .finish()
    }
}

impl PhysicsSimulation {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        if !(config.timestep > 0.0 && config.timestep.is_finite()) {
            return Err(PhysicsError::InvalidConfig(format!(
                "timestep must be positive, got {}",
                config.timestep
            )));
        }
        if config.max_substeps == 0 {
            return Err(PhysicsError::InvalidConfig("max_substeps must be at least 1".to_string()));
        }
        let parameters = IntegrationParameters {
            dt: config.timestep as Real,
            ..IntegrationParameters::default()
        };
        Ok(Self {
            config,
            gravity: vector_of(config.gravity),
            parameters,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            collector: ContactCollector::default(),
            bodies: IndexMap::new(),
            accumulator: 0.0,
            touching: IndexMap::new(),
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.bodies.contains_key(&id)
    }

    pub fn add_body(&mut self, id: u64, desc: &BodyDesc) -> Result<()> {
        if self.bodies.contains_key(&id) {
            return Err(PhysicsError::DuplicateBody(id));
        }
        validate(id, desc)?;

        let [x, y, z] = desc.position;
        let position = Isometry3::from_parts(
            Translation3::new(x as Real, y as Real, z as Real),
            rotation_of(desc.quaternion),
        );
        let body = RigidBodyBuilder::new(body_type_of(desc.body_type))
            .position(position)
            .linvel(vector_of(desc.velocity))
            .angvel(vector_of(desc.angular_velocity))
            .linear_damping(desc.linear_damping.max(0.0) as Real)
            .angular_damping(desc.angular_damping.max(0.0) as Real)
            .gravity_scale(desc.gravity_scale as Real)
            .can_sleep(desc.can_sleep)
            .user_data(u128::from(id))
            .build();
        let handle = self.rigid_bodies.insert(body);

        let mut collider = ColliderBuilder::new(shape_of(desc.shape))
            .restitution(desc.restitution as Real)
            .friction(desc.friction as Real)
            .restitution_combine_rule(CoefficientCombineRule::Multiply)
            .friction_combine_rule(CoefficientCombineRule::Multiply)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .user_data(u128::from(id));
        if desc.body_type == BodyType::Dynamic {
            collider = collider.mass(desc.mass as Real);
        }
        let collider = self
            .colliders
            .insert_with_parent(collider.build(), handle, &mut self.rigid_bodies);

        self.bodies.insert(
            id,
            TrackedBody {
                handle,
                collider,
                activation: ActivationState::Active,
                can_sleep: desc.can_sleep,
            },
        );
        tracing::debug!(id, body_type = ?desc.body_type, "rigid body added");
        Ok(())
    }

    /// Returns false if no such body existed
    pub fn remove_body(&mut self, id: u64) -> bool {
        let Some(tracked) = self.bodies.shift_remove(&id) else {
            return false;
        };
        self.rigid_bodies.remove(
            tracked.handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
        self.touching.retain(|(a, b), _| *a != id && *b != id);
        tracing::debug!(id, "rigid body removed");
        true
    }

    fn tracked(&self, id: u64) -> Result<TrackedBody> {
        self.bodies.get(&id).copied().ok_or(PhysicsError::UnknownBody(id))
    }

    pub fn apply_update(&mut self, update: &BodyUpdate) -> Result<()> {
        let tracked = self.tracked(update.id)?;
        let body = self
            .rigid_bodies
            .get_mut(tracked.handle)
            .ok_or(PhysicsError::UnknownBody(update.id))?;
        if let Some(position) = update.position {
            body.set_translation(vector_of(position), true);
        }
        if let Some(quaternion) = update.quaternion {
            body.set_rotation(rotation_of(quaternion), true);
        }
        if let Some(velocity) = update.velocity {
            body.set_linvel(vector_of(velocity), true);
        }
        if let Some(angular_velocity) = update.angular_velocity {
            body.set_angvel(vector_of(angular_velocity), true);
        }
        body.wake_up(true);
        if let Some(tracked) = self.bodies.get_mut(&update.id) {
            if tracked.activation == ActivationState::Sleeping {
                tracked.activation = ActivationState::Active;
            }
        }
        Ok(())
    }

    pub fn set_activation_state(&mut self, id: u64, state: ActivationState) -> Result<()> {
        let tracked = self.tracked(id)?;
        let body = self
            .rigid_bodies
            .get_mut(tracked.handle)
            .ok_or(PhysicsError::UnknownBody(id))?;

        body.set_enabled(state != ActivationState::Disabled);
        let sleeps = tracked.can_sleep && state != ActivationState::AlwaysActive;
        *body.activation_mut() = if sleeps {
            RigidBodyActivation::active()
        } else {
            RigidBodyActivation::cannot_sleep()
        };
        match state {
            ActivationState::Sleeping => body.sleep(),
            ActivationState::Active | ActivationState::AlwaysActive => body.wake_up(true),
            ActivationState::Disabled => {}
        }

        if let Some(tracked) = self.bodies.get_mut(&id) {
            tracked.activation = state;
        }
        Ok(())
    }

    fn transform_of(&self, id: u64, tracked: &TrackedBody) -> Option<BodyTransform> {
        let body = self.rigid_bodies.get(tracked.handle)?;
        let rotation = body.rotation().coords;
        Some(BodyTransform {
            id,
            position: to_array(body.translation()),
            quaternion: [
                f64::from(rotation.x),
                f64::from(rotation.y),
                f64::from(rotation.z),
                f64::from(rotation.w),
            ],
            sleeping: body.is_sleeping(),
        })
    }

    pub fn body_transform(&self, id: u64) -> Option<BodyTransform> {
        let tracked = self.bodies.get(&id)?;
        self.transform_of(id, tracked)
    }

    pub fn body_velocity(&self, id: u64) -> Option<[f64; 3]> {
        let tracked = self.bodies.get(&id)?;
        self.rigid_bodies.get(tracked.handle).map(|body| to_array(body.linvel()))
    }

    pub fn activation_state(&self, id: u64) -> Option<ActivationState> {
        let tracked = self.bodies.get(&id)?;
        match tracked.activation {
            state @ (ActivationState::Disabled | ActivationState::AlwaysActive) => Some(state),
            _ => {
                let body = self.rigid_bodies.get(tracked.handle)?;
                Some(if body.is_sleeping() {
                    ActivationState::Sleeping
                } else {
                    ActivationState::Active
                })
            }
        }
    }

    /// Advance by `delta` seconds of wall time in fixed steps
    pub fn step(&mut self, delta: f64) -> StepReport {
        let timestep = self.config.timestep;
        if delta.is_finite() && delta > 0.0 {
            self.accumulator += delta;
        }

        let before: Vec<Option<BodyTransform>> = self
            .bodies
            .iter()
            .map(|(id, tracked)| self.transform_of(*id, tracked))
            .collect();
        let previously: FxHashSet<Pair> = self.touching.keys().copied().collect();
        let mut started: IndexMap<Pair, CollisionContact> = IndexMap::new();
        let mut separated: IndexMap<Pair, CollisionContact> = IndexMap::new();

        let mut steps = 0;
        while self.accumulator >= timestep && steps < self.config.max_substeps {
            self.pipeline.step(
                &self.gravity,
                &self.parameters,
                &mut self.islands,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.rigid_bodies,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                &mut self.ccd,
                None,
                &(),
                &self.collector,
            );
            self.collect_events(&previously, &mut started, &mut separated);
            self.accumulator -= timestep;
            steps += 1;
        }
        if self.accumulator >= timestep {
            tracing::debug!(
                dropped = self.accumulator - self.accumulator % timestep,
                "physics falling behind; dropping simulation time"
            );
            self.accumulator %= timestep;
        }
        if steps == 0 {
            return StepReport::default();
        }

        let transforms = self
            .bodies
            .iter()
            .zip(before)
            .filter_map(|((id, tracked), before)| {
                let after = self.transform_of(*id, tracked)?;
                let moved = before.map_or(true, |before| {
                    before.position != after.position || before.quaternion != after.quaternion
                });
                moved.then_some(after)
            })
            .collect();

        StepReport {
            steps,
            transforms,
            collisions: self.report_contacts(&previously, started, separated),
        }
    }

    fn collect_events(
        &mut self,
        previously: &FxHashSet<Pair>,
        started: &mut IndexMap<Pair, CollisionContact>,
        separated: &mut IndexMap<Pair, CollisionContact>,
    ) {
        for event in self.collector.drain() {
            match event {
                CollisionEvent::Started(first, second, _) => {
                    let Some(contact) = self.contact_between(first, second, ContactPhase::Started) else {
                        continue;
                    };
                    let pair = (contact.body_a, contact.body_b);
                    if !previously.contains(&pair) {
                        started.entry(pair).or_insert(contact);
                    }
                    self.touching.insert(pair, contact);
                }
                // Removed colliders belong to bodies that are already gone
                CollisionEvent::Stopped(_, _, flags) if flags.contains(CollisionEventFlags::REMOVED) => {}
                CollisionEvent::Stopped(first, second, _) => {
                    let (Some(a), Some(b)) = (self.owner(first), self.owner(second)) else {
                        continue;
                    };
                    let pair = self.ordered(a, b);
                    if let Some(last) = self.touching.shift_remove(&pair) {
                        separated.insert(pair, last);
                    }
                }
            }
        }
    }

    /// Assign phases to this update's contacts
    fn report_contacts(
        &mut self,
        previously: &FxHashSet<Pair>,
        started: IndexMap<Pair, CollisionContact>,
        separated: IndexMap<Pair, CollisionContact>,
    ) -> Vec<CollisionContact> {
        let mut collisions: Vec<CollisionContact> = started.values().copied().collect();

        let ongoing: Vec<Pair> = self
            .touching
            .keys()
            .filter(|pair| previously.contains(*pair) && !started.contains_key(*pair))
            .copied()
            .collect();
        for pair in ongoing {
            // Pairs at rest are still touching but not reported
            if !(self.is_awake(pair.0) || self.is_awake(pair.1)) {
                continue;
            }
            let Some(last) = self.touching.get(&pair).copied() else {
                continue;
            };
            let contact = self
                .pair_colliders(pair)
                .and_then(|(a, b)| self.contact_between(a, b, ContactPhase::Ongoing))
                .unwrap_or(CollisionContact {
                    phase: ContactPhase::Ongoing,
                    ..last
                });
            self.touching.insert(pair, contact);
            collisions.push(contact);
        }

        collisions.extend(
            separated
                .into_iter()
                .filter(|(pair, _)| !self.touching.contains_key(pair))
                .map(|(_, last)| CollisionContact {
                    phase: ContactPhase::Stopped,
                    depth: 0.0,
                    ..last
                }),
        );
        collisions
    }

    fn owner(&self, collider: ColliderHandle) -> Option<u64> {
        let id = u64::try_from(self.colliders.get(collider)?.user_data).ok()?;
        self.bodies.contains_key(&id).then_some(id)
    }

    /// Bodies of a pair in insertion order
    fn ordered(&self, a: u64, b: u64) -> Pair {
        match (self.bodies.get_index_of(&a), self.bodies.get_index_of(&b)) {
            (Some(i), Some(j)) if j < i => (b, a),
            _ => (a, b),
        }
    }

    fn pair_colliders(&self, (a, b): Pair) -> Option<(ColliderHandle, ColliderHandle)> {
        Some((self.bodies.get(&a)?.collider, self.bodies.get(&b)?.collider))
    }

    fn is_awake(&self, id: u64) -> bool {
        self.bodies
            .get(&id)
            .and_then(|tracked| self.rigid_bodies.get(tracked.handle))
            .is_some_and(|body| !body.is_fixed() && body.is_enabled() && !body.is_sleeping())
    }

    /// Deepest contact between two colliders, ordered and with the normal
    /// pointing from the first body to the second
    fn contact_between(
        &self,
        first: ColliderHandle,
        second: ColliderHandle,
        phase: ContactPhase,
    ) -> Option<CollisionContact> {
        let (a, b) = (self.owner(first)?, self.owner(second)?);
        let (body_a, body_b) = self.ordered(a, b);
        let collider_a = self.bodies.get(&body_a)?.collider;

        let deepest = self
            .narrow_phase
            .contact_pair(first, second)
            .and_then(|pair| pair.find_deepest_contact().map(|found| (pair, found)));
        let Some((pair, (manifold, contact))) = deepest else {
            // Touching without a manifold yet: fall back to the body centers
            let center = |id: u64| {
                self.bodies
                    .get(&id)
                    .and_then(|tracked| self.rigid_bodies.get(tracked.handle))
                    .map(|body| Vec3::from(to_array(body.translation())))
            };
            let (from, to) = (center(body_a)?, center(body_b)?);
            let offset = to - from;
            let normal = if offset.length() > EPSILON {
                offset * (1.0 / offset.length())
            } else {
                Vec3::Y
            };
            return Some(CollisionContact {
                body_a,
                body_b,
                phase,
                point: (from + offset * 0.5).to_array(),
                normal: normal.to_array(),
                depth: 0.0,
            });
        };

        let (local_point, sign) = if pair.collider1 == collider_a {
            (contact.local_p1, 1.0)
        } else {
            (contact.local_p2, -1.0)
        };
        let point = self.colliders.get(collider_a)?.position() * local_point;
        let normal = to_array(&manifold.data.normal).map(|component| component * sign);
        Some(CollisionContact {
            body_a,
            body_b,
            phase,
            point: [f64::from(point.x), f64::from(point.y), f64::from(point.z)],
            normal,
            depth: f64::from((-contact.dist).max(0.0)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-3;

    fn world(gravity: f64, timestep: f64, max_substeps: u32) -> PhysicsSimulation {
        PhysicsSimulation::new(SimulationConfig {
            gravity: [0.0, gravity, 0.0],
            timestep,
            max_substeps,
        })
        .unwrap()
    }

    fn sphere(y: f64) -> BodyDesc {
        BodyDesc {
            shape: Shape::Sphere { radius: 0.5 },
            position: [0.0, y, 0.0],
            ..BodyDesc::default()
        }
    }

    fn ground() -> BodyDesc {
        BodyDesc {
            body_type: BodyType::Static,
            shape: Shape::Plane {
                normal: [0.0, 1.0, 0.0],
            },
            ..BodyDesc::default()
        }
    }

    #[test]
    fn test_free_fall_under_gravity() {
        let mut sim = world(-8.0, 0.25, 4);
        sim.add_body(1, &sphere(10.0)).unwrap();

        let report = sim.step(1.0);
        assert_eq!(report.steps, 4);
        let velocity = sim.body_velocity(1).unwrap();
        assert!((velocity[1] + 8.0).abs() < TOLERANCE, "{velocity:?}");
        let transform = sim.body_transform(1).unwrap();
        // Between explicit and semi-implicit Euler over the same second
        assert!(transform.position[1] > 4.9 && transform.position[1] < 6.1, "{transform:?}");
        assert_eq!(transform.position[0], 0.0);
        assert_eq!(report.transforms, vec![transform]);
        assert!(report.collisions.is_empty());
    }

    #[test]
    fn test_partial_steps_accumulate() {
        let mut sim = world(-8.0, 0.25, 4);
        sim.add_body(1, &sphere(10.0)).unwrap();
        assert_eq!(sim.step(0.125), StepReport::default());
        assert_eq!(sim.step(0.125).steps, 1);
    }

    #[test]
    fn test_excess_time_is_dropped() {
        let mut sim = world(-8.0, 0.25, 2);
        sim.add_body(1, &sphere(10.0)).unwrap();
        assert_eq!(sim.step(2.0).steps, 2);
        // Backlog was discarded
        assert_eq!(sim.step(0.0).steps, 0);
    }

    #[test]
    fn test_sphere_comes_to_rest_and_sleeps() {
        let mut sim = world(-10.0, 1.0 / 60.0, 4);
        sim.add_body(1, &sphere(0.5)).unwrap();
        sim.add_body(2, &ground()).unwrap();

        let first = sim.step(0.05);
        let contact = first
            .collisions
            .iter()
            .find(|contact| contact.phase == ContactPhase::Started)
            .copied()
            .expect("sphere touches the ground");
        // Ground was added second, so the normal points from sphere to ground
        assert_eq!((contact.body_a, contact.body_b), (1, 2));
        assert!((contact.normal[1] + 1.0).abs() < TOLERANCE, "{contact:?}");

        for _ in 0..120 {
            sim.step(0.05);
        }

        let transform = sim.body_transform(1).unwrap();
        assert!(transform.position[1] > 0.45 && transform.position[1] < 0.55, "{transform:?}");
        assert!(transform.sleeping);
        assert_eq!(sim.activation_state(1), Some(ActivationState::Sleeping));

        // A sleeping body does not report separation from the ground
        let report = sim.step(0.05);
        assert!(report.transforms.is_empty());
        assert!(report
            .collisions
            .iter()
            .all(|contact| contact.phase != ContactPhase::Stopped));
    }

    #[test]
    fn test_update_wakes_sleeping_body() {
        let mut sim = world(-10.0, 0.25, 4);
        sim.add_body(1, &sphere(0.0)).unwrap();
        sim.set_activation_state(1, ActivationState::Sleeping).unwrap();
        assert_eq!(sim.activation_state(1), Some(ActivationState::Sleeping));
        assert_eq!(sim.step(0.25).steps, 1);
        assert!(sim.body_transform(1).unwrap().position[1].abs() < TOLERANCE);

        let mut update = BodyUpdate::new(1);
        update.velocity = Some([1.0, 0.0, 0.0]);
        sim.apply_update(&update).unwrap();
        assert_eq!(sim.activation_state(1), Some(ActivationState::Active));
        sim.step(0.25);
        assert!(sim.body_transform(1).unwrap().position[0] > 0.0);
    }

    #[test]
    fn test_disabled_body_stays_put() {
        let mut sim = world(-10.0, 0.25, 4);
        sim.add_body(1, &sphere(5.0)).unwrap();
        sim.set_activation_state(1, ActivationState::Disabled).unwrap();
        sim.step(0.5);
        assert!((sim.body_transform(1).unwrap().position[1] - 5.0).abs() < TOLERANCE);
        assert_eq!(sim.activation_state(1), Some(ActivationState::Disabled));

        sim.set_activation_state(1, ActivationState::AlwaysActive).unwrap();
        sim.step(0.5);
        assert!(sim.body_transform(1).unwrap().position[1] < 5.0);
        assert_eq!(sim.activation_state(1), Some(ActivationState::AlwaysActive));
    }

    #[test]
    fn test_bouncy_sphere_rebounds() {
        let mut sim = world(-10.0, 1.0 / 60.0, 4);
        let mut ball = sphere(0.55);
        ball.restitution = 1.0;
        ball.velocity = [0.0, -5.0, 0.0];
        let mut floor = ground();
        floor.restitution = 1.0;
        sim.add_body(1, &ball).unwrap();
        sim.add_body(2, &floor).unwrap();

        sim.step(4.0 / 60.0);
        assert!(sim.body_velocity(1).unwrap()[1] > 0.0);
    }

    #[test]
    fn test_contacts_start_and_stop() {
        let mut sim = world(0.0, 0.25, 4);
        let mut left = sphere(0.0);
        left.position = [-0.4, 0.0, 0.0];
        left.can_sleep = false;
        let mut right = sphere(0.0);
        right.position = [0.4, 0.0, 0.0];
        right.can_sleep = false;
        sim.add_body(1, &left).unwrap();
        sim.add_body(2, &right).unwrap();

        let report = sim.step(0.25);
        assert_eq!(report.collisions.len(), 1);
        let contact = report.collisions[0];
        assert_eq!((contact.body_a, contact.body_b), (1, 2));
        assert_eq!(contact.phase, ContactPhase::Started);
        assert!((contact.normal[0] - 1.0).abs() < TOLERANCE, "{contact:?}");

        // Pull them apart
        let mut away = BodyUpdate::new(2);
        away.position = Some([5.0, 0.0, 0.0]);
        away.velocity = Some([0.0, 0.0, 0.0]);
        sim.apply_update(&away).unwrap();
        let report = sim.step(0.25);
        assert_eq!(report.collisions.len(), 1);
        assert_eq!(report.collisions[0].phase, ContactPhase::Stopped);
        assert_eq!(report.collisions[0].depth, 0.0);
        assert_eq!((report.collisions[0].body_a, report.collisions[0].body_b), (1, 2));
    }

    #[test]
    fn test_removed_body_reports_nothing() {
        let mut sim = world(-10.0, 1.0 / 60.0, 4);
        sim.add_body(1, &ground()).unwrap();
        sim.add_body(2, &sphere(0.5)).unwrap();
        sim.step(0.05);
        assert!(sim.remove_body(2));
        let report = sim.step(0.05);
        assert!(report.collisions.is_empty());
        assert!(report.transforms.is_empty());
    }

    #[test]
    fn test_invalid_bodies_are_rejected() {
        let mut sim = world(-10.0, 0.25, 4);
        let dynamic_plane = BodyDesc {
            shape: Shape::Plane {
                normal: [0.0, 1.0, 0.0],
            },
            ..BodyDesc::default()
        };
        assert!(matches!(
            sim.add_body(1, &dynamic_plane),
            Err(PhysicsError::InvalidBody { id: 1, .. })
        ));

        let massless = BodyDesc {
            mass: 0.0,
            ..BodyDesc::default()
        };
        assert!(sim.add_body(2, &massless).is_err());
        assert!(sim.is_empty());

        sim.add_body(3, &sphere(0.0)).unwrap();
        assert_eq!(sim.add_body(3, &sphere(0.0)), Err(PhysicsError::DuplicateBody(3)));
        assert_eq!(sim.apply_update(&BodyUpdate::new(4)), Err(PhysicsError::UnknownBody(4)));
        assert!(sim.remove_body(3));
        assert!(!sim.remove_body(3));
    }

    #[test]
    fn test_invalid_config() {
        let config = SimulationConfig {
            timestep: 0.0,
            ..SimulationConfig::default()
        };
        assert!(matches!(PhysicsSimulation::new(config), Err(PhysicsError::InvalidConfig(_))));
    }

    #[test]
    fn test_rotation_round_trips_through_the_world() {
        let mut sim = world(0.0, 0.25, 4);
        let half_turn = std::f64::consts::FRAC_1_SQRT_2;
        let tilted = BodyDesc {
            quaternion: [0.0, half_turn, 0.0, half_turn],
            ..BodyDesc::default()
        };
        sim.add_body(1, &tilted).unwrap();
        let [x, y, z, w] = sim.body_transform(1).unwrap().quaternion;
        assert!(x.abs() < TOLERANCE && z.abs() < TOLERANCE);
        assert!((y - half_turn).abs() < TOLERANCE && (w - half_turn).abs() < TOLERANCE);

        // Degenerate orientations fall back to the identity
        let flat = BodyDesc {
            quaternion: [0.0; 4],
            ..BodyDesc::default()
        };
        sim.add_body(2, &flat).unwrap();
        assert_eq!(sim.body_transform(2).unwrap().quaternion, [0.0, 0.0, 0.0, 1.0]);
    }
}
