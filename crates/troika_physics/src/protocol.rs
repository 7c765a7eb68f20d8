//! Physics worker protocol
//!
//! Requests sent to the `physics_world` module and the responses it returns.
//! Bodies are identified by the raw id of the facade that owns them, so
//! results can be routed back without a separate handle table.

use serde::{Deserialize, Serialize};
use troika_core::PhysicsConfig;

/// How a body takes part in the simulation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyType {
    /// Moves under gravity and contacts
    #[default]
    Dynamic,
    /// Moves only by its own velocity; pushes dynamic bodies
    Kinematic,
    /// Never moves
    Static,
}

/// Collision shape in body-local space
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Sphere { radius: f64 },
    Cuboid { half_extents: [f64; 3] },
    /// Infinite half-space through the body's position; static bodies only
    Plane { normal: [f64; 3] },
}

impl Default for Shape {
    fn default() -> Self {
        Shape::Cuboid {
            half_extents: [0.5, 0.5, 0.5],
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationState {
    #[default]
    Active,
    Sleeping,
    /// Active and never put to sleep
    AlwaysActive,
    /// Excluded from the simulation until reactivated
    Disabled,
}

/// Everything needed to add a rigid body
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyDesc {
    pub body_type: BodyType,
    pub shape: Shape,
    /// Ignored for kinematic and static bodies
    pub mass: f64,
    pub restitution: f64,
    pub friction: f64,
    pub linear_damping: f64,
    pub angular_damping: f64,
    pub gravity_scale: f64,
    pub can_sleep: bool,
    pub position: [f64; 3],
    /// Orientation as `[x, y, z, w]`
    pub quaternion: [f64; 4],
    pub velocity: [f64; 3],
    /// Radians per second around each axis
    pub angular_velocity: [f64; 3],
}

impl Default for BodyDesc {
    fn default() -> Self {
        Self {
            body_type: BodyType::Dynamic,
            shape: Shape::default(),
            mass: 1.0,
            restitution: 0.0,
            friction: 0.5,
            linear_damping: 0.0,
            angular_damping: 0.05,
            gravity_scale: 1.0,
            can_sleep: true,
            position: [0.0; 3],
            quaternion: [0.0, 0.0, 0.0, 1.0],
            velocity: [0.0; 3],
            angular_velocity: [0.0; 3],
        }
    }
}

/// Partial state change of one body; every update wakes the body
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyUpdate {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<[f64; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quaternion: Option<[f64; 4]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<[f64; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angular_velocity: Option<[f64; 3]>,
}

impl BodyUpdate {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_none()
            && self.quaternion.is_none()
            && self.velocity.is_none()
            && self.angular_velocity.is_none()
    }
}

/// Simulation settings sent with `init`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub gravity: [f64; 3],
    /// Fixed step in seconds
    pub timestep: f64,
    pub max_substeps: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::from(&PhysicsConfig::default())
    }
}

impl From<&PhysicsConfig> for SimulationConfig {
    fn from(config: &PhysicsConfig) -> Self {
        Self {
            gravity: config.gravity,
            timestep: config.timestep,
            max_substeps: config.max_substeps,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "snake_case")]
pub enum PhysicsRequest {
    /// Create (or recreate) the world; drops every existing body
    Init(SimulationConfig),
    /// Advance the world by `delta` seconds of wall time
    UpdatePhysicsWorld { delta: f64 },
    AddRigidBody { id: u64, body: BodyDesc },
    RemoveRigidBody { id: u64 },
    BatchedBodyUpdates { updates: Vec<BodyUpdate> },
    SetBodyActivationState { id: u64, state: ActivationState },
}

/// World transform of one body after a step
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodyTransform {
    pub id: u64,
    pub position: [f64; 3],
    pub quaternion: [f64; 4],
    pub sleeping: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactPhase {
    /// The pair started touching during this step
    Started,
    /// The pair was already touching
    Ongoing,
    /// The pair stopped touching; point and normal are the last known contact
    Stopped,
}

impl ContactPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            ContactPhase::Started => "started",
            ContactPhase::Ongoing => "ongoing",
            ContactPhase::Stopped => "stopped",
        }
    }
}

/// Contact between two bodies; `normal` points from `body_a` to `body_b`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollisionContact {
    pub body_a: u64,
    pub body_b: u64,
    pub phase: ContactPhase,
    pub point: [f64; 3],
    pub normal: [f64; 3],
    pub depth: f64,
}

/// Outcome of one `update_physics_world`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// Fixed steps taken
    pub steps: u32,
    /// Bodies that moved
    pub transforms: Vec<BodyTransform>,
    pub collisions: Vec<CollisionContact>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PhysicsResponse {
    Ack,
    Step(StepReport),
}
