//! Troika Physics
//!
//! Rigid body physics for facade scenes. The simulation runs in the
//! `physics_world` worker module; the main thread only exchanges messages
//! with it:
//!
//! - **Simulation**: [`PhysicsSimulation`], a fixed-step rapier world with
//!   sphere, cuboid and plane colliders, contacts and sleeping
//! - **Protocol**: `init`, `update_physics_world`, `add_rigid_body`,
//!   `remove_rigid_body`, `batched_body_updates` and
//!   `set_body_activation_state`, answered with transforms and contacts keyed
//!   by facade id
//! - **Facade**: [`PhysicsObjectFacade`], an object with a rigid body
//! - **Bridge**: [`PhysicsBridgeSystem`], the frame system that keeps the
//!   world and the facade tree in step
//!
//! # Example
//!
//! ```rust
//! use troika_core::{Descriptor, RecordingRenderer, TroikaConfig, World};
//! use troika_physics::{PhysicsBridgeSystem, PHYSICS_OBJECT};
//!
//! let config = TroikaConfig::default();
//! let mut world = World::new(&config, RecordingRenderer::new());
//! world.add_system(PhysicsBridgeSystem::new(&config.physics));
//! world.set_scene(Descriptor::new(PHYSICS_OBJECT).key("crate").prop("y", 2.0));
//! world.tick(0.0).unwrap();
//! world.shutdown();
//! ```

pub mod bridge;
pub mod error;
pub mod facade;
pub mod module;
pub mod protocol;
pub mod simulation;

pub use bridge::{PhysicsBridgeSystem, MAX_STEP_DELTA};
pub use error::{PhysicsError, Result};
pub use facade::{PhysicsObjectFacade, LIVE_PROPERTIES, PHYSICS_BODY, PHYSICS_OBJECT, PHYSICS_PROPERTIES};
pub use module::{handle_request, physics_world_module, send, PHYSICS_WORKER};
pub use protocol::{
    ActivationState, BodyDesc, BodyTransform, BodyType, BodyUpdate, CollisionContact,
    ContactPhase, PhysicsRequest, PhysicsResponse, Shape, SimulationConfig, StepReport,
};
pub use simulation::PhysicsSimulation;
