//! The `physics_world` worker module
//!
//! The module owns one [`PhysicsSimulation`] per registry. Requests reach it
//! in the order they were made, so a body added in the same frame as a step
//! is already simulated by that step.

use std::sync::{Mutex, OnceLock, PoisonError};

use serde_json::Value;
use troika_worker::{
    define_worker_module, ModuleDeps, ModuleInstance, Thenable, TypedWorkerModule, WorkerId,
    WorkerModuleOptions, WorkerRegistry,
};

use crate::error::{PhysicsError, Result};
use crate::protocol::{PhysicsRequest, PhysicsResponse};
use crate::simulation::PhysicsSimulation;

/// Worker thread hosting the physics world
pub const PHYSICS_WORKER: WorkerId = WorkerId("troika-physics");

fn running(world: &mut Option<PhysicsSimulation>) -> Result<&mut PhysicsSimulation> {
    world.as_mut().ok_or(PhysicsError::NotInitialized)
}

/// Apply one request to the world held in `world`
pub fn handle_request(world: &mut Option<PhysicsSimulation>, request: PhysicsRequest) -> Result<PhysicsResponse> {
    match request {
        PhysicsRequest::Init(config) => {
            if world.is_some() {
                tracing::debug!("physics world reinitialized");
            }
            *world = Some(PhysicsSimulation::new(config)?);
        }
        PhysicsRequest::UpdatePhysicsWorld { delta } => {
            return Ok(PhysicsResponse::Step(running(world)?.step(delta)));
        }
        PhysicsRequest::AddRigidBody { id, body } => running(world)?.add_body(id, &body)?,
        PhysicsRequest::RemoveRigidBody { id } => {
            if !running(world)?.remove_body(id) {
                tracing::trace!(id, "remove of unknown rigid body ignored");
            }
        }
        PhysicsRequest::BatchedBodyUpdates { updates } => {
            let simulation = running(world)?;
            for update in &updates {
                simulation.apply_update(update)?;
            }
        }
        PhysicsRequest::SetBodyActivationState { id, state } => {
            running(world)?.set_activation_state(id, state)?;
        }
    }
    Ok(PhysicsResponse::Ack)
}

fn init_physics_world(_deps: &ModuleDeps) -> std::result::Result<ModuleInstance, String> {
    let world: Mutex<Option<PhysicsSimulation>> = Mutex::new(None);
    Ok(ModuleInstance::function(move |args: Value| {
        let request: PhysicsRequest = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let mut world = world.lock().unwrap_or_else(PoisonError::into_inner);
        let response = handle_request(&mut world, request).map_err(|e| e.to_string())?;
        serde_json::to_value(response).map_err(|e| e.to_string())
    }))
}

pub fn physics_world_module() -> &'static TypedWorkerModule<PhysicsRequest, PhysicsResponse> {
    static MODULE: OnceLock<TypedWorkerModule<PhysicsRequest, PhysicsResponse>> = OnceLock::new();
    MODULE.get_or_init(|| {
        TypedWorkerModule::new(define_worker_module(
            WorkerModuleOptions::new("physics_world", init_physics_world).worker(PHYSICS_WORKER),
        ))
    })
}

pub fn send(registry: &WorkerRegistry, request: &PhysicsRequest) -> Thenable<PhysicsResponse> {
    physics_world_module().call(registry, request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{BodyDesc, Shape, SimulationConfig};
    use std::time::Duration;
    use troika_worker::{RegistryConfig, WorkerError};

    fn falling_sphere() -> PhysicsRequest {
        PhysicsRequest::AddRigidBody {
            id: 1,
            body: BodyDesc {
                shape: Shape::Sphere { radius: 0.5 },
                position: [0.0, 10.0, 0.0],
                ..BodyDesc::default()
            },
        }
    }

    fn config() -> SimulationConfig {
        SimulationConfig {
            gravity: [0.0, -8.0, 0.0],
            timestep: 0.25,
            max_substeps: 4,
        }
    }

    #[test]
    fn test_requests_before_init_fail() {
        let mut world = None;
        assert_eq!(
            handle_request(&mut world, PhysicsRequest::UpdatePhysicsWorld { delta: 0.1 }),
            Err(PhysicsError::NotInitialized)
        );
        assert_eq!(handle_request(&mut world, PhysicsRequest::Init(config())), Ok(PhysicsResponse::Ack));
        assert!(world.is_some());
    }

    #[test]
    fn test_world_steps_on_main_thread_fallback() {
        let registry = WorkerRegistry::new(RegistryConfig::main_thread());
        send(&registry, &PhysicsRequest::Init(config()));
        send(&registry, &falling_sphere());
        let step = send(&registry, &PhysicsRequest::UpdatePhysicsWorld { delta: 1.0 });
        registry.pump();

        match step.try_result() {
            Some(Ok(PhysicsResponse::Step(report))) => {
                assert_eq!(report.steps, 4);
                let height = report.transforms[0].position[1];
                assert!(height > 4.9 && height < 6.1, "sphere fell to {height}");
            }
            other => panic!("expected a step report, got {other:?}"),
        }
    }

    #[test]
    fn test_failures_reject_only_their_request() {
        let registry = WorkerRegistry::new(RegistryConfig::main_thread());
        send(&registry, &PhysicsRequest::Init(config()));
        let first = send(&registry, &falling_sphere());
        let duplicate = send(&registry, &falling_sphere());
        registry.pump();

        assert_eq!(first.try_result(), Some(Ok(PhysicsResponse::Ack)));
        match duplicate.try_result() {
            Some(Err(WorkerError::Call { module, message })) => {
                assert_eq!(module, "physics_world");
                assert_eq!(message, PhysicsError::DuplicateBody(1).to_string());
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_world_steps_on_worker_thread() {
        let registry = WorkerRegistry::new(RegistryConfig::default());
        send(&registry, &PhysicsRequest::Init(config()));
        send(&registry, &falling_sphere());
        let step = send(&registry, &PhysicsRequest::UpdatePhysicsWorld { delta: 0.5 });
        let response = pollster::block_on(async {
            assert!(registry.wait_idle(Duration::from_secs(10)));
            step.await
        })
        .unwrap();
        match response {
            PhysicsResponse::Step(report) => assert_eq!(report.steps, 2),
            other => panic!("unexpected response {other:?}"),
        }
        registry.terminate();
    }
}
