//! Falling Spheres Demo
//!
//! Drops a column of spheres onto a ground plane and prints every collision
//! as it arrives from the physics worker.
//!
//! Run with: cargo run -p troika_physics --example falling_spheres

use serde_json::json;
use troika_core::{Descriptor, RecordingRenderer, TroikaConfig, World};
use troika_physics::{PhysicsBridgeSystem, PHYSICS_OBJECT};

fn scene() -> Vec<Descriptor> {
    let ground = Descriptor::new(PHYSICS_OBJECT)
        .key("ground")
        .prop("body_type", "static")
        .prop("shape", json!({ "type": "plane", "normal": [0.0, 1.0, 0.0] }));

    let spheres = (0..4).map(|i| {
        let key = format!("sphere-{i}");
        let name = key.clone();
        Descriptor::new(PHYSICS_OBJECT)
            .key(key)
            .prop("shape", json!({ "type": "sphere", "radius": 0.5 }))
            .prop("x", i as f64 * 0.2)
            .prop("y", 2.0 + i as f64 * 1.5)
            .prop("restitution", 0.6)
            .on("collision", move |event| {
                if event.data["phase"] == "started" {
                    println!("{name} hit body {} at {}", event.data["other"], event.data["point"]);
                }
            })
    });

    std::iter::once(ground).chain(spheres).collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = TroikaConfig::default();
    let mut world = World::new(&config, RecordingRenderer::new());
    world.add_system(PhysicsBridgeSystem::new(&config.physics));
    world.set_scene(scene());

    // Five simulated seconds at 60 fps
    for frame in 0..300 {
        world.tick(frame as f64 * 1000.0 / 60.0)?;
        std::thread::sleep(std::time::Duration::from_millis(2));
    }

    println!("rendered {} frames", world.renderer().frames_rendered());
    world.shutdown();
    Ok(())
}
