//! Troika Core
//!
//! A declarative scene graph that does not depend on any particular render
//! engine. Each frame, a tree of plain [`Descriptor`] values is reconciled
//! against a tree of persistent, stateful facades:
//!
//! - **Facades**: nodes with an explicit property schema and lifecycle hooks,
//!   kept in a generational arena so destroyed ids never resolve again
//! - **Reconciliation**: keyed, minimal-diff updates; lists diff by key
//! - **Events**: per-facade listeners with bubbling through parent links
//! - **Transitions**: property changes animated by duration or spring tweens
//! - **World**: the frame loop tying tweens, worker results, reconciliation,
//!   frame systems and the renderer together
//!
//! # Example
//!
//! ```rust
//! use troika_core::{Descriptor, RecordingRenderer, TroikaConfig, World, OBJECT_3D};
//!
//! let mut world = World::new(&TroikaConfig::default(), RecordingRenderer::new());
//! world.set_scene(Descriptor::new(OBJECT_3D).key("box").prop("x", 2.0));
//! let frame = world.tick(0.0).unwrap();
//! assert!(frame.rendered);
//! ```

pub mod config;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod facade;
pub mod list;
pub mod math;
pub mod object3d;
pub mod renderer;
pub mod transition;
pub mod tree;
pub mod world;

pub use config::{FrameConfig, PhysicsConfig, TroikaConfig};
pub use descriptor::{Children, Descriptor, Key, ListTemplate};
pub use error::{ConfigError, FacadeError, Result};
pub use events::{event_types, Event, Listener, ListenerId};
pub use facade::{
    expect_bool, expect_f64, expect_str, Capability, ChangeCategory, Facade, FacadeContext,
    FacadeKind, FrameRequests, PropertyError, TRANSFORM,
};
pub use list::LIST;
pub use math::{Mat4, Quat, RotationOrder, Vec3};
pub use object3d::{Object3D, Object3DFacade, GROUP, OBJECT_3D};
pub use renderer::{RecordingRenderer, RenderCall, SceneRenderer};
pub use transition::{AnimatedWrite, TransitionRequest, TransitionSpec, Transitions};
pub use tree::{FacadeId, FacadeTree, Lifecycle, Notification, PassStats};
pub use world::{FrameOutcome, FrameScheduler, FrameSystem, SystemContext, World};
