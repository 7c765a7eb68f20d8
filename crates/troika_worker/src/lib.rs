//! Troika Worker Modules
//!
//! Offloads computation to persistent worker threads through a small
//! message-passing protocol:
//!
//! - **Thenables**: settle-once, promise-like results that also implement `Future`
//! - **Worker Modules**: named units of work with dependencies, registered lazily
//!   and at most once per worker
//! - **Registry**: owns worker threads, correlates responses by message id and
//!   warns when requests appear to leak
//! - **Main-thread fallback**: the same API runs modules locally when worker
//!   threads are unavailable, still settling results asynchronously
//!
//! Worker-side failures (errors or panics in `init` or in a call) reject only
//! the thenable of the request that caused them.

pub mod error;
mod host;
pub mod module;
pub mod protocol;
pub mod registry;
pub mod thenable;
pub mod typed;

pub use error::{Result, WorkerError};
pub use module::{
    define_worker_module, Dependency, ModuleDeps, ModuleId, ModuleInit, ModuleInstance, WorkerId,
    WorkerModule, WorkerModuleOptions,
};
pub use protocol::{ModuleCall, ModuleRegistration, WorkerAction, WorkerRequest, WorkerResponse};
pub use registry::{ExecutionMode, RegistryConfig, WorkerRegistry, DEFAULT_LEAK_WARNING_THRESHOLD};
pub use thenable::{Outcome, Resolver, Thenable};
pub use typed::TypedWorkerModule;
