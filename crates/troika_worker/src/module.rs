//! Worker module definitions
//!
//! A worker module is a named unit of deferred computation: an `init`
//! function that realizes the module on the worker (given its realized
//! dependencies) plus the list of those dependencies. Modules are
//! registered lazily the first time they are called.
//!
//! `init` is a plain function pointer so that it can be shipped to a worker
//! thread inside the registration message; the worker never receives
//! executable source, only a reference to statically compiled code.
//!
//! # Example
//!
//! ```rust
//! use serde_json::{json, Value};
//! use troika_worker::{define_worker_module, ModuleDeps, ModuleInstance, WorkerModuleOptions};
//!
//! fn init_double(_deps: &ModuleDeps) -> Result<ModuleInstance, String> {
//!     Ok(ModuleInstance::function(|args: Value| {
//!         let n = args.as_f64().ok_or("expected a number")?;
//!         Ok(json!(n * 2.0))
//!     }))
//! }
//!
//! let double = define_worker_module(WorkerModuleOptions::new("double", init_double));
//! assert_eq!(double.name(), "double");
//! ```

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::registry::WorkerRegistry;
use crate::thenable::Thenable;

/// Identifier of the worker thread a module runs on
///
/// Modules with different worker ids never share registration or state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub &'static str);

impl WorkerId {
    /// The shared general-purpose worker
    pub const DEFAULT: WorkerId = WorkerId("troika");

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Process-unique identifier of a defined module
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u64);

impl ModuleId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ModuleId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn to_raw(self) -> u64 {
        self.0
    }
}

/// Function realizing a module on the worker
pub type ModuleInit = fn(&ModuleDeps) -> Result<ModuleInstance, String>;

type CallFn = dyn Fn(Value) -> Result<Value, String> + Send + Sync;

/// A realized module living on a worker
///
/// A module may be callable (a function of JSON arguments), may expose a
/// typed service object to dependent modules, or both.
#[derive(Clone, Default)]
pub struct ModuleInstance {
    call: Option<Arc<CallFn>>,
    service: Option<Arc<dyn Any + Send + Sync>>,
}

impl ModuleInstance {
    /// A callable module
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            call: Some(Arc::new(f)),
            service: None,
        }
    }

    /// A non-callable module exposing a service to its dependents
    pub fn service<S: Any + Send + Sync>(service: S) -> Self {
        Self {
            call: None,
            service: Some(Arc::new(service)),
        }
    }

    /// Attach a service to a callable module
    pub fn with_service<S: Any + Send + Sync>(mut self, service: S) -> Self {
        self.service = Some(Arc::new(service));
        self
    }

    pub fn is_callable(&self) -> bool {
        self.call.is_some()
    }

    /// Downcast the attached service
    pub fn service_ref<S: Any + Send + Sync>(&self) -> Option<Arc<S>> {
        self.service
            .as_ref()
            .and_then(|service| Arc::clone(service).downcast::<S>().ok())
    }

    /// Invoke the module function
    pub fn invoke(&self, args: Value) -> Result<Value, String> {
        match &self.call {
            Some(call) => call(args),
            None => Err("module is not callable".to_string()),
        }
    }
}

impl fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInstance")
            .field("callable", &self.call.is_some())
            .field("service", &self.service.is_some())
            .finish()
    }
}

/// Realized dependencies handed to a module's `init`, in declaration order
#[derive(Debug, Default)]
pub struct ModuleDeps {
    instances: Vec<ModuleInstance>,
}

impl ModuleDeps {
    pub(crate) fn new(instances: Vec<ModuleInstance>) -> Self {
        Self { instances }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ModuleInstance> {
        self.instances.get(index)
    }

    /// Typed service of the dependency at `index`
    pub fn service<S: Any + Send + Sync>(&self, index: usize) -> Result<Arc<S>, String> {
        self.get(index)
            .and_then(|instance| instance.service_ref::<S>())
            .ok_or_else(|| {
                format!(
                    "dependency {index} does not provide a `{}` service",
                    std::any::type_name::<S>()
                )
            })
    }
}

/// A dependency of a worker module
#[derive(Clone)]
pub enum Dependency {
    /// Another defined module
    Module(WorkerModule),
    /// A bare init function, wrapped as a zero-dependency module
    Function(&'static str, ModuleInit),
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Module(module) => f.debug_tuple("Module").field(module).finish(),
            Dependency::Function(name, _) => f.debug_tuple("Function").field(name).finish(),
        }
    }
}

impl From<WorkerModule> for Dependency {
    fn from(module: WorkerModule) -> Self {
        Dependency::Module(module)
    }
}

impl From<&WorkerModule> for Dependency {
    fn from(module: &WorkerModule) -> Self {
        Dependency::Module(module.clone())
    }
}

/// Options for [`define_worker_module`]
#[derive(Clone)]
pub struct WorkerModuleOptions {
    pub name: &'static str,
    pub worker_id: WorkerId,
    pub dependencies: Vec<Dependency>,
    pub init: ModuleInit,
}

impl WorkerModuleOptions {
    pub fn new(name: &'static str, init: ModuleInit) -> Self {
        Self {
            name,
            worker_id: WorkerId::DEFAULT,
            dependencies: Vec::new(),
            init,
        }
    }

    pub fn worker(mut self, worker_id: WorkerId) -> Self {
        self.worker_id = worker_id;
        self
    }

    pub fn dependency(mut self, dependency: impl Into<Dependency>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }
}

struct ModuleDef {
    id: ModuleId,
    name: &'static str,
    worker_id: WorkerId,
    dependencies: Vec<WorkerModule>,
    init: ModuleInit,
}

/// Handle to a defined worker module (cheap to clone)
#[derive(Clone)]
pub struct WorkerModule {
    def: Arc<ModuleDef>,
}

impl fmt::Debug for WorkerModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerModule")
            .field("id", &self.def.id)
            .field("name", &self.def.name)
            .field("worker_id", &self.def.worker_id)
            .field("dependencies", &self.def.dependencies.len())
            .finish()
    }
}

/// Define a worker module
///
/// Bare function dependencies are wrapped into zero-dependency modules that
/// share the defining module's worker.
pub fn define_worker_module(options: WorkerModuleOptions) -> WorkerModule {
    let worker_id = options.worker_id;
    let dependencies = options
        .dependencies
        .into_iter()
        .map(|dependency| match dependency {
            Dependency::Module(module) => module,
            Dependency::Function(name, init) => {
                define_worker_module(WorkerModuleOptions::new(name, init).worker(worker_id))
            }
        })
        .collect();

    WorkerModule {
        def: Arc::new(ModuleDef {
            id: ModuleId::next(),
            name: options.name,
            worker_id,
            dependencies,
            init: options.init,
        }),
    }
}

impl WorkerModule {
    pub fn id(&self) -> ModuleId {
        self.def.id
    }

    pub fn name(&self) -> &'static str {
        self.def.name
    }

    pub fn worker_id(&self) -> WorkerId {
        self.def.worker_id
    }

    pub fn dependencies(&self) -> &[WorkerModule] {
        &self.def.dependencies
    }

    pub(crate) fn init(&self) -> ModuleInit {
        self.def.init
    }

    /// Invoke the module through `registry`
    ///
    /// Registers the module (and its dependencies) on first use.
    pub fn call(&self, registry: &WorkerRegistry, args: Value) -> Thenable<Value> {
        registry.call(self, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn init_noop(_deps: &ModuleDeps) -> Result<ModuleInstance, String> {
        Ok(ModuleInstance::function(|_| Ok(Value::Null)))
    }

    #[test]
    fn test_module_ids_are_unique() {
        let a = define_worker_module(WorkerModuleOptions::new("a", init_noop));
        let b = define_worker_module(WorkerModuleOptions::new("a", init_noop));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_function_dependency_is_wrapped_on_same_worker() {
        let module = define_worker_module(
            WorkerModuleOptions::new("outer", init_noop)
                .worker(WorkerId("physics"))
                .dependency(Dependency::Function("inner", init_noop)),
        );
        let deps = module.dependencies();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name(), "inner");
        assert_eq!(deps[0].worker_id(), WorkerId("physics"));
        assert!(deps[0].dependencies().is_empty());
    }

    #[test]
    fn test_service_downcast() {
        let instance = ModuleInstance::service(41u32);
        assert!(!instance.is_callable());
        assert_eq!(instance.service_ref::<u32>().as_deref(), Some(&41));
        assert!(instance.service_ref::<String>().is_none());
        assert!(instance.invoke(json!(1)).is_err());

        let deps = ModuleDeps::new(vec![instance]);
        assert_eq!(*deps.service::<u32>(0).unwrap(), 41);
        assert!(deps.service::<u32>(1).is_err());
    }
}
