//! Typed wrappers over JSON worker modules

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::WorkerError;
use crate::module::WorkerModule;
use crate::registry::WorkerRegistry;
use crate::thenable::Thenable;

/// A worker module with typed arguments and result
///
/// Arguments are serialized to JSON before crossing to the worker and the
/// result is deserialized on delivery; conversion failures reject the
/// returned thenable with [`WorkerError::Serialization`].
pub struct TypedWorkerModule<A, R> {
    module: WorkerModule,
    _marker: PhantomData<fn(A) -> R>,
}

impl<A, R> Clone for TypedWorkerModule<A, R> {
    fn clone(&self) -> Self {
        Self {
            module: self.module.clone(),
            _marker: PhantomData,
        }
    }
}

impl<A, R> std::fmt::Debug for TypedWorkerModule<A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TypedWorkerModule").field(&self.module).finish()
    }
}

impl<A, R> TypedWorkerModule<A, R>
where
    A: Serialize,
    R: DeserializeOwned + Clone + Send + 'static,
{
    pub fn new(module: WorkerModule) -> Self {
        Self {
            module,
            _marker: PhantomData,
        }
    }

    pub fn module(&self) -> &WorkerModule {
        &self.module
    }

    pub fn call(&self, registry: &WorkerRegistry, args: &A) -> Thenable<R> {
        let args = match serde_json::to_value(args) {
            Ok(args) => args,
            Err(error) => return Thenable::rejected(WorkerError::from(error)),
        };
        self.module
            .call(registry, args)
            .then_try(|value| serde_json::from_value(value).map_err(WorkerError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{define_worker_module, ModuleDeps, ModuleInstance, WorkerModuleOptions};
    use crate::registry::RegistryConfig;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Serialize)]
    struct Point {
        x: f64,
        y: f64,
    }

    #[derive(Clone, Debug, PartialEq, Deserialize)]
    struct Length {
        length: f64,
    }

    fn init_length(_deps: &ModuleDeps) -> Result<ModuleInstance, String> {
        Ok(ModuleInstance::function(|args| {
            let x = args["x"].as_f64().unwrap_or(0.0);
            let y = args["y"].as_f64().unwrap_or(0.0);
            Ok(json!({ "length": (x * x + y * y).sqrt() }))
        }))
    }

    fn init_wrong_shape(_deps: &ModuleDeps) -> Result<ModuleInstance, String> {
        Ok(ModuleInstance::function(|_| Ok(json!("not a length"))))
    }

    #[test]
    fn test_typed_round_trip() {
        let registry = WorkerRegistry::new(RegistryConfig::main_thread());
        let module: TypedWorkerModule<Point, Length> =
            TypedWorkerModule::new(define_worker_module(WorkerModuleOptions::new("length", init_length)));

        let result = module.call(&registry, &Point { x: 3.0, y: 4.0 });
        registry.pump();
        assert_eq!(result.try_result(), Some(Ok(Length { length: 5.0 })));
    }

    #[test]
    fn test_result_shape_mismatch_rejects() {
        let registry = WorkerRegistry::new(RegistryConfig::main_thread());
        let module: TypedWorkerModule<Point, Length> = TypedWorkerModule::new(define_worker_module(
            WorkerModuleOptions::new("wrong", init_wrong_shape),
        ));

        let result = module.call(&registry, &Point { x: 0.0, y: 0.0 });
        registry.pump();
        assert!(matches!(result.try_result(), Some(Err(WorkerError::Serialization(_)))));
    }
}
