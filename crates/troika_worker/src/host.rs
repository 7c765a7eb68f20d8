//! Worker-side module host
//!
//! The host owns every module realized on one worker and answers requests.
//! The same host runs inside a worker thread or, in main-thread fallback
//! mode, directly on the caller's thread.

use std::panic::{self, AssertUnwindSafe};

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::module::{ModuleDeps, ModuleId, ModuleInstance};
use crate::protocol::{ModuleCall, ModuleRegistration, WorkerAction, WorkerRequest, WorkerResponse};

enum Realized {
    Ready(ModuleInstance),
    Failed(String),
}

struct HostedModule {
    name: &'static str,
    realized: Realized,
}

/// Modules realized on a single worker
pub(crate) struct WorkerHost {
    label: String,
    modules: FxHashMap<ModuleId, HostedModule>,
}

impl WorkerHost {
    pub(crate) fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            modules: FxHashMap::default(),
        }
    }

    /// Handle one request; `None` for requests that are not answered
    pub(crate) fn handle(&mut self, request: WorkerRequest) -> Option<WorkerResponse> {
        let id = request.message_id;
        match request.action {
            WorkerAction::RegisterModule(registration) => Some(self.register(id, registration)),
            WorkerAction::CallModule(call) => Some(self.call(id, call)),
            WorkerAction::Terminate => None,
        }
    }

    fn register(&mut self, message_id: u64, registration: ModuleRegistration) -> WorkerResponse {
        if self.modules.contains_key(&registration.module_id) {
            // Already realized on this worker
            return WorkerResponse::ok(message_id, Value::Null);
        }

        let realized = match self.collect_deps(&registration) {
            Ok(deps) => {
                let init = registration.init;
                match panic::catch_unwind(AssertUnwindSafe(|| init(&deps))) {
                    Ok(Ok(instance)) => Realized::Ready(instance),
                    Ok(Err(message)) => Realized::Failed(message),
                    Err(payload) => Realized::Failed(panic_message(payload.as_ref())),
                }
            }
            Err(message) => Realized::Failed(message),
        };

        let response = match &realized {
            Realized::Ready(_) => {
                tracing::debug!(
                    worker = %self.label,
                    module = registration.name,
                    "worker module registered"
                );
                WorkerResponse::ok(message_id, Value::Null)
            }
            Realized::Failed(message) => WorkerResponse::err(message_id, message.clone()),
        };

        self.modules.insert(
            registration.module_id,
            HostedModule {
                name: registration.name,
                realized,
            },
        );
        response
    }

    fn collect_deps(&self, registration: &ModuleRegistration) -> Result<ModuleDeps, String> {
        let mut instances = Vec::with_capacity(registration.dependency_ids.len());
        for dep_id in &registration.dependency_ids {
            match self.modules.get(dep_id) {
                Some(HostedModule {
                    realized: Realized::Ready(instance),
                    ..
                }) => instances.push(instance.clone()),
                Some(HostedModule {
                    name,
                    realized: Realized::Failed(message),
                }) => return Err(format!("dependency `{name}` failed to initialize: {message}")),
                None => {
                    return Err(format!(
                        "dependency {} of `{}` is not registered",
                        dep_id.to_raw(),
                        registration.name
                    ))
                }
            }
        }
        Ok(ModuleDeps::new(instances))
    }

    fn call(&mut self, message_id: u64, call: ModuleCall) -> WorkerResponse {
        let Some(module) = self.modules.get(&call.module_id) else {
            return WorkerResponse::err(
                message_id,
                format!("module {} is not registered", call.module_id.to_raw()),
            );
        };

        let instance = match &module.realized {
            Realized::Ready(instance) => instance,
            Realized::Failed(message) => {
                return WorkerResponse::err(
                    message_id,
                    format!("module `{}` failed to initialize: {message}", module.name),
                )
            }
        };

        let args = call.args;
        match panic::catch_unwind(AssertUnwindSafe(|| instance.invoke(args))) {
            Ok(Ok(result)) => WorkerResponse::ok(message_id, result),
            Ok(Err(message)) => WorkerResponse::err(message_id, message),
            Err(payload) => WorkerResponse::err(message_id, panic_message(payload.as_ref())),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

/// Worker thread main loop
pub(crate) fn run_worker(
    label: String,
    requests: flume::Receiver<WorkerRequest>,
    responses: flume::Sender<WorkerResponse>,
) {
    let mut host = WorkerHost::new(label);
    while let Ok(request) = requests.recv() {
        if matches!(request.action, WorkerAction::Terminate) {
            break;
        }
        if let Some(response) = host.handle(request) {
            if responses.send(response).is_err() {
                // Registry is gone
                break;
            }
        }
    }
    tracing::debug!(worker = %host.label, "worker loop exited");
}
