//! Messages exchanged with worker threads
//!
//! Requests carry a message id, an action and the action's data. Every
//! request except [`WorkerAction::Terminate`] is answered by exactly one
//! [`WorkerResponse`] carrying the same id.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::module::{ModuleId, ModuleInit};

/// Registration data for one module
#[derive(Clone)]
pub struct ModuleRegistration {
    pub module_id: ModuleId,
    pub name: &'static str,
    /// Modules that must already be registered on the same worker
    pub dependency_ids: Vec<ModuleId>,
    pub init: ModuleInit,
}

impl fmt::Debug for ModuleRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistration")
            .field("module_id", &self.module_id)
            .field("name", &self.name)
            .field("dependency_ids", &self.dependency_ids)
            .finish()
    }
}

/// Invocation data for one call
#[derive(Clone, Debug)]
pub struct ModuleCall {
    pub module_id: ModuleId,
    pub args: Value,
}

/// What the worker should do with a request
#[derive(Clone, Debug)]
pub enum WorkerAction {
    RegisterModule(ModuleRegistration),
    CallModule(ModuleCall),
    /// Stop the worker loop; not answered
    Terminate,
}

impl WorkerAction {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerAction::RegisterModule(_) => "registerModule",
            WorkerAction::CallModule(_) => "callModule",
            WorkerAction::Terminate => "terminate",
        }
    }
}

/// Message sent to a worker
#[derive(Clone, Debug)]
pub struct WorkerRequest {
    pub message_id: u64,
    pub action: WorkerAction,
}

/// Message posted back by a worker
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResponse {
    pub message_id: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerResponse {
    pub fn ok(message_id: u64, result: Value) -> Self {
        Self {
            message_id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(message_id: u64, error: impl Into<String>) -> Self {
        Self {
            message_id,
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_wire_shape() {
        let ok = serde_json::to_value(WorkerResponse::ok(7, json!({"a": 1}))).unwrap();
        assert_eq!(ok, json!({"messageId": 7, "success": true, "result": {"a": 1}}));

        let err = serde_json::to_value(WorkerResponse::err(8, "bad")).unwrap();
        assert_eq!(err, json!({"messageId": 8, "success": false, "error": "bad"}));
    }
}
