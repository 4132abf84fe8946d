//! Execution context handed to app implementations.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Running data of one execution, keyed by the id of the action that
/// produced each result.
pub type Accumulator = HashMap<String, Value>;

/// Execution context passed to actions when they are invoked.
///
/// Contains the identity of the running step and a snapshot of the
/// accumulator as it was when the action started.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ActionContext {
    /// Execution (run instance) id.
    pub execution_id: Uuid,

    /// Workflow being executed.
    pub workflow_id: Uuid,

    /// Action currently being invoked.
    pub action_id: String,

    /// Pool worker running the execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<usize>,

    /// Results of previously executed actions.
    #[serde(default)]
    pub accumulator: Accumulator,
}

impl ActionContext {
    /// Create a new action context.
    pub fn new(execution_id: Uuid, workflow_id: Uuid, action_id: impl Into<String>) -> Self {
        Self {
            execution_id,
            workflow_id,
            action_id: action_id.into(),
            worker: None,
            accumulator: Accumulator::new(),
        }
    }

    /// Set the worker index.
    pub fn with_worker(mut self, worker: usize) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Attach an accumulator snapshot.
    pub fn with_accumulator(mut self, accumulator: Accumulator) -> Self {
        self.accumulator = accumulator;
        self
    }

    /// Get the result of a previously executed action.
    pub fn result_of(&self, action_id: &str) -> Option<&Value> {
        self.accumulator.get(action_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_builder() {
        let mut acc = Accumulator::new();
        acc.insert("first".to_string(), serde_json::json!(1));

        let ctx = ActionContext::new(Uuid::new_v4(), Uuid::new_v4(), "second")
            .with_worker(2)
            .with_accumulator(acc);

        assert_eq!(ctx.action_id, "second");
        assert_eq!(ctx.worker, Some(2));
        assert_eq!(ctx.result_of("first"), Some(&serde_json::json!(1)));
        assert!(ctx.result_of("missing").is_none());
    }
}
