//! Execution events.
//!
//! Every step of a workflow walk emits an [`ExecutionEvent`] naming the
//! entity it concerns (workflow, action, branch, expression, condition or
//! transform id). The case router matches events against subscriptions
//! and forwards them to an [`EventSink`].

pub mod sink;

pub use sink::{EventSink, MemorySink, TracingSink};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Event names. Serialized in snake_case; these are the names case
/// subscriptions list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    WorkflowExecutionStart,
    WorkflowPaused,
    WorkflowResumed,
    WorkflowAborted,
    WorkflowCompleted,
    ActionStarted,
    ActionExecutionSuccess,
    ActionExecutionError,
    ActionArgumentsInvalid,
    ActionAwaitingData,
    BranchTaken,
    BranchNotTaken,
    ConditionSuccess,
    ConditionError,
    ConditionalExpressionTrue,
    ConditionalExpressionFalse,
    ConditionalExpressionError,
    TransformSuccess,
    TransformError,
}

impl EventKind {
    pub const ALL: [EventKind; 19] = [
        Self::WorkflowExecutionStart,
        Self::WorkflowPaused,
        Self::WorkflowResumed,
        Self::WorkflowAborted,
        Self::WorkflowCompleted,
        Self::ActionStarted,
        Self::ActionExecutionSuccess,
        Self::ActionExecutionError,
        Self::ActionArgumentsInvalid,
        Self::ActionAwaitingData,
        Self::BranchTaken,
        Self::BranchNotTaken,
        Self::ConditionSuccess,
        Self::ConditionError,
        Self::ConditionalExpressionTrue,
        Self::ConditionalExpressionFalse,
        Self::ConditionalExpressionError,
        Self::TransformSuccess,
        Self::TransformError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkflowExecutionStart => "workflow_execution_start",
            Self::WorkflowPaused => "workflow_paused",
            Self::WorkflowResumed => "workflow_resumed",
            Self::WorkflowAborted => "workflow_aborted",
            Self::WorkflowCompleted => "workflow_completed",
            Self::ActionStarted => "action_started",
            Self::ActionExecutionSuccess => "action_execution_success",
            Self::ActionExecutionError => "action_execution_error",
            Self::ActionArgumentsInvalid => "action_arguments_invalid",
            Self::ActionAwaitingData => "action_awaiting_data",
            Self::BranchTaken => "branch_taken",
            Self::BranchNotTaken => "branch_not_taken",
            Self::ConditionSuccess => "condition_success",
            Self::ConditionError => "condition_error",
            Self::ConditionalExpressionTrue => "conditional_expression_true",
            Self::ConditionalExpressionFalse => "conditional_expression_false",
            Self::ConditionalExpressionError => "conditional_expression_error",
            Self::TransformSuccess => "transform_success",
            Self::TransformError => "transform_error",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One emitted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    /// Id of the entity the event concerns.
    pub entity_id: String,
    pub event: EventKind,
    pub execution_id: Uuid,
    #[serde(default)]
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionEvent {
    pub fn new(
        execution_id: Uuid,
        entity_id: impl Into<String>,
        event: EventKind,
        payload: Value,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            event,
            execution_id,
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Events collected during one synchronous evaluation step.
#[derive(Debug, Clone)]
pub struct EventLog {
    execution_id: Uuid,
    events: Vec<ExecutionEvent>,
}

impl EventLog {
    pub fn new(execution_id: Uuid) -> Self {
        Self {
            execution_id,
            events: Vec::new(),
        }
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    pub fn push(&mut self, entity_id: impl Into<String>, event: EventKind, payload: Value) {
        self.events
            .push(ExecutionEvent::new(self.execution_id, entity_id, event, payload));
    }

    /// Names of the collected events, in order.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.iter().map(|e| e.event).collect()
    }

    pub fn events(&self) -> &[ExecutionEvent] {
        &self.events
    }

    pub fn take(&mut self) -> Vec<ExecutionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
