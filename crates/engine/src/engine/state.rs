//! Workflow and action status state machine.
//!
//! ```text
//! pending -> running <-> paused
//!            running <-> awaiting_data
//!            running  -> completed
//! {pending, running, paused, awaiting_data} -> aborted
//! ```
//!
//! `completed` and `aborted` are terminal: no further transitions and no
//! further history entries are accepted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use branchline_apps::ArgumentMap;

use crate::error::{EngineError, EngineResult};

/// Status of one workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Pending,
    Running,
    Paused,
    AwaitingData,
    Completed,
    Aborted,
}

impl WorkflowState {
    /// States listed first by the status overview.
    pub const ACTIVE: [WorkflowState; 3] = [Self::Running, Self::Paused, Self::AwaitingData];

    pub const TERMINAL: [WorkflowState; 2] = [Self::Completed, Self::Aborted];

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn can_transition_to(&self, to: WorkflowState) -> bool {
        use WorkflowState::*;
        matches!(
            (self, to),
            (Pending, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, AwaitingData)
                | (AwaitingData, Running)
                | (Running, Completed)
                | (Pending, Aborted)
                | (Running, Aborted)
                | (Paused, Aborted)
                | (AwaitingData, Aborted)
        )
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::AwaitingData => write!(f, "awaiting_data"),
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Outcome of one action invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    Success,
    Failure,
    AwaitingData,
}

impl std::fmt::Display for ActionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::AwaitingData => write!(f, "awaiting_data"),
        }
    }
}

/// Append-only record of one action invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStatus {
    pub action_id: String,
    pub app_name: String,
    pub action_name: String,
    pub status: ActionState,
    /// Validated input map.
    #[serde(default)]
    pub arguments: ArgumentMap,
    #[serde(default)]
    pub result: Value,
    pub timestamp: DateTime<Utc>,
}

impl ActionStatus {
    pub fn new(
        action_id: impl Into<String>,
        app_name: impl Into<String>,
        action_name: impl Into<String>,
        status: ActionState,
    ) -> Self {
        Self {
            action_id: action_id.into(),
            app_name: app_name.into(),
            action_name: action_name.into(),
            status,
            arguments: ArgumentMap::new(),
            result: Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn with_arguments(mut self, arguments: ArgumentMap) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = result;
        self
    }
}

/// Status record of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub name: String,
    pub status: WorkflowState,
    pub accepted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub action_history: Vec<ActionStatus>,
}

impl WorkflowStatus {
    /// A freshly accepted execution.
    pub fn pending(execution_id: Uuid, workflow_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            execution_id,
            workflow_id,
            name: name.into(),
            status: WorkflowState::Pending,
            accepted_at: Utc::now(),
            started_at: None,
            completed_at: None,
            failure_reason: None,
            action_history: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a transition. `reason` is recorded when aborting.
    pub fn transition(&mut self, to: WorkflowState, reason: Option<String>) -> EngineResult<()> {
        if self.status.is_terminal() {
            return Err(EngineError::Terminal(self.execution_id));
        }
        if !self.status.can_transition_to(to) {
            return Err(EngineError::InvalidTransition {
                from: self.status,
                to,
            });
        }

        let now = Utc::now();
        if to == WorkflowState::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if to.is_terminal() {
            self.completed_at = Some(now);
        }
        if to == WorkflowState::Aborted {
            self.failure_reason = reason;
        }
        self.status = to;
        Ok(())
    }

    /// Append to the action history.
    pub fn append(&mut self, action: ActionStatus) -> EngineResult<()> {
        if self.status.is_terminal() {
            return Err(EngineError::Terminal(self.execution_id));
        }
        self.action_history.push(action);
        Ok(())
    }

    /// Most recent history entry.
    pub fn current_action(&self) -> Option<&ActionStatus> {
        self.action_history.last()
    }

    /// Ordering key for overviews: start time, acceptance time otherwise.
    pub fn sort_key(&self) -> DateTime<Utc> {
        self.started_at.unwrap_or(self.accepted_at)
    }
}
