//! Persistence collaborator.
//!
//! The engine reads and writes workflows, execution statuses and case
//! subscriptions through the [`Store`] trait. [`MemoryStore`] keeps
//! everything in process.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::case::CaseSubscription;
use crate::engine::state::{ActionStatus, WorkflowState, WorkflowStatus};
use crate::error::EngineResult;
use crate::model::Workflow;

#[async_trait]
pub trait Store: Send + Sync {
    // Workflows

    /// Insert or replace a workflow definition.
    async fn save_workflow(&self, workflow: Workflow) -> EngineResult<()>;

    /// Load a copy of a workflow definition. Registry bindings are not
    /// part of the stored record.
    async fn load_workflow(&self, workflow_id: Uuid) -> EngineResult<Option<Workflow>>;

    async fn workflow_exists(&self, workflow_id: Uuid) -> EngineResult<bool>;

    // Execution statuses

    /// Store a new status record. Fails if the execution id exists.
    async fn create_status(&self, status: WorkflowStatus) -> EngineResult<()>;

    /// Apply a state transition and return the updated record.
    ///
    /// The transition is checked against the state machine under the
    /// store's lock, so concurrent writers see exactly one winner.
    async fn transition(
        &self,
        execution_id: Uuid,
        to: WorkflowState,
        reason: Option<String>,
    ) -> EngineResult<WorkflowStatus>;

    /// Append to an execution's action history.
    async fn append_action(&self, execution_id: Uuid, action: ActionStatus) -> EngineResult<()>;

    async fn get_status(&self, execution_id: Uuid) -> EngineResult<Option<WorkflowStatus>>;

    async fn execution_exists(&self, execution_id: Uuid) -> EngineResult<bool>;

    /// Statuses in any of `states`, ordered by start time, at most `limit`.
    async fn statuses_in(
        &self,
        states: &[WorkflowState],
        limit: Option<usize>,
    ) -> EngineResult<Vec<WorkflowStatus>>;

    // Case subscriptions

    /// Insert or replace a case subscription by name.
    async fn save_case_subscription(&self, case: CaseSubscription) -> EngineResult<()>;

    /// Delete a case subscription. Returns whether it existed.
    async fn delete_case_subscription(&self, name: &str) -> EngineResult<bool>;

    async fn case_subscriptions(&self) -> EngineResult<Vec<CaseSubscription>>;
}
