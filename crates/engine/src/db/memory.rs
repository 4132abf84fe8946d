//! In-memory store.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::case::CaseSubscription;
use crate::db::Store;
use crate::engine::state::{ActionStatus, WorkflowState, WorkflowStatus};
use crate::error::{EngineError, EngineResult};
use crate::model::Workflow;

/// Store keeping every record in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    workflows: RwLock<HashMap<Uuid, Workflow>>,
    statuses: RwLock<HashMap<Uuid, WorkflowStatus>>,
    cases: RwLock<Vec<CaseSubscription>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored status records.
    pub async fn status_count(&self) -> usize {
        self.statuses.read().await.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_workflow(&self, mut workflow: Workflow) -> EngineResult<()> {
        for action in &mut workflow.actions {
            action.binding = None;
        }
        self.workflows.write().await.insert(workflow.id, workflow);
        Ok(())
    }

    async fn load_workflow(&self, workflow_id: Uuid) -> EngineResult<Option<Workflow>> {
        Ok(self.workflows.read().await.get(&workflow_id).cloned())
    }

    async fn workflow_exists(&self, workflow_id: Uuid) -> EngineResult<bool> {
        Ok(self.workflows.read().await.contains_key(&workflow_id))
    }

    async fn create_status(&self, status: WorkflowStatus) -> EngineResult<()> {
        let mut statuses = self.statuses.write().await;
        if statuses.contains_key(&status.execution_id) {
            return Err(EngineError::Infrastructure(format!(
                "execution {} already exists",
                status.execution_id
            )));
        }
        statuses.insert(status.execution_id, status);
        Ok(())
    }

    async fn transition(
        &self,
        execution_id: Uuid,
        to: WorkflowState,
        reason: Option<String>,
    ) -> EngineResult<WorkflowStatus> {
        let mut statuses = self.statuses.write().await;
        let status = statuses
            .get_mut(&execution_id)
            .ok_or_else(|| EngineError::NotFound(format!("execution {}", execution_id)))?;
        status.transition(to, reason)?;
        Ok(status.clone())
    }

    async fn append_action(&self, execution_id: Uuid, action: ActionStatus) -> EngineResult<()> {
        let mut statuses = self.statuses.write().await;
        let status = statuses
            .get_mut(&execution_id)
            .ok_or_else(|| EngineError::NotFound(format!("execution {}", execution_id)))?;
        status.append(action)
    }

    async fn get_status(&self, execution_id: Uuid) -> EngineResult<Option<WorkflowStatus>> {
        Ok(self.statuses.read().await.get(&execution_id).cloned())
    }

    async fn execution_exists(&self, execution_id: Uuid) -> EngineResult<bool> {
        Ok(self.statuses.read().await.contains_key(&execution_id))
    }

    async fn statuses_in(
        &self,
        states: &[WorkflowState],
        limit: Option<usize>,
    ) -> EngineResult<Vec<WorkflowStatus>> {
        let statuses = self.statuses.read().await;
        let mut matching: Vec<WorkflowStatus> = statuses
            .values()
            .filter(|s| states.contains(&s.status))
            .cloned()
            .collect();
        matching.sort_by_key(|s| (s.sort_key(), s.execution_id));
        if let Some(limit) = limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }

    async fn save_case_subscription(&self, case: CaseSubscription) -> EngineResult<()> {
        let mut cases = self.cases.write().await;
        match cases.iter_mut().find(|c| c.name == case.name) {
            Some(existing) => *existing = case,
            None => cases.push(case),
        }
        Ok(())
    }

    async fn delete_case_subscription(&self, name: &str) -> EngineResult<bool> {
        let mut cases = self.cases.write().await;
        let before = cases.len();
        cases.retain(|c| c.name != name);
        Ok(cases.len() != before)
    }

    async fn case_subscriptions(&self) -> EngineResult<Vec<CaseSubscription>> {
        Ok(self.cases.read().await.clone())
    }
}
