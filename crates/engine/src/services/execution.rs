//! Execution status queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Store;
use crate::engine::state::{ActionStatus, WorkflowState, WorkflowStatus};
use crate::error::EngineResult;

/// Execution status as reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusView {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub name: String,
    pub status: WorkflowState,
    pub accepted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Most recent history entry.
    pub current_action: Option<ActionStatus>,
    /// Present only when the full history was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_history: Option<Vec<ActionStatus>>,
}

impl StatusView {
    pub fn from_status(status: WorkflowStatus, full_history: bool) -> Self {
        let current_action = status.current_action().cloned();
        Self {
            execution_id: status.execution_id,
            workflow_id: status.workflow_id,
            name: status.name,
            status: status.status,
            accepted_at: status.accepted_at,
            started_at: status.started_at,
            completed_at: status.completed_at,
            failure_reason: status.failure_reason,
            current_action,
            action_history: full_history.then_some(status.action_history),
        }
    }
}

/// Status of one execution, optionally with its full action history.
pub async fn get_workflow_status(
    store: &dyn Store,
    execution_id: Uuid,
    full_history: bool,
) -> EngineResult<Option<StatusView>> {
    Ok(store
        .get_status(execution_id)
        .await?
        .map(|status| StatusView::from_status(status, full_history)))
}

/// Overview of executions.
///
/// Running, paused and awaiting-data executions are always listed in full,
/// ordered by start time. Completed and aborted executions follow, ordered
/// by start time, filling what remains of `limit`.
pub async fn get_all_workflow_statuses(
    store: &dyn Store,
    limit: usize,
) -> EngineResult<Vec<StatusView>> {
    let active = store.statuses_in(&WorkflowState::ACTIVE, None).await?;
    let remaining = limit.saturating_sub(active.len());
    let finished = if remaining > 0 {
        store
            .statuses_in(&WorkflowState::TERMINAL, Some(remaining))
            .await?
    } else {
        Vec::new()
    };

    Ok(active
        .into_iter()
        .chain(finished)
        .map(|status| StatusView::from_status(status, false))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::engine::state::ActionState;

    async fn add(store: &MemoryStore, path: &[WorkflowState]) -> Uuid {
        let status = WorkflowStatus::pending(Uuid::new_v4(), Uuid::new_v4(), "wf");
        let id = status.execution_id;
        store.create_status(status).await.unwrap();
        for state in path {
            store.transition(id, *state, None).await.unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        id
    }

    #[tokio::test]
    async fn test_get_workflow_status_history() {
        let store = MemoryStore::new();
        let id = add(&store, &[WorkflowState::Running]).await;
        for action in ["a", "b"] {
            store
                .append_action(id, ActionStatus::new(action, "builtin", "echo", ActionState::Success))
                .await
                .unwrap();
        }

        let brief = get_workflow_status(&store, id, false).await.unwrap().unwrap();
        assert!(brief.action_history.is_none());
        assert_eq!(brief.current_action.unwrap().action_id, "b");

        let full = get_workflow_status(&store, id, true).await.unwrap().unwrap();
        assert_eq!(full.action_history.unwrap().len(), 2);

        assert!(get_workflow_status(&store, Uuid::new_v4(), true)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_overview_order_and_quota() {
        use WorkflowState::*;
        let store = MemoryStore::new();
        let done1 = add(&store, &[Running, Completed]).await;
        let running = add(&store, &[Running]).await;
        let done2 = add(&store, &[Running, Aborted]).await;
        let paused = add(&store, &[Running, Paused]).await;
        let _pending = add(&store, &[]).await;

        let all = get_all_workflow_statuses(&store, 10).await.unwrap();
        let ids: Vec<Uuid> = all.iter().map(|s| s.execution_id).collect();
        assert_eq!(ids, vec![running, paused, done1, done2]);

        let limited = get_all_workflow_statuses(&store, 3).await.unwrap();
        let ids: Vec<Uuid> = limited.iter().map(|s| s.execution_id).collect();
        assert_eq!(ids, vec![running, paused, done1]);

        // Active executions are never cut by the limit.
        let tight = get_all_workflow_statuses(&store, 1).await.unwrap();
        assert_eq!(tight.len(), 2);
    }
}
