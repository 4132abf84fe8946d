//! Local execution of one workflow.
//!
//! Starts an in-process worker pool over a memory store, submits the
//! workflow and follows the execution until it finishes, delivering
//! `--data` when it asks for input.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use branchline_apps::create_default_registry;
use branchline_engine::case::{CaseRouter, CaseSubscription, Subscription};
use branchline_engine::db::{MemoryStore, Store};
use branchline_engine::engine::{WorkflowState, WorkflowStatus};
use branchline_engine::events::{EventKind, TracingSink};
use branchline_engine::model::{Argument, Workflow};
use branchline_engine::services::StatusView;
use branchline_worker_pool::{ExecutionController, PoolConfig};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Case that `--watch` subscriptions are stored under.
const WATCH_CASE: &str = "branchctl";

#[derive(Debug)]
pub struct RunOptions {
    pub workers: Option<usize>,
    pub start: Option<String>,
    pub arguments: Vec<Argument>,
    pub data: Option<Value>,
    pub watch: Vec<String>,
    pub timeout: Duration,
}

pub async fn run(workflow: Workflow, options: RunOptions) -> Result<()> {
    let mut config = PoolConfig::from_env().context("Failed to load pool configuration")?;
    if let Some(workers) = options.workers {
        config = config.with_workers(workers);
    }

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let router = Arc::new(CaseRouter::new(store.clone(), Arc::new(TracingSink)));
    if !options.watch.is_empty() {
        store.save_case_subscription(watch_case(&options.watch)).await?;
        router.sync_to_subscriptions().await?;
    }

    let controller = ExecutionController::start(
        config,
        Arc::new(create_default_registry()),
        store,
        router,
    )?;
    let workflow_id = controller.save_workflow(workflow).await?;
    let execution_id = controller
        .execute_workflow(workflow_id, options.start, options.arguments)
        .await?;
    tracing::info!(%execution_id, %workflow_id, "Execution submitted");

    let outcome = tokio::select! {
        result = follow(&controller, execution_id, options.data, options.timeout) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(%execution_id, "Interrupted, aborting execution");
            controller.abort_workflow(execution_id).await;
            Err(anyhow!("interrupted"))
        }
    };
    controller.shutdown().await;

    let status = outcome?;
    let state = status.status;
    let reason = status.failure_reason.clone();
    println!(
        "{}",
        serde_json::to_string_pretty(&StatusView::from_status(status, true))?
    );
    if state == WorkflowState::Aborted {
        bail!(
            "execution {} aborted: {}",
            execution_id,
            reason.unwrap_or_else(|| "no reason recorded".to_string())
        );
    }
    Ok(())
}

/// Poll until the execution is terminal, answering one data request with
/// `data`.
async fn follow(
    controller: &ExecutionController,
    execution_id: Uuid,
    mut data: Option<Value>,
    timeout: Duration,
) -> Result<WorkflowStatus> {
    let deadline = Instant::now() + timeout;
    // History length at the wait that was answered.
    let mut answered: Option<usize> = None;
    loop {
        let status = controller
            .store()
            .get_status(execution_id)
            .await?
            .context("Execution status disappeared")?;
        if status.is_terminal() {
            return Ok(status);
        }
        if status.status == WorkflowState::AwaitingData
            && answered != Some(status.action_history.len())
        {
            let Some(value) = data.take() else {
                bail!(
                    "execution {} is waiting for data; pass it with --data",
                    execution_id
                );
            };
            tracing::info!(%execution_id, "Delivering data");
            controller.send_data(execution_id, value).await;
            answered = Some(status.action_history.len());
        }
        if Instant::now() >= deadline {
            bail!(
                "execution {} did not finish within {:?} (status: {})",
                execution_id,
                timeout,
                status.status
            );
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn watch_case(entities: &[String]) -> CaseSubscription {
    let events: Vec<&str> = EventKind::ALL.iter().map(|kind| kind.as_str()).collect();
    entities.iter().fold(
        CaseSubscription::new(WATCH_CASE).with_note("entities watched from the command line"),
        |case, entity| case.with_subscription(Subscription::new(entity.clone(), events.clone())),
    )
}
