//! Execution controller.
//!
//! Owns the worker pool and the channels around it:
//!
//! - an unbounded dispatch queue shared by every worker
//! - a broadcast channel for control commands; workers filter by ownership
//! - a message channel from workers back to the controller, drained by a
//!   single loop that keeps the execution directory and routes events
//!
//! Each worker runs under a supervisor task. A worker that panics is
//! reported, its execution is force-aborted and the slot is respawned.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use branchline_apps::AppRegistry;
use branchline_engine::case::CaseRouter;
use branchline_engine::db::Store;
use branchline_engine::engine::{WorkflowState, WorkflowStatus};
use branchline_engine::events::{EventKind, ExecutionEvent};
use branchline_engine::model::{Argument, Workflow};
use branchline_engine::services::{self, StatusView};
use branchline_engine::{
    DefinitionError, EngineError, EngineResult, OptionResultExt, RaceResultExt, ResultExt,
};

use crate::config::PoolConfig;
use crate::executor::{ExecutionRunner, ABORTED_BY_REQUEST};
use crate::inbox::{ControlInbox, SharedBacklog};
use crate::messages::{
    ControlCommand, ControlMessage, ControlOutcome, ExecutionRequest, WorkerMessage,
};
use crate::worker::{DispatchQueue, Worker};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Execution id -> index of the worker running it.
type Directory = Arc<RwLock<HashMap<Uuid, usize>>>;

/// Accepts executions, dispatches them to the pool and relays control
/// commands.
pub struct ExecutionController {
    config: PoolConfig,
    registry: Arc<AppRegistry>,
    store: Arc<dyn Store>,
    router: Arc<CaseRouter>,
    queue: mpsc::UnboundedSender<ExecutionRequest>,
    control: broadcast::Sender<ControlMessage>,
    shutdown: watch::Sender<bool>,
    backlog: SharedBacklog,
    /// Written only by the message loop.
    directory: Directory,
    supervisors: Mutex<Vec<JoinHandle<()>>>,
    message_loop: Mutex<Option<JoinHandle<()>>>,
}

impl ExecutionController {
    /// Spawn `config.workers` workers. Must be called inside a tokio
    /// runtime.
    pub fn start(
        config: PoolConfig,
        registry: Arc<AppRegistry>,
        store: Arc<dyn Store>,
        router: Arc<CaseRouter>,
    ) -> EngineResult<Self> {
        if config.workers == 0 {
            return Err(EngineError::Infrastructure(
                "worker pool needs at least one worker".to_string(),
            ));
        }

        let (queue, dispatch) = mpsc::unbounded_channel();
        let dispatch: DispatchQueue = Arc::new(Mutex::new(dispatch));
        let (control, _) = broadcast::channel(config.control_capacity.max(1));
        let (shutdown, _) = watch::channel(false);
        let (messages, inbound) = mpsc::unbounded_channel();
        let backlog = SharedBacklog::default();
        let runner = Arc::new(ExecutionRunner::new(
            registry.clone(),
            store.clone(),
            messages.clone(),
        ));

        let supervisors = (0..config.workers)
            .map(|index| {
                tokio::spawn(supervise(
                    index,
                    runner.clone(),
                    dispatch.clone(),
                    control.clone(),
                    backlog.clone(),
                    messages.clone(),
                    shutdown.subscribe(),
                ))
            })
            .collect();

        let directory = Directory::default();
        let message_loop = tokio::spawn(route_messages(
            inbound,
            directory.clone(),
            backlog.clone(),
            store.clone(),
            router.clone(),
        ));

        tracing::info!(
            pool_name = %config.pool_name,
            workers = config.workers,
            "Worker pool started"
        );

        Ok(Self {
            config,
            registry,
            store,
            router,
            queue,
            control,
            shutdown,
            backlog,
            directory,
            supervisors: Mutex::new(supervisors),
            message_loop: Mutex::new(Some(message_loop)),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<AppRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn router(&self) -> &Arc<CaseRouter> {
        &self.router
    }

    /// Resolve `workflow` against the registry and store it.
    pub async fn save_workflow(&self, mut workflow: Workflow) -> EngineResult<Uuid> {
        workflow.resolve(&self.registry)?;
        let workflow_id = workflow.id;
        self.store.save_workflow(workflow).await?;
        tracing::debug!(%workflow_id, "Workflow saved");
        Ok(workflow_id)
    }

    /// Accept an execution of `workflow_id` and queue it.
    ///
    /// `start` names the action to begin at instead of the workflow's start
    /// action; `arguments` override that first action's arguments.
    pub async fn execute_workflow(
        &self,
        workflow_id: Uuid,
        start: Option<String>,
        arguments: Vec<Argument>,
    ) -> EngineResult<Uuid> {
        let workflow = self
            .store
            .load_workflow(workflow_id)
            .await?
            .ok_or(DefinitionError::WorkflowNotFound(workflow_id))?;
        if let Some(action) = &start {
            if !workflow.has_action(action) {
                return Err(DefinitionError::ActionNotFound {
                    workflow: workflow_id,
                    action: action.clone(),
                }
                .into());
            }
        }
        if *self.shutdown.borrow() {
            return Err(EngineError::Infrastructure(
                "worker pool is shut down".to_string(),
            ));
        }

        let execution_id = Uuid::new_v4();
        self.store
            .create_status(WorkflowStatus::pending(
                execution_id,
                workflow_id,
                workflow.name.clone(),
            ))
            .await?;
        self.queue
            .send(ExecutionRequest {
                execution_id,
                workflow_id,
                start,
                arguments,
            })
            .map_err(|_| EngineError::Infrastructure("dispatch queue is closed".to_string()))?;

        tracing::info!(%execution_id, %workflow_id, workflow = %workflow.name, "Execution accepted");
        Ok(execution_id)
    }

    /// Pause a running execution at its next action boundary.
    pub async fn pause_workflow(&self, execution_id: Uuid) -> ControlOutcome {
        self.send_control(execution_id, ControlCommand::Pause).await
    }

    pub async fn resume_workflow(&self, execution_id: Uuid) -> ControlOutcome {
        self.send_control(execution_id, ControlCommand::Resume).await
    }

    /// Abort a non-terminal execution. A running action is interrupted.
    pub async fn abort_workflow(&self, execution_id: Uuid) -> ControlOutcome {
        self.send_control(execution_id, ControlCommand::Abort).await
    }

    /// Deliver input to an execution awaiting data.
    pub async fn send_data(&self, execution_id: Uuid, data: serde_json::Value) -> ControlOutcome {
        self.send_control(execution_id, ControlCommand::Data(data))
            .await
    }

    async fn send_control(&self, execution_id: Uuid, command: ControlCommand) -> ControlOutcome {
        let status = match self
            .store
            .get_status(execution_id)
            .await
            .log(format!("looking up execution {}", execution_id))
        {
            Ok(Some(status)) => status,
            _ => {
                tracing::debug!(%execution_id, %command, "Control command for unknown execution");
                return ControlOutcome::NoOp;
            }
        };

        // Pause and resume take effect at the owner's next boundary, so the
        // stored state can lag behind commands already sent.
        let applies = match &command {
            ControlCommand::Data(_) => status.status == WorkflowState::AwaitingData,
            _ => !status.is_terminal(),
        };
        if !applies {
            tracing::debug!(%execution_id, %command, status = %status.status, "Control command does not apply");
            return ControlOutcome::NoOp;
        }

        if command == ControlCommand::Abort && status.status == WorkflowState::Pending {
            return self.abort_pending(execution_id).await;
        }

        let mut backlog = self.backlog.lock().await;
        if backlog.park(execution_id, command.clone()) {
            tracing::debug!(%execution_id, %command, "Holding control command for queued execution");
            return ControlOutcome::Delivered;
        }
        tracing::debug!(%execution_id, %command, "Broadcasting control command");
        match self.control.send(ControlMessage {
            execution_id,
            command,
        }) {
            Ok(_) => ControlOutcome::Delivered,
            Err(_) => {
                tracing::warn!(%execution_id, "No worker is listening for control commands");
                ControlOutcome::NoOp
            }
        }
    }

    /// Abort a queued execution in place. The worker skips it on dequeue.
    async fn abort_pending(&self, execution_id: Uuid) -> ControlOutcome {
        match self
            .store
            .transition(
                execution_id,
                WorkflowState::Aborted,
                Some(ABORTED_BY_REQUEST.to_string()),
            )
            .await
            .log_race(format!("aborting queued execution {}", execution_id))
        {
            Ok(status) => {
                tracing::info!(%execution_id, "Queued execution aborted");
                let event = ExecutionEvent::new(
                    execution_id,
                    status.workflow_id.to_string(),
                    EventKind::WorkflowAborted,
                    serde_json::json!({"reason": ABORTED_BY_REQUEST}),
                );
                self.router.route(&event).await;
                ControlOutcome::Delivered
            }
            Err(_) => ControlOutcome::NoOp,
        }
    }

    pub async fn get_workflow_status(
        &self,
        execution_id: Uuid,
        full_history: bool,
    ) -> EngineResult<Option<StatusView>> {
        services::get_workflow_status(self.store.as_ref(), execution_id, full_history).await
    }

    /// Active executions in full, then finished ones up to `limit`
    /// (the configured status limit by default).
    pub async fn get_all_workflow_statuses(
        &self,
        limit: Option<usize>,
    ) -> EngineResult<Vec<StatusView>> {
        let limit = limit.unwrap_or(self.config.status_limit);
        services::get_all_workflow_statuses(self.store.as_ref(), limit).await
    }

    /// Index of the worker currently running `execution_id`.
    pub async fn worker_for(&self, execution_id: Uuid) -> Option<usize> {
        self.directory.read().await.get(&execution_id).copied()
    }

    /// Wait until `execution_id` reaches a terminal state.
    pub async fn wait_for_terminal(
        &self,
        execution_id: Uuid,
        timeout: Duration,
    ) -> EngineResult<WorkflowStatus> {
        self.wait_until(execution_id, timeout, |status| status.is_terminal())
            .await
    }

    /// Wait until `execution_id` is in `state`.
    pub async fn wait_for_state(
        &self,
        execution_id: Uuid,
        state: WorkflowState,
        timeout: Duration,
    ) -> EngineResult<WorkflowStatus> {
        self.wait_until(execution_id, timeout, |status| status.status == state)
            .await
    }

    async fn wait_until(
        &self,
        execution_id: Uuid,
        timeout: Duration,
        done: impl Fn(&WorkflowStatus) -> bool,
    ) -> EngineResult<WorkflowStatus> {
        tokio::time::timeout(timeout, poll_status(self.store.as_ref(), execution_id, done))
            .await
            .map_err(|_| {
                EngineError::Infrastructure(format!(
                    "timed out after {:?} waiting for execution {}",
                    timeout, execution_id
                ))
            })?
    }

    /// Stop every worker. Running executions are aborted at their next
    /// wait point; queued ones stay pending.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let supervisors = std::mem::take(&mut *self.supervisors.lock().await);
        for handle in supervisors {
            let _ = handle.await.log("joining worker supervisor");
        }
        if let Some(handle) = self.message_loop.lock().await.take() {
            let _ = handle.await.log("joining controller message loop");
        }
        tracing::info!(pool_name = %self.config.pool_name, "Worker pool stopped");
    }
}

async fn poll_status(
    store: &dyn Store,
    execution_id: Uuid,
    done: impl Fn(&WorkflowStatus) -> bool,
) -> EngineResult<WorkflowStatus> {
    loop {
        let status = store
            .get_status(execution_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("execution {}", execution_id)))?;
        if done(&status) {
            return Ok(status);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Keep one worker alive in slot `index` until shutdown.
async fn supervise(
    index: usize,
    runner: Arc<ExecutionRunner>,
    dispatch: DispatchQueue,
    control: broadcast::Sender<ControlMessage>,
    backlog: SharedBacklog,
    messages: mpsc::UnboundedSender<WorkerMessage>,
    shutdown: watch::Receiver<bool>,
) {
    loop {
        let worker = Worker::new(
            index,
            runner.clone(),
            dispatch.clone(),
            ControlInbox::new(control.subscribe()),
            backlog.clone(),
            messages.clone(),
            shutdown.clone(),
        );
        match tokio::spawn(worker.run()).await {
            Ok(()) => break,
            Err(err) if err.is_panic() => {
                let reason = panic_message(err.into_panic());
                tracing::error!(worker = index, reason = %reason, "Worker crashed");
                let _ = messages.send(WorkerMessage::Crashed {
                    worker: index,
                    reason,
                });
                let stopping = *shutdown.borrow();
                if stopping {
                    break;
                }
                tracing::info!(worker = index, "Respawning worker");
            }
            Err(err) => {
                tracing::warn!(worker = index, error = %err, "Worker cancelled");
                break;
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Drain worker reports until every worker and supervisor is gone.
async fn route_messages(
    mut inbound: mpsc::UnboundedReceiver<WorkerMessage>,
    directory: Directory,
    backlog: SharedBacklog,
    store: Arc<dyn Store>,
    router: Arc<CaseRouter>,
) {
    while let Some(message) = inbound.recv().await {
        match message {
            WorkerMessage::Claimed {
                worker,
                execution_id,
            } => {
                directory.write().await.insert(execution_id, worker);
            }
            WorkerMessage::Released {
                worker,
                execution_id,
            } => {
                let _ = directory
                    .write()
                    .await
                    .remove(&execution_id)
                    .log_none(format!(
                        "worker {} released unclaimed execution {}",
                        worker, execution_id
                    ));
            }
            WorkerMessage::Event(event) => {
                router.route(&event).await;
            }
            WorkerMessage::Crashed { worker, reason } => {
                let owned: Vec<Uuid> = {
                    let mut directory = directory.write().await;
                    let owned: Vec<Uuid> = directory
                        .iter()
                        .filter(|(_, w)| **w == worker)
                        .map(|(id, _)| *id)
                        .collect();
                    for id in &owned {
                        directory.remove(id);
                    }
                    owned
                };
                for execution_id in owned {
                    backlog.lock().await.release(execution_id);
                    let reason = format!("worker {} crashed: {}", worker, reason);
                    let aborted = store
                        .transition(execution_id, WorkflowState::Aborted, Some(reason.clone()))
                        .await
                        .log_race(format!("aborting execution {} after crash", execution_id));
                    if let Ok(status) = aborted {
                        tracing::warn!(%execution_id, worker, "Execution aborted after worker crash");
                        let event = ExecutionEvent::new(
                            execution_id,
                            status.workflow_id.to_string(),
                            EventKind::WorkflowAborted,
                            serde_json::json!({"reason": reason}),
                        );
                        router.route(&event).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use branchline_apps::{
        create_default_registry, ActionContext, ActionOutput, App, AppAction, AppError,
        ArgumentMap, ParameterSchema,
    };
    use branchline_engine::case::SubscriptionTable;
    use branchline_engine::db::MemoryStore;
    use branchline_engine::engine::ActionState;
    use branchline_engine::events::MemorySink;
    use branchline_engine::model::{Action, Branch};
    use serde_json::json;
    use std::collections::HashSet;
    use tokio_test::assert_ok;

    const WAIT: Duration = Duration::from_secs(5);

    struct Explode;

    #[async_trait]
    impl AppAction for Explode {
        fn name(&self) -> &'static str {
            "explode"
        }

        fn parameters(&self) -> ParameterSchema {
            ParameterSchema::new(Vec::new())
        }

        async fn execute(
            &self,
            _args: &ArgumentMap,
            _ctx: &ActionContext,
        ) -> Result<ActionOutput, AppError> {
            panic!("boom");
        }
    }

    struct Pool {
        controller: ExecutionController,
        store: Arc<MemoryStore>,
        sink: Arc<MemorySink>,
    }

    fn pool(workers: usize) -> Pool {
        let mut registry = create_default_registry();
        registry.register(App::new("test").with_action(Explode));
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let router = Arc::new(CaseRouter::new(store.clone(), sink.clone()));
        let controller = ExecutionController::start(
            PoolConfig::default().with_workers(workers),
            Arc::new(registry),
            store.clone(),
            router,
        )
        .unwrap();
        Pool {
            controller,
            store,
            sink,
        }
    }

    fn sleeper(milliseconds: u64) -> Workflow {
        Workflow::new("sleeper", "sleep")
            .with_action(
                Action::new("sleep", "builtin", "pause_for")
                    .with_argument(Argument::value("milliseconds", json!(milliseconds)))
                    .with_argument(Argument::value("data", json!("slept")))
                    .with_branch(Branch::new("after")),
            )
            .with_action(
                Action::new("after", "builtin", "echo")
                    .with_argument(Argument::reference("data", "sleep")),
            )
    }

    fn adder() -> Workflow {
        Workflow::new("adder", "add").with_action(
            Action::new("add", "builtin", "add")
                .with_argument(Argument::value("a", json!(2)))
                .with_argument(Argument::value("b", json!(3))),
        )
    }

    async fn wait_for_events(sink: &MemorySink, count: usize) {
        for _ in 0..500 {
            if sink.len().await >= count {
                return;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    #[tokio::test]
    async fn test_execute_to_completion() {
        let p = pool(2);
        let workflow_id = p.controller.save_workflow(adder()).await.unwrap();
        let id = p
            .controller
            .execute_workflow(workflow_id, None, vec![])
            .await
            .unwrap();

        let status = p.controller.wait_for_terminal(id, WAIT).await.unwrap();
        assert_eq!(status.status, WorkflowState::Completed);
        assert_eq!(status.action_history[0].result, json!(5));

        let view = p
            .controller
            .get_workflow_status(id, false)
            .await
            .unwrap()
            .unwrap();
        assert!(view.action_history.is_none());
        assert_eq!(view.current_action.unwrap().action_id, "add");
        p.controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_workflow_creates_nothing() {
        let p = pool(1);
        let err = p
            .controller
            .execute_workflow(Uuid::new_v4(), None, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Definition(ref d) if d.is_not_found()));

        let workflow_id = p.controller.save_workflow(adder()).await.unwrap();
        let err = p
            .controller
            .execute_workflow(workflow_id, Some("ghost".to_string()), vec![])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Definition(DefinitionError::ActionNotFound { .. })
        ));
        assert_eq!(p.store.status_count().await, 0);
        p.controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_save_rejects_unresolvable_workflow() {
        let p = pool(1);
        let workflow = Workflow::new("bad", "x").with_action(Action::new("x", "nope", "echo"));
        let err = p.controller.save_workflow(workflow).await.unwrap_err();
        assert!(matches!(err, EngineError::Definition(DefinitionError::Invalid(_))));
        p.controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let p = pool(1);
        let workflow_id = p.controller.save_workflow(sleeper(200)).await.unwrap();
        let id = p
            .controller
            .execute_workflow(workflow_id, None, vec![])
            .await
            .unwrap();

        assert_ok!(
            p.controller
                .wait_for_state(id, WorkflowState::Running, WAIT)
                .await
        );
        assert_eq!(p.controller.pause_workflow(id).await, ControlOutcome::Delivered);

        let paused = p
            .controller
            .wait_for_state(id, WorkflowState::Paused, WAIT)
            .await
            .unwrap();
        assert_eq!(paused.action_history.len(), 1);
        // Ignored by the owner while already paused.
        assert_eq!(p.controller.pause_workflow(id).await, ControlOutcome::Delivered);
        assert_eq!(p.controller.worker_for(id).await, Some(0));

        assert_eq!(p.controller.resume_workflow(id).await, ControlOutcome::Delivered);
        let done = p.controller.wait_for_terminal(id, WAIT).await.unwrap();
        assert_eq!(done.status, WorkflowState::Completed);
        assert_eq!(done.action_history[1].result, json!("slept"));
        p.controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_abort_mid_invocation() {
        let p = pool(1);
        let workflow_id = p.controller.save_workflow(sleeper(300)).await.unwrap();
        let id = p
            .controller
            .execute_workflow(workflow_id, None, vec![])
            .await
            .unwrap();

        assert_ok!(
            p.controller
                .wait_for_state(id, WorkflowState::Running, WAIT)
                .await
        );
        assert_eq!(p.controller.abort_workflow(id).await, ControlOutcome::Delivered);

        let status = p.controller.wait_for_terminal(id, WAIT).await.unwrap();
        assert_eq!(status.status, WorkflowState::Aborted);
        assert_eq!(status.failure_reason.as_deref(), Some(ABORTED_BY_REQUEST));
        // The action ran to completion; its result went nowhere.
        assert_eq!(status.action_history.len(), 1);
        assert_eq!(status.action_history[0].action_id, "sleep");
        assert_eq!(status.action_history[0].status, ActionState::Success);
        assert_eq!(status.action_history[0].result, json!("slept"));
        assert!(status.completed_at.is_some());
        p.controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_pause_then_resume_mid_action() {
        let p = pool(1);
        let workflow_id = p.controller.save_workflow(sleeper(300)).await.unwrap();
        let id = p
            .controller
            .execute_workflow(workflow_id, None, vec![])
            .await
            .unwrap();

        assert_ok!(
            p.controller
                .wait_for_state(id, WorkflowState::Running, WAIT)
                .await
        );
        assert_eq!(p.controller.pause_workflow(id).await, ControlOutcome::Delivered);
        assert_eq!(p.controller.resume_workflow(id).await, ControlOutcome::Delivered);

        let status = p.controller.wait_for_terminal(id, WAIT).await.unwrap();
        assert_eq!(status.status, WorkflowState::Completed);
        assert_eq!(status.action_history.len(), 2);
        p.controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_pause_while_queued_applies_on_start() {
        let p = pool(1);
        let blocker_id = p.controller.save_workflow(sleeper(200)).await.unwrap();
        let queued_id = p.controller.save_workflow(adder()).await.unwrap();

        let blocker = p
            .controller
            .execute_workflow(blocker_id, None, vec![])
            .await
            .unwrap();
        p.controller
            .wait_for_state(blocker, WorkflowState::Running, WAIT)
            .await
            .unwrap();
        let queued = p
            .controller
            .execute_workflow(queued_id, None, vec![])
            .await
            .unwrap();
        assert_eq!(p.controller.pause_workflow(queued).await, ControlOutcome::Delivered);

        let paused = p
            .controller
            .wait_for_state(queued, WorkflowState::Paused, WAIT)
            .await
            .unwrap();
        assert!(paused.action_history.is_empty());
        assert_eq!(p.controller.resume_workflow(queued).await, ControlOutcome::Delivered);
        let done = p.controller.wait_for_terminal(queued, WAIT).await.unwrap();
        assert_eq!(done.status, WorkflowState::Completed);
        p.controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_awaiting_data() {
        let p = pool(1);
        let workflow = Workflow::new("approval", "ask")
            .with_action(
                Action::new("ask", "builtin", "request_data")
                    .with_argument(Argument::value("prompt", json!("approve?")))
                    .with_branch(Branch::new("record")),
            )
            .with_action(
                Action::new("record", "builtin", "echo")
                    .with_argument(Argument::reference("data", "ask")),
            );
        let workflow_id = p.controller.save_workflow(workflow).await.unwrap();
        let id = p
            .controller
            .execute_workflow(workflow_id, None, vec![])
            .await
            .unwrap();

        p.controller
            .wait_for_state(id, WorkflowState::AwaitingData, WAIT)
            .await
            .unwrap();
        assert_eq!(p.controller.resume_workflow(id).await, ControlOutcome::NoOp);
        assert_eq!(
            p.controller.send_data(id, json!({"approved": true})).await,
            ControlOutcome::Delivered
        );

        let status = p.controller.wait_for_terminal(id, WAIT).await.unwrap();
        assert_eq!(status.status, WorkflowState::Completed);
        let history: Vec<(&str, ActionState)> = status
            .action_history
            .iter()
            .map(|a| (a.action_id.as_str(), a.status))
            .collect();
        assert_eq!(
            history,
            vec![
                ("ask", ActionState::AwaitingData),
                ("ask", ActionState::Success),
                ("record", ActionState::Success),
            ]
        );
        assert_eq!(status.action_history[2].result, json!({"approved": true}));
        p.controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_approval_demo() {
        let p = pool(2);
        let workflow =
            branchline_engine::model::parse_workflow(include_str!("../../../demos/approval.yaml"))
                .unwrap();
        let workflow_id = p.controller.save_workflow(workflow).await.unwrap();

        let approved = p
            .controller
            .execute_workflow(workflow_id, None, vec![])
            .await
            .unwrap();
        p.controller
            .wait_for_state(approved, WorkflowState::AwaitingData, WAIT)
            .await
            .unwrap();
        p.controller.send_data(approved, json!({"approved": true})).await;
        let status = p.controller.wait_for_terminal(approved, WAIT).await.unwrap();
        let last = status.current_action().unwrap();
        assert_eq!(last.action_id, "record");
        assert_eq!(last.result, json!("A-1001"));

        let small = p
            .controller
            .execute_workflow(
                workflow_id,
                None,
                vec![Argument::value("data", json!({"order": "B-7", "amount": 40}))],
            )
            .await
            .unwrap();
        let status = p.controller.wait_for_terminal(small, WAIT).await.unwrap();
        let path: Vec<&str> = status
            .action_history
            .iter()
            .map(|a| a.action_id.as_str())
            .collect();
        assert_eq!(path, vec!["fetch", "record"]);
        assert_eq!(status.current_action().unwrap().result, json!("B-7"));
        p.controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_crash_aborts_and_respawns() {
        let p = pool(1);
        let workflow = Workflow::new("crash", "boom").with_action(Action::new("boom", "test", "explode"));
        let crash_id = p.controller.save_workflow(workflow).await.unwrap();
        let id = p
            .controller
            .execute_workflow(crash_id, None, vec![])
            .await
            .unwrap();

        let status = p.controller.wait_for_terminal(id, WAIT).await.unwrap();
        assert_eq!(status.status, WorkflowState::Aborted);
        let reason = status.failure_reason.unwrap();
        assert!(reason.contains("crashed") && reason.contains("boom"), "{}", reason);

        let workflow_id = p.controller.save_workflow(adder()).await.unwrap();
        let next = p
            .controller
            .execute_workflow(workflow_id, None, vec![])
            .await
            .unwrap();
        let status = p.controller.wait_for_terminal(next, WAIT).await.unwrap();
        assert_eq!(status.status, WorkflowState::Completed);
        p.controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_control_on_unknown_and_terminal() {
        let p = pool(1);
        let unknown = Uuid::new_v4();
        assert_eq!(p.controller.pause_workflow(unknown).await, ControlOutcome::NoOp);
        assert_eq!(p.controller.abort_workflow(unknown).await, ControlOutcome::NoOp);
        assert_eq!(
            p.controller.send_data(unknown, json!(1)).await,
            ControlOutcome::NoOp
        );

        let workflow_id = p.controller.save_workflow(adder()).await.unwrap();
        let id = p
            .controller
            .execute_workflow(workflow_id, None, vec![])
            .await
            .unwrap();
        p.controller.wait_for_terminal(id, WAIT).await.unwrap();
        assert_eq!(p.controller.abort_workflow(id).await, ControlOutcome::NoOp);
        assert_eq!(p.controller.resume_workflow(id).await, ControlOutcome::NoOp);
        p.controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_abort_pending_and_route_event() {
        let p = pool(1);
        let blocker_id = p.controller.save_workflow(sleeper(500)).await.unwrap();
        let queued_id = p.controller.save_workflow(adder()).await.unwrap();

        let mut entities = HashMap::new();
        entities.insert(
            queued_id.to_string(),
            HashSet::from(["workflow_aborted".to_string()]),
        );
        let mut table = SubscriptionTable::new();
        table.insert("watch".to_string(), entities);
        p.controller.router().set_subscriptions(table).await;

        let blocker = p
            .controller
            .execute_workflow(blocker_id, None, vec![])
            .await
            .unwrap();
        p.controller
            .wait_for_state(blocker, WorkflowState::Running, WAIT)
            .await
            .unwrap();
        let queued = p
            .controller
            .execute_workflow(queued_id, None, vec![])
            .await
            .unwrap();

        assert_eq!(p.controller.abort_workflow(queued).await, ControlOutcome::Delivered);
        let status = p.store.get_status(queued).await.unwrap().unwrap();
        assert_eq!(status.status, WorkflowState::Aborted);
        assert!(status.started_at.is_none());

        let received = p.sink.received().await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, "watch");

        assert_eq!(p.controller.abort_workflow(blocker).await, ControlOutcome::Delivered);
        p.controller.wait_for_terminal(blocker, WAIT).await.unwrap();

        // The worker skips the aborted execution once it frees up.
        let status = p.store.get_status(queued).await.unwrap().unwrap();
        assert!(status.action_history.is_empty());
        p.controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_events_reach_subscribed_cases() {
        let p = pool(1);
        let workflow_id = p.controller.save_workflow(adder()).await.unwrap();

        let mut entities = HashMap::new();
        entities.insert(
            "add".to_string(),
            HashSet::from([
                "action_started".to_string(),
                "action_execution_success".to_string(),
            ]),
        );
        let mut table = SubscriptionTable::new();
        table.insert("audit".to_string(), entities);
        p.controller.router().set_subscriptions(table).await;

        let id = p
            .controller
            .execute_workflow(workflow_id, None, vec![])
            .await
            .unwrap();
        p.controller.wait_for_terminal(id, WAIT).await.unwrap();
        wait_for_events(&p.sink, 2).await;

        let names: Vec<&str> = p
            .sink
            .received()
            .await
            .iter()
            .map(|(_, event)| event.event.as_str())
            .collect();
        assert_eq!(names, vec!["action_started", "action_execution_success"]);
        p.controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_status_overview_and_shutdown() {
        let p = pool(2);
        let quick = p.controller.save_workflow(adder()).await.unwrap();
        let slow = p.controller.save_workflow(sleeper(1_000)).await.unwrap();

        let first = p.controller.execute_workflow(quick, None, vec![]).await.unwrap();
        p.controller.wait_for_terminal(first, WAIT).await.unwrap();
        let second = p.controller.execute_workflow(quick, None, vec![]).await.unwrap();
        p.controller.wait_for_terminal(second, WAIT).await.unwrap();
        let running = p.controller.execute_workflow(slow, None, vec![]).await.unwrap();
        p.controller
            .wait_for_state(running, WorkflowState::Running, WAIT)
            .await
            .unwrap();

        let all = p.controller.get_all_workflow_statuses(None).await.unwrap();
        let ids: Vec<Uuid> = all.iter().map(|s| s.execution_id).collect();
        assert_eq!(ids, vec![running, first, second]);

        let limited = p.controller.get_all_workflow_statuses(Some(2)).await.unwrap();
        let ids: Vec<Uuid> = limited.iter().map(|s| s.execution_id).collect();
        assert_eq!(ids, vec![running, first]);

        p.controller.shutdown().await;
        let status = p.store.get_status(running).await.unwrap().unwrap();
        assert_eq!(status.status, WorkflowState::Aborted);
        assert!(p
            .controller
            .execute_workflow(quick, None, vec![])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        let store = Arc::new(MemoryStore::new());
        let router = Arc::new(CaseRouter::new(store.clone(), Arc::new(MemorySink::new())));
        let result = ExecutionController::start(
            PoolConfig::default().with_workers(0),
            Arc::new(create_default_registry()),
            store,
            router,
        );
        assert!(matches!(result, Err(EngineError::Infrastructure(_))));
    }
}
