//! Sequential walk of one execution.
//!
//! For each action the runner validates arguments against the resolved
//! schema, invokes the action, appends the [`ActionStatus`], stores the
//! result in the accumulator and checks control commands before asking the
//! graph for the next action. Control commands that arrive while an action
//! runs are held until the boundary. An abort lets the invocation finish,
//! records it, and stops before its result is traversed.

use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use branchline_apps::{Accumulator, ActionContext, ActionOutput, AppRegistry, ArgumentMap};
use branchline_engine::db::Store;
use branchline_engine::engine::{
    next_action, validate_arguments, ActionState, ActionStatus, WorkflowState,
};
use branchline_engine::events::{EventKind, EventLog};
use branchline_engine::model::{Action, ActionId, Argument, Workflow};
use branchline_engine::{DefinitionError, EngineError, EngineResult};

use crate::inbox::ControlInbox;
use crate::messages::{ControlCommand, ExecutionRequest, WorkerMessage};

pub const ABORTED_BY_REQUEST: &str = "aborted by request";
pub const SHUT_DOWN: &str = "worker pool shut down";
const CONTROL_CLOSED: &str = "control channel closed";

/// Runs executions against the store, reporting events to the controller.
pub struct ExecutionRunner {
    registry: Arc<AppRegistry>,
    store: Arc<dyn Store>,
    messages: mpsc::UnboundedSender<WorkerMessage>,
}

impl ExecutionRunner {
    pub fn new(
        registry: Arc<AppRegistry>,
        store: Arc<dyn Store>,
        messages: mpsc::UnboundedSender<WorkerMessage>,
    ) -> Self {
        Self {
            registry,
            store,
            messages,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Run `request` to a terminal state, or until it is paused forever.
    ///
    /// Executions aborted while queued are skipped and their current state
    /// returned.
    pub async fn run(
        &self,
        worker: usize,
        request: ExecutionRequest,
        inbox: &mut ControlInbox,
        shutdown: &mut watch::Receiver<bool>,
    ) -> EngineResult<WorkflowState> {
        let execution_id = request.execution_id;
        let status = self
            .store
            .get_status(execution_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("execution {}", execution_id)))?;
        if status.is_terminal() {
            tracing::debug!(%execution_id, worker, status = %status.status, "Skipping finished execution");
            return Ok(status.status);
        }

        let mut log = EventLog::new(execution_id);
        let workflow = match self.load(request.workflow_id).await {
            Ok(workflow) => workflow,
            Err(e) => {
                tracing::warn!(%execution_id, error = %e, "Workflow cannot be executed");
                let entity = request.workflow_id.to_string();
                return self.abort(&mut log, entity, e.to_string()).await;
            }
        };

        let start = request.start.unwrap_or_else(|| workflow.start.clone());
        if !workflow.has_action(&start) {
            let err = DefinitionError::ActionNotFound {
                workflow: workflow.id,
                action: start,
            };
            let entity = workflow.id.to_string();
            return self.abort(&mut log, entity, err.to_string()).await;
        }

        let walk = Walk {
            runner: self,
            worker,
            execution_id,
            workflow,
            inbox,
            shutdown,
            log,
            accumulator: Accumulator::new(),
        };
        walk.run(start, request.arguments).await
    }

    async fn load(&self, workflow_id: Uuid) -> EngineResult<Workflow> {
        let mut workflow = self
            .store
            .load_workflow(workflow_id)
            .await?
            .ok_or(DefinitionError::WorkflowNotFound(workflow_id))?;
        workflow.resolve(&self.registry)?;
        Ok(workflow)
    }

    /// Send everything in `log` to the controller.
    fn flush(&self, log: &mut EventLog) {
        for event in log.take() {
            // Only fails once the controller is gone.
            let _ = self.messages.send(WorkerMessage::Event(event));
        }
    }

    async fn abort(
        &self,
        log: &mut EventLog,
        workflow_entity: String,
        reason: impl Into<String>,
    ) -> EngineResult<WorkflowState> {
        let execution_id = log.execution_id();
        let reason = reason.into();
        match self
            .store
            .transition(execution_id, WorkflowState::Aborted, Some(reason.clone()))
            .await
        {
            Ok(_) => {}
            Err(EngineError::Terminal(_)) => return self.current_state(execution_id).await,
            Err(e) => return Err(e),
        }
        tracing::info!(%execution_id, reason = %reason, "Execution aborted");
        log.push(
            workflow_entity,
            EventKind::WorkflowAborted,
            json!({"reason": reason}),
        );
        self.flush(log);
        Ok(WorkflowState::Aborted)
    }

    async fn current_state(&self, execution_id: Uuid) -> EngineResult<WorkflowState> {
        self.store
            .get_status(execution_id)
            .await?
            .map(|status| status.status)
            .ok_or_else(|| EngineError::NotFound(format!("execution {}", execution_id)))
    }
}

/// Whether the walk goes on after a control check.
enum Flow {
    Continue,
    Stop(WorkflowState),
}

/// A value, or the reason the execution has to be aborted instead.
enum Wake<T> {
    Ready(T),
    Abort(&'static str),
}

/// Outcome of one action.
enum Step {
    Done { outcome: ActionState, result: Value },
    Stop(WorkflowState),
}

struct Walk<'a> {
    runner: &'a ExecutionRunner,
    worker: usize,
    execution_id: Uuid,
    workflow: Workflow,
    inbox: &'a mut ControlInbox,
    shutdown: &'a mut watch::Receiver<bool>,
    log: EventLog,
    accumulator: Accumulator,
}

impl Walk<'_> {
    async fn run(mut self, start: ActionId, overrides: Vec<Argument>) -> EngineResult<WorkflowState> {
        match self.transition(WorkflowState::Running).await {
            Ok(()) => {}
            Err(EngineError::Terminal(_)) | Err(EngineError::InvalidTransition { .. }) => {
                tracing::debug!(execution_id = %self.execution_id, "Execution left pending before start");
                return self.runner.current_state(self.execution_id).await;
            }
            Err(e) => return Err(e),
        }
        tracing::info!(
            execution_id = %self.execution_id,
            worker = self.worker,
            workflow = %self.workflow.name,
            start = %start,
            "Execution started"
        );
        self.emit_workflow(
            EventKind::WorkflowExecutionStart,
            json!({"name": self.workflow.name, "start": start}),
        );

        if let Flow::Stop(state) = self.checkpoint().await? {
            return Ok(state);
        }

        let mut current = start;
        let mut overrides = Some(overrides);
        loop {
            let action = self.workflow.action(&current).cloned().ok_or_else(|| {
                EngineError::NotFound(format!("action {} in workflow {}", current, self.workflow.id))
            })?;

            let (outcome, result) = match self
                .invoke(&action, overrides.take().unwrap_or_default())
                .await?
            {
                Step::Done { outcome, result } => (outcome, result),
                Step::Stop(state) => return Ok(state),
            };
            self.accumulator.insert(action.id.clone(), result.clone());

            if let Flow::Stop(state) = self.checkpoint().await? {
                return Ok(state);
            }

            let next = next_action(
                &self.workflow,
                &action.id,
                outcome,
                &result,
                &self.accumulator,
                &mut self.log,
            );
            self.runner.flush(&mut self.log);

            match next {
                Ok(Some(destination)) => current = destination,
                Ok(None) => {
                    self.transition(WorkflowState::Completed).await?;
                    tracing::info!(execution_id = %self.execution_id, last = %action.id, "Execution completed");
                    self.emit_workflow(EventKind::WorkflowCompleted, json!({"last": action.id}));
                    return Ok(WorkflowState::Completed);
                }
                Err(e) => {
                    tracing::warn!(execution_id = %self.execution_id, action = %action.id, error = %e, "Branch evaluation failed");
                    let failure = status_of(&action, ActionState::Failure)
                        .with_result(json!({"error": e.to_string()}));
                    self.append(failure).await?;
                    return self.abort(e.to_string()).await;
                }
            }
        }
    }

    async fn invoke(&mut self, action: &Action, overrides: Vec<Argument>) -> EngineResult<Step> {
        self.emit(
            &action.id,
            EventKind::ActionStarted,
            json!({"app_name": action.app_name, "action_name": action.action_name}),
        );
        let binding = action.binding.clone().ok_or_else(|| {
            EngineError::Infrastructure(format!("action {} is not resolved", action.id))
        })?;

        let arguments = merge_arguments(&action.arguments, overrides);
        let args = match validate_arguments(&binding.parameters, &arguments, Some(&self.accumulator)) {
            Ok(args) => args,
            Err(err) => {
                tracing::debug!(execution_id = %self.execution_id, action = %action.id, error = %err, "Invalid arguments");
                let result = json!({"error": err.to_string()});
                self.emit(&action.id, EventKind::ActionArgumentsInvalid, result.clone());
                self.append(status_of(action, ActionState::Failure).with_result(result.clone()))
                    .await?;
                return Ok(Step::Done {
                    outcome: ActionState::Failure,
                    result,
                });
            }
        };

        let ctx = ActionContext::new(self.execution_id, self.workflow.id, action.id.clone())
            .with_worker(self.worker)
            .with_accumulator(self.accumulator.clone());

        let mut held = Vec::new();
        let mut interrupted: Option<&'static str> = None;
        let output = {
            let invocation = binding.action.execute(&args, &ctx);
            tokio::pin!(invocation);
            loop {
                if interrupted.is_some() {
                    break (&mut invocation).await;
                }
                tokio::select! {
                    output = &mut invocation => break output,
                    wake = self.wait_command() => match wake {
                        Wake::Ready(command) => held.push(command),
                        Wake::Abort(reason) => {
                            tracing::info!(execution_id = %self.execution_id, action = %action.id, reason, "Abort requested, letting action finish");
                            interrupted = Some(reason);
                        }
                    },
                }
            }
        };
        for command in held {
            self.inbox.defer(command);
        }

        let step = match output {
            Ok(ActionOutput::AwaitData(request)) => {
                if let Some(reason) = interrupted {
                    return Ok(Step::Stop(self.abort(reason).await?));
                }
                return self.await_data(action, args, request).await;
            }
            Ok(ActionOutput::Complete(result)) => {
                self.emit(
                    &action.id,
                    EventKind::ActionExecutionSuccess,
                    json!({"result": result}),
                );
                let status = status_of(action, ActionState::Success)
                    .with_arguments(args)
                    .with_result(result.clone());
                self.append(status).await?;
                Step::Done {
                    outcome: ActionState::Success,
                    result,
                }
            }
            Err(e) => {
                tracing::debug!(execution_id = %self.execution_id, action = %action.id, error = %e, "Action failed");
                let result = json!({"error": e.to_string()});
                self.emit(&action.id, EventKind::ActionExecutionError, result.clone());
                let status = status_of(action, ActionState::Failure)
                    .with_arguments(args)
                    .with_result(result.clone());
                self.append(status).await?;
                Step::Done {
                    outcome: ActionState::Failure,
                    result,
                }
            }
        };

        match interrupted {
            // Recorded in history, never traversed.
            Some(reason) => {
                tracing::info!(execution_id = %self.execution_id, action = %action.id, "Discarding result of interrupted action");
                Ok(Step::Stop(self.abort(reason).await?))
            }
            None => Ok(step),
        }
    }

    /// Suspend in `awaiting_data` until data arrives. The data becomes the
    /// action's result.
    async fn await_data(
        &mut self,
        action: &Action,
        args: ArgumentMap,
        request: Value,
    ) -> EngineResult<Step> {
        let waiting = status_of(action, ActionState::AwaitingData)
            .with_arguments(args.clone())
            .with_result(request.clone());
        self.append(waiting).await?;
        self.transition(WorkflowState::AwaitingData).await?;
        tracing::info!(execution_id = %self.execution_id, action = %action.id, "Execution awaiting data");
        self.emit(
            &action.id,
            EventKind::ActionAwaitingData,
            json!({"request": request}),
        );

        let mut pause_requested = false;
        loop {
            match self.wait_command().await {
                Wake::Ready(ControlCommand::Data(data)) => {
                    self.transition(WorkflowState::Running).await?;
                    self.emit(
                        &action.id,
                        EventKind::ActionExecutionSuccess,
                        json!({"result": data}),
                    );
                    let status = status_of(action, ActionState::Success)
                        .with_arguments(args)
                        .with_result(data.clone());
                    self.append(status).await?;
                    if pause_requested {
                        self.inbox.defer(ControlCommand::Pause);
                    }
                    return Ok(Step::Done {
                        outcome: ActionState::Success,
                        result: data,
                    });
                }
                Wake::Ready(ControlCommand::Pause) => pause_requested = true,
                Wake::Ready(command) => {
                    tracing::debug!(execution_id = %self.execution_id, %command, "Ignoring command while awaiting data");
                }
                Wake::Abort(reason) => return Ok(Step::Stop(self.abort(reason).await?)),
            }
        }
    }

    /// Apply commands received since the last check.
    async fn checkpoint(&mut self) -> EngineResult<Flow> {
        let stopping = *self.shutdown.borrow();
        if stopping {
            return Ok(Flow::Stop(self.abort(SHUT_DOWN).await?));
        }

        let mut commands = self.inbox.pending(self.execution_id).into_iter();
        while let Some(command) = commands.next() {
            match command {
                ControlCommand::Abort => {
                    return Ok(Flow::Stop(self.abort(ABORTED_BY_REQUEST).await?));
                }
                ControlCommand::Pause => {
                    for rest in commands.by_ref() {
                        self.inbox.defer(rest);
                    }
                    return self.paused().await;
                }
                command => {
                    tracing::debug!(execution_id = %self.execution_id, %command, "Ignoring command at action boundary");
                }
            }
        }
        Ok(Flow::Continue)
    }

    async fn paused(&mut self) -> EngineResult<Flow> {
        self.transition(WorkflowState::Paused).await?;
        tracing::info!(execution_id = %self.execution_id, "Execution paused");
        self.emit_workflow(EventKind::WorkflowPaused, Value::Null);

        loop {
            match self.wait_command().await {
                Wake::Ready(ControlCommand::Resume) => {
                    self.transition(WorkflowState::Running).await?;
                    tracing::info!(execution_id = %self.execution_id, "Execution resumed");
                    self.emit_workflow(EventKind::WorkflowResumed, Value::Null);
                    return Ok(Flow::Continue);
                }
                Wake::Ready(command) => {
                    tracing::debug!(execution_id = %self.execution_id, %command, "Ignoring command while paused");
                }
                Wake::Abort(reason) => return Ok(Flow::Stop(self.abort(reason).await?)),
            }
        }
    }

    /// Next control command, or why the execution must stop.
    async fn wait_command(&mut self) -> Wake<ControlCommand> {
        let execution_id = self.execution_id;
        tokio::select! {
            biased;
            _ = shutdown_requested(self.shutdown) => Wake::Abort(SHUT_DOWN),
            command = self.inbox.next(execution_id) => match command {
                Some(ControlCommand::Abort) => Wake::Abort(ABORTED_BY_REQUEST),
                Some(command) => Wake::Ready(command),
                None => Wake::Abort(CONTROL_CLOSED),
            },
        }
    }

    async fn transition(&mut self, to: WorkflowState) -> EngineResult<()> {
        self.runner
            .store
            .transition(self.execution_id, to, None)
            .await
            .map(|_| ())
    }

    async fn append(&mut self, status: ActionStatus) -> EngineResult<()> {
        self.runner
            .store
            .append_action(self.execution_id, status)
            .await
    }

    async fn abort(&mut self, reason: impl Into<String>) -> EngineResult<WorkflowState> {
        let entity = self.workflow.id.to_string();
        self.runner.abort(&mut self.log, entity, reason).await
    }

    fn emit(&mut self, entity: &str, kind: EventKind, payload: Value) {
        self.log.push(entity, kind, payload);
        self.runner.flush(&mut self.log);
    }

    fn emit_workflow(&mut self, kind: EventKind, payload: Value) {
        let entity = self.workflow.id.to_string();
        self.emit(&entity, kind, payload);
    }
}

fn status_of(action: &Action, state: ActionState) -> ActionStatus {
    ActionStatus::new(&action.id, &action.app_name, &action.action_name, state)
}

/// Start arguments replace declared arguments of the same name.
fn merge_arguments(declared: &[Argument], overrides: Vec<Argument>) -> Vec<Argument> {
    let mut merged: Vec<Argument> = declared
        .iter()
        .filter(|a| !overrides.iter().any(|o| o.name == a.name))
        .cloned()
        .collect();
    merged.extend(overrides);
    merged
}

/// Resolves once shutdown is signalled or the controller is gone.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
