//! Worker lifecycle management.

use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};

use branchline_engine::engine::WorkflowState;
use branchline_engine::events::{EventKind, ExecutionEvent};
use branchline_engine::{EngineError, RaceResultExt};

use crate::executor::{shutdown_requested, ExecutionRunner};
use crate::inbox::{ControlInbox, SharedBacklog};
use crate::messages::{ExecutionRequest, WorkerMessage};

/// Receiving end of the dispatch queue, shared by every worker.
pub type DispatchQueue = Arc<Mutex<mpsc::UnboundedReceiver<ExecutionRequest>>>;

/// One slot of the pool. Takes executions off the shared queue and runs
/// them one at a time.
pub struct Worker {
    /// Slot index.
    index: usize,

    runner: Arc<ExecutionRunner>,

    queue: DispatchQueue,

    /// Control commands for the execution being run.
    inbox: ControlInbox,

    /// Commands sent before the execution was claimed.
    backlog: SharedBacklog,

    /// Claim and release reports.
    messages: mpsc::UnboundedSender<WorkerMessage>,

    shutdown: watch::Receiver<bool>,
}

impl Worker {
    pub fn new(
        index: usize,
        runner: Arc<ExecutionRunner>,
        queue: DispatchQueue,
        inbox: ControlInbox,
        backlog: SharedBacklog,
        messages: mpsc::UnboundedSender<WorkerMessage>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            index,
            runner,
            queue,
            inbox,
            backlog,
            messages,
            shutdown,
        }
    }

    /// Process executions until shutdown or until the queue closes.
    pub async fn run(mut self) {
        tracing::debug!(worker = self.index, "Worker started");
        while let Some(request) = self.next_request().await {
            self.process(request).await;
        }
        tracing::debug!(worker = self.index, "Worker stopped");
    }

    async fn next_request(&mut self) -> Option<ExecutionRequest> {
        let queue = self.queue.clone();
        tokio::select! {
            biased;
            _ = shutdown_requested(&mut self.shutdown) => None,
            request = async move { queue.lock().await.recv().await } => request,
        }
    }

    async fn process(&mut self, request: ExecutionRequest) {
        let execution_id = request.execution_id;
        let workflow_id = request.workflow_id;
        self.inbox.reset();
        let parked = self.backlog.lock().await.claim(execution_id);
        for command in parked {
            self.inbox.defer(command);
        }
        let _ = self.messages.send(WorkerMessage::Claimed {
            worker: self.index,
            execution_id,
        });
        tracing::debug!(worker = self.index, %execution_id, "Execution claimed");

        match self
            .runner
            .run(self.index, request, &mut self.inbox, &mut self.shutdown)
            .await
        {
            Ok(state) => {
                tracing::debug!(worker = self.index, %execution_id, state = %state, "Execution released");
            }
            Err(EngineError::Terminal(_)) => {
                tracing::info!(worker = self.index, %execution_id, "Execution was finished by the controller");
            }
            Err(EngineError::NotFound(what)) => {
                tracing::warn!(worker = self.index, %execution_id, missing = %what, "Dropping execution");
            }
            Err(e) => {
                tracing::error!(worker = self.index, %execution_id, error = %e, "Execution failed");
                let aborted = self
                    .runner
                    .store()
                    .transition(execution_id, WorkflowState::Aborted, Some(e.to_string()))
                    .await
                    .log_race(format!("aborting execution {}", execution_id));
                if aborted.is_ok() {
                    let event = ExecutionEvent::new(
                        execution_id,
                        workflow_id.to_string(),
                        EventKind::WorkflowAborted,
                        serde_json::json!({"reason": e.to_string()}),
                    );
                    let _ = self.messages.send(WorkerMessage::Event(event));
                }
            }
        }

        self.backlog.lock().await.release(execution_id);
        let _ = self.messages.send(WorkerMessage::Released {
            worker: self.index,
            execution_id,
        });
    }
}
