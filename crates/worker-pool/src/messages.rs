//! Messages exchanged between the controller and the workers.
//!
//! - controller -> workers: [`ExecutionRequest`] on the dispatch queue,
//!   [`ControlMessage`] broadcast to every worker
//! - workers -> controller: [`WorkerMessage`]

use serde_json::Value;
use uuid::Uuid;

use branchline_engine::events::ExecutionEvent;
use branchline_engine::model::Argument;

/// A request to run one execution.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    /// Action to start at instead of the workflow's start action.
    pub start: Option<String>,
    /// Arguments overriding those of the first action.
    pub arguments: Vec<Argument>,
}

/// A control command for a running execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Pause,
    Resume,
    Abort,
    /// External input for an execution awaiting data.
    Data(Value),
}

impl std::fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pause => write!(f, "pause"),
            Self::Resume => write!(f, "resume"),
            Self::Abort => write!(f, "abort"),
            Self::Data(_) => write!(f, "data"),
        }
    }
}

/// A control command addressed to one execution. Broadcast to every
/// worker; only the owner acts on it.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlMessage {
    pub execution_id: Uuid,
    pub command: ControlCommand,
}

/// Result of a control call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    /// The command was sent to the workers.
    Delivered,
    /// The execution is unknown or finished, or data was sent to an
    /// execution that is not awaiting it.
    NoOp,
}

/// Reports from workers and their supervisors.
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    /// A worker took an execution off the queue.
    Claimed { worker: usize, execution_id: Uuid },
    /// A worker finished with an execution.
    Released { worker: usize, execution_id: Uuid },
    /// An event to route to case subscriptions.
    Event(ExecutionEvent),
    /// A worker task panicked.
    Crashed { worker: usize, reason: String },
}
