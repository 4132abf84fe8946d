//! Per-worker control inbox.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::messages::{ControlCommand, ControlMessage};

/// A worker's view of the control broadcast, filtered to the execution it
/// is running.
///
/// Commands that cannot be acted on yet (a pause while awaiting data) are
/// deferred and handed out again before anything newer.
pub struct ControlInbox {
    receiver: broadcast::Receiver<ControlMessage>,
    deferred: VecDeque<ControlCommand>,
}

impl ControlInbox {
    pub fn new(receiver: broadcast::Receiver<ControlMessage>) -> Self {
        Self {
            receiver,
            deferred: VecDeque::new(),
        }
    }

    /// Drop everything buffered. Called before taking a new execution.
    pub fn reset(&mut self) {
        self.deferred.clear();
        loop {
            match self.receiver.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    /// Hand a command out again on the next read.
    pub fn defer(&mut self, command: ControlCommand) {
        self.deferred.push_back(command);
    }

    /// Commands for `execution_id` received so far, without waiting.
    pub fn pending(&mut self, execution_id: Uuid) -> Vec<ControlCommand> {
        let mut commands: Vec<ControlCommand> = self.deferred.drain(..).collect();
        loop {
            match self.receiver.try_recv() {
                Ok(message) if message.execution_id == execution_id => {
                    commands.push(message.command)
                }
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(%execution_id, skipped, "Control inbox lagged");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        commands
    }

    /// Wait for the next command for `execution_id`. `None` once the
    /// controller is gone.
    pub async fn next(&mut self, execution_id: Uuid) -> Option<ControlCommand> {
        if let Some(command) = self.deferred.pop_front() {
            return Some(command);
        }
        loop {
            match self.receiver.recv().await {
                Ok(message) if message.execution_id == execution_id => {
                    return Some(message.command)
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%execution_id, skipped, "Control inbox lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Commands sent to executions that no worker has claimed yet.
///
/// A worker claims its execution here after resetting its inbox, so every
/// command is either parked before the claim or broadcast after it.
#[derive(Debug, Default)]
pub struct Backlog {
    claimed: HashSet<Uuid>,
    parked: HashMap<Uuid, Vec<ControlCommand>>,
}

pub type SharedBacklog = Arc<Mutex<Backlog>>;

impl Backlog {
    /// Mark `execution_id` as owned and hand over what was parked for it.
    pub fn claim(&mut self, execution_id: Uuid) -> Vec<ControlCommand> {
        self.claimed.insert(execution_id);
        self.parked.remove(&execution_id).unwrap_or_default()
    }

    pub fn release(&mut self, execution_id: Uuid) {
        self.claimed.remove(&execution_id);
        self.parked.remove(&execution_id);
    }

    /// Park `command` unless the execution is already claimed. Returns
    /// whether it was parked; a claimed execution gets it by broadcast.
    pub fn park(&mut self, execution_id: Uuid, command: ControlCommand) -> bool {
        if self.claimed.contains(&execution_id) {
            return false;
        }
        self.parked.entry(execution_id).or_default().push(command);
        true
    }
}
