//! Execution of one workflow run on a worker.

mod runner;

pub(crate) use runner::shutdown_requested;
pub use runner::{ExecutionRunner, ABORTED_BY_REQUEST, SHUT_DOWN};
