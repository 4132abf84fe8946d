//! Branchline Worker Pool
//!
//! Runs workflow executions on a fixed pool of workers.
//!
//! This crate provides:
//! - The execution controller: accepts executions, relays pause, resume,
//!   abort and data commands, answers status queries
//! - Workers that take executions off a shared dispatch queue and walk
//!   them action by action
//! - Supervision that aborts the execution of a crashed worker and
//!   respawns the slot
//! - Pool configuration from `BRANCHLINE_` environment variables

pub mod config;
pub mod controller;
pub mod executor;
pub mod inbox;
pub mod messages;
pub mod worker;

pub use config::PoolConfig;
pub use controller::ExecutionController;
pub use messages::{ControlCommand, ControlOutcome, ExecutionRequest};
pub use worker::Worker;
