//! Workflow execution engine.
//!
//! - [`validator`]: argument validation against parameter schemas
//! - [`evaluator`]: conditional expression evaluation
//! - [`graph`]: next-action selection
//! - [`state`]: workflow and action status state machine

pub mod evaluator;
pub mod graph;
pub mod state;
pub mod validator;

pub use evaluator::{evaluate, evaluate_condition};
pub use graph::next_action;
pub use state::{ActionState, ActionStatus, WorkflowState, WorkflowStatus};
pub use validator::validate_arguments;
