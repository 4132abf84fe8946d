//! Branchline Execution Engine
//!
//! This crate holds everything about a workflow that does not depend on
//! how executions are scheduled:
//!
//! - **Definitions**: workflows of actions connected by prioritized,
//!   optionally guarded branches, parsed from YAML or JSON
//! - **Validation**: argument checking against app parameter schemas,
//!   with every problem reported at once
//! - **Evaluation**: boolean operator trees over app-provided conditions
//!   and transforms, and next-action selection
//! - **State**: the execution status state machine and append-only action
//!   history
//! - **Events**: execution events and the case subscription router that
//!   forwards them to a sink
//!
//! ## Modules
//!
//! - [`model`]: workflow, action, branch and expression definitions
//! - [`engine`]: validator, evaluator, graph walk and state machine
//! - [`db`]: the `Store` persistence trait and an in-memory store
//! - [`events`]: execution events and sinks
//! - [`case`]: case subscriptions and routing
//! - [`services`]: status queries
//! - [`error`]: error taxonomy
//!
//! ## Example
//!
//! ```ignore
//! use branchline_apps::create_default_registry;
//! use branchline_engine::model::parse_workflow;
//!
//! let registry = create_default_registry();
//! let mut workflow = parse_workflow(&std::fs::read_to_string("approval.yaml")?)?;
//! workflow.resolve(&registry)?;
//! ```

pub mod case;
pub mod db;
pub mod engine;
pub mod error;
pub mod events;
pub mod model;
pub mod result_ext;
pub mod services;

pub use error::{
    ArgumentError, ArgumentIssue, DefinitionError, EngineError, EngineResult, EvaluationError,
};
pub use result_ext::{OptionResultExt, RaceResultExt, ResultExt};
