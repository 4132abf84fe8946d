//! Workflow definition model.

pub mod argument;
pub mod expression;
pub mod parser;
pub mod workflow;

pub use argument::{Argument, ArgumentSource};
pub use expression::{Condition, ConditionalExpression, Operator, Transform};
pub use parser::{parse_workflow, parse_workflow_json};
pub use workflow::{Action, ActionBinding, ActionId, Branch, BranchStatus, Workflow};
