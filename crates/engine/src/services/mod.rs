//! Service layer.
//!
//! Read-side operations over the store, shaped for an API layer.

pub mod execution;

pub use execution::{get_all_workflow_statuses, get_workflow_status, StatusView};
