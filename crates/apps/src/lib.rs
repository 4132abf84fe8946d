//! Branchline App Registry
//!
//! Apps are named bundles of executable actions, boolean conditions and
//! data transforms. The execution engine never calls an implementation
//! directly: it resolves `(app, name)` through the [`AppRegistry`] and gets
//! back the callable together with its parameter schema.
//!
//! This crate provides:
//! - Parameter schemas used for argument validation
//! - The `AppAction`, `AppCondition` and `AppTransform` traits
//! - The registry and its resolution errors
//! - A `builtin` app with general-purpose actions, conditions and transforms

pub mod builtin;
pub mod context;
pub mod error;
pub mod registry;
pub mod schema;

pub use builtin::{create_default_registry, BUILTIN_APP};
pub use context::{Accumulator, ActionContext};
pub use error::{AppError, RegistryError};
pub use registry::{
    ActionOutput, App, AppAction, AppCondition, AppRegistry, AppTransform, ResolvedCondition,
    ResolvedTransform,
};
pub use schema::{ArgumentMap, ParamType, ParameterSchema, ParameterSpec};
