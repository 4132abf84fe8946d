//! The `builtin` app.
//!
//! General-purpose implementations available to every workflow:
//! - actions: `echo`, `add`, `pause_for`, `request_data`, `fail`, `shell`
//! - conditions: `equals`, `greater_than`, `matches_regex`, `is_truthy`
//! - transforms: `get_key`, `length`, `to_number`

mod actions;
mod conditions;
mod shell;
mod transforms;

pub use self::actions::{AddAction, EchoAction, FailAction, PauseForAction, RequestDataAction};
pub use self::conditions::{EqualsCondition, GreaterThanCondition, IsTruthyCondition, MatchesRegexCondition};
pub use self::shell::ShellAction;
pub use self::transforms::{GetKeyTransform, LengthTransform, ToNumberTransform};

use serde_json::Value;

use crate::error::AppError;
use crate::registry::{App, AppRegistry};
use crate::schema::ArgumentMap;

/// Name the builtin app is registered under.
pub const BUILTIN_APP: &str = "builtin";

/// The builtin app with every implementation registered.
pub fn builtin_app() -> App {
    App::new(BUILTIN_APP)
        .with_action(EchoAction)
        .with_action(AddAction)
        .with_action(PauseForAction)
        .with_action(RequestDataAction)
        .with_action(FailAction)
        .with_action(ShellAction::new())
        .with_condition(EqualsCondition)
        .with_condition(GreaterThanCondition)
        .with_condition(MatchesRegexCondition)
        .with_condition(IsTruthyCondition)
        .with_transform(GetKeyTransform)
        .with_transform(LengthTransform)
        .with_transform(ToNumberTransform)
}

/// Create a registry with the builtin app registered.
pub fn create_default_registry() -> AppRegistry {
    let mut registry = AppRegistry::new();
    registry.register(builtin_app());
    registry
}

fn arg<'a>(args: &'a ArgumentMap, name: &str) -> Result<&'a Value, AppError> {
    args.get(name)
        .ok_or_else(|| AppError::InvalidInput(format!("missing argument '{}'", name)))
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Truthiness of a JSON value.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
