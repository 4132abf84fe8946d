//! Builtin actions.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use super::arg;
use crate::context::ActionContext;
use crate::error::AppError;
use crate::registry::{ActionOutput, AppAction};
use crate::schema::{ArgumentMap, ParamType, ParameterSchema, ParameterSpec};

/// Returns its `data` argument unchanged.
pub struct EchoAction;

#[async_trait]
impl AppAction for EchoAction {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::default()
            .with(ParameterSpec::optional("data", ParamType::Any).with_default(Value::Null))
    }

    async fn execute(
        &self,
        args: &ArgumentMap,
        _ctx: &ActionContext,
    ) -> Result<ActionOutput, AppError> {
        Ok(ActionOutput::Complete(
            args.get("data").cloned().unwrap_or(Value::Null),
        ))
    }
}

/// Integer sum of `a` and `b`.
pub struct AddAction;

#[async_trait]
impl AppAction for AddAction {
    fn name(&self) -> &'static str {
        "add"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::default()
            .with(ParameterSpec::required("a", ParamType::Integer))
            .with(ParameterSpec::optional("b", ParamType::Integer).with_default(json!(0)))
    }

    async fn execute(
        &self,
        args: &ArgumentMap,
        _ctx: &ActionContext,
    ) -> Result<ActionOutput, AppError> {
        let a = arg(args, "a")?
            .as_i64()
            .ok_or_else(|| AppError::InvalidInput("a is not an integer".to_string()))?;
        let b = args.get("b").and_then(Value::as_i64).unwrap_or(0);
        let sum = a
            .checked_add(b)
            .ok_or_else(|| AppError::ExecutionFailed(format!("{} + {} overflows", a, b)))?;
        Ok(ActionOutput::Complete(json!(sum)))
    }
}

/// Sleeps for `milliseconds`, then returns `data`.
pub struct PauseForAction;

#[async_trait]
impl AppAction for PauseForAction {
    fn name(&self) -> &'static str {
        "pause_for"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::default()
            .with(ParameterSpec::required("milliseconds", ParamType::Integer))
            .with(ParameterSpec::optional("data", ParamType::Any).with_default(Value::Null))
    }

    async fn execute(
        &self,
        args: &ArgumentMap,
        ctx: &ActionContext,
    ) -> Result<ActionOutput, AppError> {
        let millis = arg(args, "milliseconds")?
            .as_u64()
            .ok_or_else(|| AppError::InvalidInput("milliseconds must be positive".to_string()))?;
        tracing::debug!(
            execution_id = %ctx.execution_id,
            action = %ctx.action_id,
            millis,
            "Pausing"
        );
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(ActionOutput::Complete(
            args.get("data").cloned().unwrap_or(Value::Null),
        ))
    }
}

/// Suspends the execution until external data is sent to it.
pub struct RequestDataAction;

#[async_trait]
impl AppAction for RequestDataAction {
    fn name(&self) -> &'static str {
        "request_data"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::default()
            .with(ParameterSpec::optional("prompt", ParamType::String).with_default(json!("")))
    }

    async fn execute(
        &self,
        args: &ArgumentMap,
        _ctx: &ActionContext,
    ) -> Result<ActionOutput, AppError> {
        Ok(ActionOutput::AwaitData(json!({
            "prompt": args.get("prompt").cloned().unwrap_or(Value::Null),
        })))
    }
}

/// Always fails with `message`.
pub struct FailAction;

#[async_trait]
impl AppAction for FailAction {
    fn name(&self) -> &'static str {
        "fail"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::default().with(
            ParameterSpec::optional("message", ParamType::String).with_default(json!("failed")),
        )
    }

    async fn execute(
        &self,
        args: &ArgumentMap,
        _ctx: &ActionContext,
    ) -> Result<ActionOutput, AppError> {
        let message = args
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("failed");
        Err(AppError::ExecutionFailed(message.to_string()))
    }
}
