//! Conditional expression evaluator.
//!
//! Evaluates a branch's operator tree over the data produced by the
//! action the branch leaves. Validation and predicate failures propagate
//! as [`EvaluationError`]; they are never read as `false`.

use serde_json::{json, Value};

use branchline_apps::Accumulator;

use crate::engine::validator::validate_arguments;
use crate::error::EvaluationError;
use crate::events::{EventKind, EventLog};
use crate::model::{Argument, Condition, ConditionalExpression, Operator, Transform};

/// Evaluate `expression` against `data_in`.
///
/// - `and`/`or` apply across the conditions and then the child
///   expressions; with nothing to evaluate `and` is true and `or` false.
/// - `xor` scans conditions before children and is false as soon as a
///   second true is seen.
/// - `truth`/`not` apply to the first condition, or the first child when
///   there are no conditions.
pub fn evaluate(
    expression: &ConditionalExpression,
    data_in: &Value,
    accumulator: &Accumulator,
    log: &mut EventLog,
) -> Result<bool, EvaluationError> {
    let result = evaluate_node(expression, data_in, accumulator, log);
    let entity = expression.id.to_string();
    match &result {
        Ok(true) => log.push(entity, EventKind::ConditionalExpressionTrue, Value::Null),
        Ok(false) => log.push(entity, EventKind::ConditionalExpressionFalse, Value::Null),
        Err(e) => log.push(
            entity,
            EventKind::ConditionalExpressionError,
            json!({"error": e.to_string()}),
        ),
    }
    result
}

fn evaluate_node(
    expression: &ConditionalExpression,
    data_in: &Value,
    accumulator: &Accumulator,
    log: &mut EventLog,
) -> Result<bool, EvaluationError> {
    match expression.operator {
        Operator::And => {
            for condition in &expression.conditions {
                if !evaluate_condition(condition, data_in, accumulator, log)? {
                    return Ok(false);
                }
            }
            for child in &expression.child_expressions {
                if !evaluate(child, data_in, accumulator, log)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Operator::Or => {
            for condition in &expression.conditions {
                if evaluate_condition(condition, data_in, accumulator, log)? {
                    return Ok(true);
                }
            }
            for child in &expression.child_expressions {
                if evaluate(child, data_in, accumulator, log)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Operator::Xor => {
            let mut seen = false;
            for condition in &expression.conditions {
                if evaluate_condition(condition, data_in, accumulator, log)? {
                    if seen {
                        return Ok(false);
                    }
                    seen = true;
                }
            }
            for child in &expression.child_expressions {
                if evaluate(child, data_in, accumulator, log)? {
                    if seen {
                        return Ok(false);
                    }
                    seen = true;
                }
            }
            Ok(seen)
        }
        Operator::Truth | Operator::Not => {
            let value = if let Some(condition) = expression.conditions.first() {
                evaluate_condition(condition, data_in, accumulator, log)?
            } else if let Some(child) = expression.child_expressions.first() {
                evaluate(child, data_in, accumulator, log)?
            } else {
                return Err(EvaluationError::NoTarget {
                    expression: expression.id,
                    operator: expression.operator.to_string(),
                });
            };
            Ok(if expression.operator == Operator::Not {
                !value
            } else {
                value
            })
        }
    }
}

/// Arguments with the data parameter replaced by `data`.
fn with_data(arguments: &[Argument], data_parameter: &str, data: Value) -> Vec<Argument> {
    let mut args: Vec<Argument> = arguments
        .iter()
        .filter(|a| a.name != data_parameter)
        .cloned()
        .collect();
    args.push(Argument::value(data_parameter, data));
    args
}

/// Thread `data_in` through the transforms, then run the predicate.
pub fn evaluate_condition(
    condition: &Condition,
    data_in: &Value,
    accumulator: &Accumulator,
    log: &mut EventLog,
) -> Result<bool, EvaluationError> {
    let result = run_condition(condition, data_in, accumulator, log);
    let entity = condition.id.to_string();
    match &result {
        Ok(value) => log.push(entity, EventKind::ConditionSuccess, json!({"result": value})),
        Err(e) => log.push(entity, EventKind::ConditionError, json!({"error": e.to_string()})),
    }
    result
}

fn run_condition(
    condition: &Condition,
    data_in: &Value,
    accumulator: &Accumulator,
    log: &mut EventLog,
) -> Result<bool, EvaluationError> {
    let binding = condition
        .binding
        .as_ref()
        .ok_or(EvaluationError::Unresolved {
            condition: condition.id,
        })?;

    let mut data = data_in.clone();
    for transform in &condition.transforms {
        data = apply_transform(transform, data, accumulator, log)?;
    }

    let arguments = with_data(&condition.arguments, &binding.data_parameter, data);
    let args = validate_arguments(&binding.parameters, &arguments, Some(accumulator)).map_err(
        |source| EvaluationError::ConditionArguments {
            condition: condition.id,
            source,
        },
    )?;

    let value = binding
        .predicate
        .evaluate(&args)
        .map_err(|e| EvaluationError::Predicate {
            condition: condition.id,
            message: e.to_string(),
        })?;

    Ok(value != condition.is_negated)
}

fn apply_transform(
    transform: &Transform,
    data: Value,
    accumulator: &Accumulator,
    log: &mut EventLog,
) -> Result<Value, EvaluationError> {
    let result = run_transform(transform, data, accumulator);
    let entity = transform.id.to_string();
    match &result {
        Ok(value) => log.push(entity, EventKind::TransformSuccess, json!({"result": value})),
        Err(e) => log.push(entity, EventKind::TransformError, json!({"error": e.to_string()})),
    }
    result
}

fn run_transform(
    transform: &Transform,
    data: Value,
    accumulator: &Accumulator,
) -> Result<Value, EvaluationError> {
    let binding = transform
        .binding
        .as_ref()
        .ok_or(EvaluationError::UnresolvedTransform {
            transform: transform.id,
        })?;

    let arguments = with_data(&transform.arguments, &binding.data_parameter, data);
    let args = validate_arguments(&binding.parameters, &arguments, Some(accumulator)).map_err(
        |source| EvaluationError::TransformArguments {
            transform: transform.id,
            source,
        },
    )?;

    binding
        .transform
        .apply(&args, accumulator)
        .map_err(|e| EvaluationError::Transform {
            transform: transform.id,
            message: e.to_string(),
        })
}
