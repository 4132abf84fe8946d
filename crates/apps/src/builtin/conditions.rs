//! Builtin branch conditions. Each takes the data under test as `value`.

use regex::Regex;
use serde_json::Value;

use super::{arg, as_f64, is_truthy};
use crate::error::AppError;
use crate::registry::AppCondition;
use crate::schema::{ArgumentMap, ParamType, ParameterSchema, ParameterSpec};

fn value_param() -> ParameterSpec {
    ParameterSpec::required("value", ParamType::Any)
}

/// `value == expected`. Numbers compare by value, so `1` equals `1.0`.
pub struct EqualsCondition;

impl AppCondition for EqualsCondition {
    fn name(&self) -> &'static str {
        "equals"
    }

    fn data_parameter(&self) -> &'static str {
        "value"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::default()
            .with(value_param())
            .with(ParameterSpec::required("expected", ParamType::Any))
    }

    fn evaluate(&self, args: &ArgumentMap) -> Result<bool, AppError> {
        let value = arg(args, "value")?;
        let expected = arg(args, "expected")?;
        Ok(match (value, expected) {
            (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
            (a, b) => a == b,
        })
    }
}

/// `value > threshold`, numerically.
pub struct GreaterThanCondition;

impl AppCondition for GreaterThanCondition {
    fn name(&self) -> &'static str {
        "greater_than"
    }

    fn data_parameter(&self) -> &'static str {
        "value"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::default()
            .with(value_param())
            .with(ParameterSpec::required("threshold", ParamType::Number))
    }

    fn evaluate(&self, args: &ArgumentMap) -> Result<bool, AppError> {
        let value = arg(args, "value")?;
        let value = as_f64(value)
            .ok_or_else(|| AppError::InvalidInput(format!("{} is not a number", value)))?;
        let threshold = arg(args, "threshold")?
            .as_f64()
            .ok_or_else(|| AppError::InvalidInput("threshold is not a number".to_string()))?;
        Ok(value > threshold)
    }
}

/// `value` is a string matching `pattern` anywhere.
pub struct MatchesRegexCondition;

impl AppCondition for MatchesRegexCondition {
    fn name(&self) -> &'static str {
        "matches_regex"
    }

    fn data_parameter(&self) -> &'static str {
        "value"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::default()
            .with(ParameterSpec::required("value", ParamType::String))
            .with(ParameterSpec::required("pattern", ParamType::String))
    }

    fn evaluate(&self, args: &ArgumentMap) -> Result<bool, AppError> {
        let value = arg(args, "value")?
            .as_str()
            .ok_or_else(|| AppError::InvalidInput("value is not a string".to_string()))?;
        let pattern = arg(args, "pattern")?
            .as_str()
            .ok_or_else(|| AppError::InvalidInput("pattern is not a string".to_string()))?;
        let re = Regex::new(pattern)
            .map_err(|e| AppError::InvalidInput(format!("invalid pattern: {}", e)))?;
        Ok(re.is_match(value))
    }
}

/// `value` is truthy: non-null, non-zero, non-empty.
pub struct IsTruthyCondition;

impl AppCondition for IsTruthyCondition {
    fn name(&self) -> &'static str {
        "is_truthy"
    }

    fn data_parameter(&self) -> &'static str {
        "value"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::default().with(value_param())
    }

    fn evaluate(&self, args: &ArgumentMap) -> Result<bool, AppError> {
        Ok(is_truthy(arg(args, "value")?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(pairs: &[(&str, Value)]) -> ArgumentMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_equals() {
        let c = EqualsCondition;
        assert!(c.evaluate(&args(&[("value", json!(1)), ("expected", json!(1.0))])).unwrap());
        assert!(c.evaluate(&args(&[("value", json!("a")), ("expected", json!("a"))])).unwrap());
        assert!(!c.evaluate(&args(&[("value", json!("a")), ("expected", json!("b"))])).unwrap());
    }

    #[test]
    fn test_greater_than() {
        let c = GreaterThanCondition;
        assert!(c.evaluate(&args(&[("value", json!(5)), ("threshold", json!(3))])).unwrap());
        assert!(!c.evaluate(&args(&[("value", json!("2")), ("threshold", json!(3))])).unwrap());
        assert!(c
            .evaluate(&args(&[("value", json!([1])), ("threshold", json!(3))]))
            .is_err());
    }

    #[test]
    fn test_matches_regex() {
        let c = MatchesRegexCondition;
        assert!(c
            .evaluate(&args(&[("value", json!("order-123")), ("pattern", json!(r"^order-\d+$"))]))
            .unwrap());
        assert!(!c
            .evaluate(&args(&[("value", json!("invoice")), ("pattern", json!("^order"))]))
            .unwrap());
        assert!(c
            .evaluate(&args(&[("value", json!("x")), ("pattern", json!("(unclosed"))]))
            .is_err());
    }

    #[test]
    fn test_is_truthy() {
        let c = IsTruthyCondition;
        assert!(c.evaluate(&args(&[("value", json!("yes"))])).unwrap());
        assert!(!c.evaluate(&args(&[("value", Value::Null)])).unwrap());
        assert!(c.evaluate(&ArgumentMap::new()).is_err());
    }
}
