//! Builtin transforms. Each takes the incoming data as `data`.

use serde_json::Value;

use super::{arg, as_f64};
use crate::context::Accumulator;
use crate::error::AppError;
use crate::registry::AppTransform;
use crate::schema::{ArgumentMap, ParamType, ParameterSchema, ParameterSpec};

fn data_param() -> ParameterSpec {
    ParameterSpec::required("data", ParamType::Any)
}

/// Look up `key` in an object, or an index in an array.
pub struct GetKeyTransform;

impl AppTransform for GetKeyTransform {
    fn name(&self) -> &'static str {
        "get_key"
    }

    fn data_parameter(&self) -> &'static str {
        "data"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::default()
            .with(data_param())
            .with(ParameterSpec::required("key", ParamType::String))
    }

    fn apply(&self, args: &ArgumentMap, _accumulator: &Accumulator) -> Result<Value, AppError> {
        let data = arg(args, "data")?;
        let key = arg(args, "key")?
            .as_str()
            .ok_or_else(|| AppError::InvalidInput("key is not a string".to_string()))?;
        let found = match data {
            Value::Object(obj) => obj.get(key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        found
            .cloned()
            .ok_or_else(|| AppError::InvalidInput(format!("key '{}' not found", key)))
    }
}

/// Length of a string, array or object.
pub struct LengthTransform;

impl AppTransform for LengthTransform {
    fn name(&self) -> &'static str {
        "length"
    }

    fn data_parameter(&self) -> &'static str {
        "data"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::default().with(data_param())
    }

    fn apply(&self, args: &ArgumentMap, _accumulator: &Accumulator) -> Result<Value, AppError> {
        let len = match arg(args, "data")? {
            Value::String(s) => s.chars().count(),
            Value::Array(items) => items.len(),
            Value::Object(obj) => obj.len(),
            other => {
                return Err(AppError::InvalidInput(format!("{} has no length", other)));
            }
        };
        Ok(Value::from(len))
    }
}

/// Parse a string or boolean into a number.
pub struct ToNumberTransform;

impl AppTransform for ToNumberTransform {
    fn name(&self) -> &'static str {
        "to_number"
    }

    fn data_parameter(&self) -> &'static str {
        "data"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::default().with(data_param())
    }

    fn apply(&self, args: &ArgumentMap, _accumulator: &Accumulator) -> Result<Value, AppError> {
        let data = arg(args, "data")?;
        if let Value::Number(_) = data {
            return Ok(data.clone());
        }
        if let Some(i) = data.as_str().and_then(|s| s.trim().parse::<i64>().ok()) {
            return Ok(Value::from(i));
        }
        as_f64(data)
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| AppError::InvalidInput(format!("{} is not numeric", data)))
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
    fn test_get_key() {
        let acc = Accumulator::new();
        let t = GetKeyTransform;
        let out = t
            .apply(&args(&[("data", json!({"status": "ok"})), ("key", json!("status"))]), &acc)
            .unwrap();
        assert_eq!(out, json!("ok"));

        let out = t
            .apply(&args(&[("data", json!(["a", "b"])), ("key", json!("1"))]), &acc)
            .unwrap();
        assert_eq!(out, json!("b"));

        assert!(t
            .apply(&args(&[("data", json!({})), ("key", json!("missing"))]), &acc)
            .is_err());
    }

    #[test]
    fn test_length() {
        let acc = Accumulator::new();
        let t = LengthTransform;
        assert_eq!(t.apply(&args(&[("data", json!("héllo"))]), &acc).unwrap(), json!(5));
        assert_eq!(t.apply(&args(&[("data", json!([1, 2]))]), &acc).unwrap(), json!(2));
        assert!(t.apply(&args(&[("data", json!(3))]), &acc).is_err());
    }

    #[test]
    fn test_to_number() {
        let acc = Accumulator::new();
        let t = ToNumberTransform;
        assert_eq!(t.apply(&args(&[("data", json!("42"))]), &acc).unwrap(), json!(42));
        assert_eq!(t.apply(&args(&[("data", json!("2.5"))]), &acc).unwrap(), json!(2.5));
        assert_eq!(t.apply(&args(&[("data", json!(7))]), &acc).unwrap(), json!(7));
        assert!(t.apply(&args(&[("data", json!("seven"))]), &acc).is_err());
    }
}
