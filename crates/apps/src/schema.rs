//! Parameter schemas declared by actions, conditions and transforms.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Validated, converted arguments keyed by parameter name.
pub type ArgumentMap = HashMap<String, Value>;

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    #[default]
    Any,
}

impl ParamType {
    /// Convert a supplied value to this type.
    ///
    /// Strings that parse as the requested scalar are converted, integers
    /// widen to numbers and scalars render to strings. Returns `None` when
    /// no conversion applies.
    pub fn convert(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (ParamType::Any, v) => Some(v.clone()),
            (ParamType::String, Value::String(_)) => Some(value.clone()),
            (ParamType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (ParamType::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
            (ParamType::Integer, Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::from(i))
                } else {
                    n.as_f64()
                        .filter(|f| {
                            f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64
                        })
                        .map(|f| Value::from(f as i64))
                }
            }
            (ParamType::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            (ParamType::Number, Value::Number(_)) => Some(value.clone()),
            (ParamType::Number, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            (ParamType::Boolean, Value::Bool(_)) => Some(value.clone()),
            (ParamType::Boolean, Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            (ParamType::Array, Value::Array(_)) => Some(value.clone()),
            (ParamType::Object, Value::Object(_)) => Some(value.clone()),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
            ParamType::Any => "any",
        };
        write!(f, "{}", s)
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,

    #[serde(rename = "type", default)]
    pub param_type: ParamType,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParameterSpec {
    /// A required parameter.
    pub fn required(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: true,
            default: None,
        }
    }

    /// An optional parameter with no default.
    pub fn optional(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: false,
            default: None,
        }
    }

    /// Set the default used when the argument is not supplied.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Ordered list of declared parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSchema {
    parameters: Vec<ParameterSpec>,
}

impl ParameterSchema {
    pub fn new(parameters: Vec<ParameterSpec>) -> Self {
        Self { parameters }
    }

    /// Builder-style push.
    pub fn with(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.parameters.iter()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// The schema with one parameter removed.
    ///
    /// Conditions and transforms receive their data parameter from the
    /// running data, so definition-time validation checks the rest only.
    pub fn without(&self, name: &str) -> Self {
        Self {
            parameters: self
                .parameters
                .iter()
                .filter(|p| p.name != name)
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_convert_integer() {
        assert_eq!(ParamType::Integer.convert(&json!(5)), Some(json!(5)));
        assert_eq!(ParamType::Integer.convert(&json!("42")), Some(json!(42)));
        assert_eq!(ParamType::Integer.convert(&json!(3.0)), Some(json!(3)));
        assert_eq!(ParamType::Integer.convert(&json!("abc")), None);
        assert_eq!(ParamType::Integer.convert(&json!(2.5)), None);
        assert_eq!(ParamType::Integer.convert(&json!(1e300)), None);
        assert_eq!(ParamType::Integer.convert(&json!(u64::MAX)), None);
        assert_eq!(
            ParamType::Integer.convert(&json!(-1e18)),
            Some(json!(-1_000_000_000_000_000_000i64))
        );
    }

    #[test]
    fn test_convert_boolean_and_string() {
        assert_eq!(ParamType::Boolean.convert(&json!("TRUE")), Some(json!(true)));
        assert_eq!(ParamType::Boolean.convert(&json!("yes")), None);
        assert_eq!(ParamType::String.convert(&json!(7)), Some(json!("7")));
        assert_eq!(ParamType::String.convert(&json!([1])), None);
    }

    #[test]
    fn test_convert_any_accepts_everything() {
        assert_eq!(ParamType::Any.convert(&json!({"a": 1})), Some(json!({"a": 1})));
        assert_eq!(ParamType::Any.convert(&Value::Null), Some(Value::Null));
    }

    #[test]
    fn test_schema_without() {
        let schema = ParameterSchema::default()
            .with(ParameterSpec::required("value", ParamType::Any))
            .with(ParameterSpec::optional("other", ParamType::String));

        let rest = schema.without("value");
        assert_eq!(rest.len(), 1);
        assert!(rest.contains("other"));
        assert!(!rest.contains("value"));
    }

    #[test]
    fn test_spec_deserialize() {
        let spec: ParameterSpec =
            serde_json::from_value(json!({"name": "x", "type": "integer", "required": true}))
                .unwrap();
        assert_eq!(spec, ParameterSpec::required("x", ParamType::Integer));
    }
}
