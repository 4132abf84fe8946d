//! Named argument values supplied to actions, conditions and transforms.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use branchline_apps::Accumulator;

/// A named argument.
///
/// ```yaml
/// - name: threshold
///   value: 100
/// - name: data
///   reference: fetch
///   selection: [items, 0]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,

    #[serde(flatten)]
    pub source: ArgumentSource,
}

/// Where an argument's value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentSource {
    /// Result of a previously executed action, optionally narrowed by a
    /// selection path of object keys and array indices.
    Reference {
        reference: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        selection: Vec<Value>,
    },
    /// A literal value.
    Value { value: Value },
}

impl Argument {
    /// A literal argument.
    pub fn value(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            source: ArgumentSource::Value { value },
        }
    }

    /// An argument referencing the result of the action `action_id`.
    pub fn reference(name: impl Into<String>, action_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: ArgumentSource::Reference {
                reference: action_id.into(),
                selection: Vec::new(),
            },
        }
    }

    /// Narrow a reference argument. No effect on literals.
    pub fn with_selection(mut self, path: Vec<Value>) -> Self {
        if let ArgumentSource::Reference { selection, .. } = &mut self.source {
            *selection = path;
        }
        self
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.source, ArgumentSource::Reference { .. })
    }

    /// The value as written in the definition, for error reporting.
    pub fn raw(&self) -> Value {
        match &self.source {
            ArgumentSource::Value { value } => value.clone(),
            ArgumentSource::Reference { reference, .. } => Value::String(format!("@{}", reference)),
        }
    }

    /// Resolve the value against the accumulator.
    ///
    /// Returns `None` when the referenced entry or a selection step does
    /// not exist.
    pub fn resolve(&self, accumulator: &Accumulator) -> Option<Value> {
        match &self.source {
            ArgumentSource::Value { value } => Some(value.clone()),
            ArgumentSource::Reference {
                reference,
                selection,
            } => {
                let mut current = accumulator.get(reference)?;
                for step in selection {
                    current = select(current, step)?;
                }
                Some(current.clone())
            }
        }
    }
}

fn select<'a>(value: &'a Value, step: &Value) -> Option<&'a Value> {
    match (value, step) {
        (Value::Object(obj), Value::String(key)) => obj.get(key),
        (Value::Array(items), Value::Number(n)) => {
            n.as_u64().and_then(|i| items.get(i as usize))
        }
        (Value::Array(items), Value::String(s)) => {
            s.parse::<usize>().ok().and_then(|i| items.get(i))
        }
        _ => None,
    }
}
