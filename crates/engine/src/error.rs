//! Error types for the execution engine.
//!
//! Library code returns [`EngineError`]. Definition and argument problems
//! are aggregated so every problem can be reported at once.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

use branchline_apps::{ParamType, RegistryError};

use crate::engine::state::WorkflowState;

/// Kind of definition element an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Workflow,
    Action,
    Branch,
    ConditionalExpression,
    Condition,
    Transform,
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Workflow => write!(f, "workflow"),
            Self::Action => write!(f, "action"),
            Self::Branch => write!(f, "branch"),
            Self::ConditionalExpression => write!(f, "conditional_expression"),
            Self::Condition => write!(f, "condition"),
            Self::Transform => write!(f, "transform"),
        }
    }
}

/// One invalid element with its problems grouped by field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidElement {
    pub kind: ElementKind,
    pub id: String,
    pub errors: BTreeMap<String, Vec<String>>,
}

impl InvalidElement {
    pub fn new(kind: ElementKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            errors: BTreeMap::new(),
        }
    }

    /// Record a problem with one field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Record a registry resolution failure against the field it concerns.
    pub fn add_registry_error(&mut self, err: &RegistryError) {
        let field = match err {
            RegistryError::UnknownApp(_) => "app_name",
            _ => "action_name",
        };
        self.add(field, err.to_string());
    }

    /// Record every issue of an argument validation failure.
    pub fn add_argument_error(&mut self, err: &ArgumentError) {
        for issue in &err.issues {
            self.add("arguments", issue.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl std::fmt::Display for InvalidElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: ", self.kind, self.id)?;
        let mut first = true;
        for (field, messages) in &self.errors {
            for message in messages {
                if !first {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Collects invalid elements while walking a definition.
#[derive(Debug, Default)]
pub struct DefinitionErrors {
    elements: Vec<InvalidElement>,
}

impl DefinitionErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the element if it recorded any problem.
    pub fn push(&mut self, element: InvalidElement) {
        if !element.is_empty() {
            self.elements.push(element);
        }
    }

    /// Merge the elements of a nested failure.
    pub fn extend(&mut self, err: DefinitionError) {
        match err {
            DefinitionError::Invalid(elements) => self.elements.extend(elements),
            other => {
                let mut element = InvalidElement::new(ElementKind::Workflow, "");
                element.add("definition", other.to_string());
                self.elements.push(element);
            }
        }
    }

    pub fn into_result(self) -> Result<(), DefinitionError> {
        if self.elements.is_empty() {
            Ok(())
        } else {
            Err(DefinitionError::Invalid(self.elements))
        }
    }
}

/// A workflow definition (or the reference to one) is unusable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DefinitionError {
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("Action {action} not found in workflow {workflow}")]
    ActionNotFound { workflow: Uuid, action: String },

    #[error("Invalid definition: {}", join(.0.iter()))]
    Invalid(Vec<InvalidElement>),
}

impl DefinitionError {
    /// Invalid elements, empty for not-found errors.
    pub fn elements(&self) -> &[InvalidElement] {
        match self {
            Self::Invalid(elements) => elements,
            _ => &[],
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::WorkflowNotFound(_) | Self::ActionNotFound { .. }
        )
    }
}

fn join<'a, T: std::fmt::Display + 'a>(items: impl Iterator<Item = &'a T>) -> String {
    items
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A single problem found while validating arguments.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ArgumentIssue {
    #[error("missing required parameter '{name}'")]
    MissingRequiredParameter { name: String },

    #[error("unknown parameter '{name}' (value {value})")]
    UnknownParameter { name: String, value: Value },

    #[error("cannot convert {value} to {expected} for parameter '{name}'")]
    TypeConversionFailed {
        name: String,
        value: Value,
        expected: ParamType,
    },

    #[error("unresolved reference '{reference}' for parameter '{name}'")]
    UnresolvedReference { name: String, reference: String },
}

impl ArgumentIssue {
    /// Parameter the issue concerns.
    pub fn name(&self) -> &str {
        match self {
            Self::MissingRequiredParameter { name }
            | Self::UnknownParameter { name, .. }
            | Self::TypeConversionFailed { name, .. }
            | Self::UnresolvedReference { name, .. } => name,
        }
    }
}

/// Every issue found in one validation pass.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("Invalid arguments: {}", join(.issues.iter()))]
pub struct ArgumentError {
    pub issues: Vec<ArgumentIssue>,
}

/// Failure while evaluating a branch's conditional expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("Condition {condition} is not resolved against the registry")]
    Unresolved { condition: Uuid },

    #[error("Transform {transform} is not resolved against the registry")]
    UnresolvedTransform { transform: Uuid },

    #[error("Condition {condition}: {source}")]
    ConditionArguments {
        condition: Uuid,
        #[source]
        source: ArgumentError,
    },

    #[error("Transform {transform}: {source}")]
    TransformArguments {
        transform: Uuid,
        #[source]
        source: ArgumentError,
    },

    #[error("Condition {condition} failed: {message}")]
    Predicate { condition: Uuid, message: String },

    #[error("Transform {transform} failed: {message}")]
    Transform { transform: Uuid, message: String },

    #[error("Expression {expression} ({operator}) has no target")]
    NoTarget { expression: Uuid, operator: String },
}

/// Top-level engine error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Argument(#[from] ArgumentError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// Worker crash, queue failure or storage failure.
    #[error("Infrastructure error: {0}")]
    Infrastructure(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: WorkflowState,
        to: WorkflowState,
    },

    /// The execution is completed or aborted.
    #[error("Execution {0} is terminal")]
    Terminal(Uuid),

    /// Parse error (YAML, JSON).
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// A state write refused because another writer got to the execution
    /// first.
    pub fn is_lost_race(&self) -> bool {
        matches!(self, Self::Terminal(_) | Self::InvalidTransition { .. })
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        EngineError::Parse(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invalid_element_display() {
        let mut element = InvalidElement::new(ElementKind::Condition, "c1");
        element.add("app_name", "Unknown app nope");
        element.add("arguments", "missing required parameter 'x'");
        assert_eq!(
            element.to_string(),
            "condition c1: app_name: Unknown app nope, arguments: missing required parameter 'x'"
        );
    }

    #[test]
    fn test_definition_errors_skip_clean_elements() {
        let mut errors = DefinitionErrors::new();
        errors.push(InvalidElement::new(ElementKind::Action, "ok"));
        assert!(errors.into_result().is_ok());
    }

    #[test]
    fn test_argument_error_display() {
        let err = ArgumentError {
            issues: vec![ArgumentIssue::TypeConversionFailed {
                name: "x".to_string(),
                value: json!("abc"),
                expected: ParamType::Integer,
            }],
        };
        assert_eq!(
            err.to_string(),
            "Invalid arguments: cannot convert \"abc\" to integer for parameter 'x'"
        );
        assert_eq!(err.issues[0].name(), "x");
    }

    #[test]
    fn test_not_found_classification() {
        let err = DefinitionError::WorkflowNotFound(Uuid::nil());
        assert!(err.is_not_found());
        assert!(err.elements().is_empty());
    }
}
