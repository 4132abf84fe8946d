//! Conditional expressions, conditions and transforms.
//!
//! Registry bindings are not serialized. After constructing or
//! deserializing an element call `resolve(&registry)`; it can be called
//! any number of times and always rebinds from the registry.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use branchline_apps::{AppRegistry, ResolvedCondition, ResolvedTransform};

use crate::engine::validator::validate_arguments;
use crate::error::{DefinitionError, DefinitionErrors, ElementKind, InvalidElement};
use crate::model::Argument;

/// Boolean operator of an expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    And,
    Or,
    Xor,
    Not,
    Truth,
}

impl Operator {
    /// Operators that delegate to a single target.
    pub fn is_unary(&self) -> bool {
        matches!(self, Self::Not | Self::Truth)
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::And => write!(f, "and"),
            Self::Or => write!(f, "or"),
            Self::Xor => write!(f, "xor"),
            Self::Not => write!(f, "not"),
            Self::Truth => write!(f, "truth"),
        }
    }
}

/// Arguments without the data parameter, which is supplied at evaluation.
fn static_arguments(arguments: &[Argument], data_parameter: &str) -> Vec<Argument> {
    arguments
        .iter()
        .filter(|a| a.name != data_parameter)
        .cloned()
        .collect()
}

/// A data mapping applied before a condition's predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transform {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    pub app_name: String,

    pub action_name: String,

    #[serde(default)]
    pub arguments: Vec<Argument>,

    #[serde(skip)]
    pub binding: Option<ResolvedTransform>,
}

impl Transform {
    pub fn new(app_name: impl Into<String>, action_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            app_name: app_name.into(),
            action_name: action_name.into(),
            arguments: Vec::new(),
            binding: None,
        }
    }

    pub fn with_argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    /// Bind to the registry and validate the static arguments.
    pub fn resolve(&mut self, registry: &AppRegistry) -> Result<(), DefinitionError> {
        let mut element = InvalidElement::new(ElementKind::Transform, self.id.to_string());
        self.binding = None;
        match registry.resolve_transform(&self.app_name, &self.action_name) {
            Ok(resolved) => {
                let schema = resolved.parameters.without(&resolved.data_parameter);
                let arguments = static_arguments(&self.arguments, &resolved.data_parameter);
                if let Err(err) = validate_arguments(&schema, &arguments, None) {
                    element.add_argument_error(&err);
                }
                self.binding = Some(resolved);
            }
            Err(err) => element.add_registry_error(&err),
        }
        let mut errors = DefinitionErrors::new();
        errors.push(element);
        errors.into_result()
    }
}

/// A leaf boolean test: transforms, then an app predicate, then negation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    pub app_name: String,

    pub action_name: String,

    #[serde(default)]
    pub transforms: Vec<Transform>,

    #[serde(default)]
    pub arguments: Vec<Argument>,

    #[serde(default)]
    pub is_negated: bool,

    #[serde(skip)]
    pub binding: Option<ResolvedCondition>,
}

impl Condition {
    pub fn new(app_name: impl Into<String>, action_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            app_name: app_name.into(),
            action_name: action_name.into(),
            transforms: Vec::new(),
            arguments: Vec::new(),
            is_negated: false,
            binding: None,
        }
    }

    pub fn with_argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn negated(mut self) -> Self {
        self.is_negated = true;
        self
    }

    /// Resolve and return the condition, failing with every problem found.
    pub fn resolved(mut self, registry: &AppRegistry) -> Result<Self, DefinitionError> {
        self.resolve(registry)?;
        Ok(self)
    }

    /// Bind the predicate and every transform and validate the static
    /// arguments.
    pub fn resolve(&mut self, registry: &AppRegistry) -> Result<(), DefinitionError> {
        let mut errors = DefinitionErrors::new();
        let mut element = InvalidElement::new(ElementKind::Condition, self.id.to_string());

        self.binding = None;
        match registry.resolve_condition(&self.app_name, &self.action_name) {
            Ok(resolved) => {
                let schema = resolved.parameters.without(&resolved.data_parameter);
                let arguments = static_arguments(&self.arguments, &resolved.data_parameter);
                if let Err(err) = validate_arguments(&schema, &arguments, None) {
                    element.add_argument_error(&err);
                }
                self.binding = Some(resolved);
            }
            Err(err) => element.add_registry_error(&err),
        }
        errors.push(element);

        for transform in &mut self.transforms {
            if let Err(err) = transform.resolve(registry) {
                errors.extend(err);
            }
        }
        errors.into_result()
    }
}

/// A boolean operator tree guarding a branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalExpression {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    pub operator: Operator,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default)]
    pub child_expressions: Vec<ConditionalExpression>,
}

impl ConditionalExpression {
    pub fn new(operator: Operator) -> Self {
        Self {
            id: Uuid::new_v4(),
            operator,
            conditions: Vec::new(),
            child_expressions: Vec::new(),
        }
    }

    /// Build a node, rejecting unary operators with nothing to apply to.
    pub fn try_new(
        operator: Operator,
        conditions: Vec<Condition>,
        child_expressions: Vec<ConditionalExpression>,
    ) -> Result<Self, DefinitionError> {
        let expression = Self {
            id: Uuid::new_v4(),
            operator,
            conditions,
            child_expressions,
        };
        let mut errors = DefinitionErrors::new();
        expression.check_structure(&mut errors);
        errors.into_result()?;
        Ok(expression)
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_child(mut self, child: ConditionalExpression) -> Self {
        self.child_expressions.push(child);
        self
    }

    /// `not`/`truth` need a first condition or a first child.
    pub fn has_target(&self) -> bool {
        !self.conditions.is_empty() || !self.child_expressions.is_empty()
    }

    fn check_node(&self, errors: &mut DefinitionErrors) {
        if self.operator.is_unary() && !self.has_target() {
            let mut element =
                InvalidElement::new(ElementKind::ConditionalExpression, self.id.to_string());
            element.add(
                "operator",
                format!("'{}' requires a condition or a child expression", self.operator),
            );
            errors.push(element);
        }
    }

    /// Record structural problems of this tree.
    pub fn check_structure(&self, errors: &mut DefinitionErrors) {
        self.check_node(errors);
        for child in &self.child_expressions {
            child.check_structure(errors);
        }
    }

    /// Resolve every condition in the tree and check its structure.
    pub fn resolve(&mut self, registry: &AppRegistry) -> Result<(), DefinitionError> {
        let mut errors = DefinitionErrors::new();
        self.resolve_into(registry, &mut errors);
        errors.into_result()
    }

    pub(crate) fn resolve_into(&mut self, registry: &AppRegistry, errors: &mut DefinitionErrors) {
        self.check_node(errors);
        for condition in &mut self.conditions {
            if let Err(err) = condition.resolve(registry) {
                errors.extend(err);
            }
        }
        for child in &mut self.child_expressions {
            child.resolve_into(registry, errors);
        }
    }
}
