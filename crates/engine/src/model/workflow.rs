//! Workflow, action and branch definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use branchline_apps::{AppAction, AppRegistry, ParameterSchema};

use crate::engine::state::ActionState;
use crate::engine::validator::validate_arguments;
use crate::error::{DefinitionError, DefinitionErrors, ElementKind, InvalidElement};
use crate::model::{Argument, ConditionalExpression};

/// Id of an action, unique within its workflow.
pub type ActionId = String;

/// Which result status of the source action a branch applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BranchStatus {
    #[default]
    Success,
    Failure,
}

impl BranchStatus {
    pub fn matches(&self, state: ActionState) -> bool {
        matches!(
            (self, state),
            (Self::Success, ActionState::Success) | (Self::Failure, ActionState::Failure)
        )
    }
}

/// A directed, priority-ordered, optionally guarded edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    /// Owning action. Optional in definitions; checked when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ActionId>,

    pub destination: ActionId,

    /// Lowest value is tried first.
    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub status: BranchStatus,

    /// No condition means the branch is always taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionalExpression>,
}

impl Branch {
    pub fn new(destination: impl Into<ActionId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: None,
            destination: destination.into(),
            priority: 0,
            status: BranchStatus::Success,
            condition: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_condition(mut self, condition: ConditionalExpression) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn on_failure(mut self) -> Self {
        self.status = BranchStatus::Failure;
        self
    }
}

/// An action resolved to its implementation.
#[derive(Clone)]
pub struct ActionBinding {
    pub action: Arc<dyn AppAction>,
    pub parameters: ParameterSchema,
}

impl std::fmt::Debug for ActionBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionBinding")
            .field("action", &self.action.name())
            .field("parameters", &self.parameters.len())
            .finish()
    }
}

/// One executable step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,

    pub app_name: String,

    pub action_name: String,

    #[serde(default)]
    pub arguments: Vec<Argument>,

    #[serde(default)]
    pub branches: Vec<Branch>,

    #[serde(skip)]
    pub binding: Option<ActionBinding>,
}

impl Action {
    pub fn new(
        id: impl Into<ActionId>,
        app_name: impl Into<String>,
        action_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            app_name: app_name.into(),
            action_name: action_name.into(),
            arguments: Vec::new(),
            branches: Vec::new(),
            binding: None,
        }
    }

    pub fn with_argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn with_branch(mut self, branch: Branch) -> Self {
        self.branches.push(branch);
        self
    }

    /// Branches in the order they are tried: ascending priority, ties in
    /// declaration order.
    pub fn ordered_branches(&self) -> Vec<&Branch> {
        let mut branches: Vec<&Branch> = self.branches.iter().collect();
        branches.sort_by_key(|b| b.priority);
        branches
    }

    fn resolve_into(&mut self, registry: &AppRegistry, errors: &mut DefinitionErrors) {
        let mut element = InvalidElement::new(ElementKind::Action, self.id.clone());
        self.binding = None;
        match registry.resolve_action(&self.app_name, &self.action_name) {
            Ok((action, parameters)) => {
                if let Err(err) = validate_arguments(&parameters, &self.arguments, None) {
                    element.add_argument_error(&err);
                }
                self.binding = Some(ActionBinding { action, parameters });
            }
            Err(err) => element.add_registry_error(&err),
        }
        errors.push(element);

        for branch in &mut self.branches {
            if let Some(condition) = &mut branch.condition {
                condition.resolve_into(registry, errors);
            }
        }
    }
}

/// A stored graph of actions connected by branches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    pub name: String,

    /// Id of the first action.
    pub start: ActionId,

    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, start: impl Into<ActionId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            start: start.into(),
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn action(&self, id: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.id == id)
    }

    pub fn has_action(&self, id: &str) -> bool {
        self.action(id).is_some()
    }

    /// Check graph structure without consulting the registry.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        let mut errors = DefinitionErrors::new();
        self.check_structure(&mut errors);
        errors.into_result()
    }

    /// Bind every action, condition and transform and report every
    /// structural and resolution problem at once.
    pub fn resolve(&mut self, registry: &AppRegistry) -> Result<(), DefinitionError> {
        let mut errors = DefinitionErrors::new();
        self.check_graph(&mut errors);
        for action in &mut self.actions {
            action.resolve_into(registry, &mut errors);
        }
        errors.into_result()
    }

    /// Whether every action and condition has been bound.
    pub fn is_resolved(&self) -> bool {
        self.actions.iter().all(|a| a.binding.is_some())
    }

    fn check_structure(&self, errors: &mut DefinitionErrors) {
        self.check_graph(errors);
        for action in &self.actions {
            for branch in &action.branches {
                if let Some(condition) = &branch.condition {
                    condition.check_structure(errors);
                }
            }
        }
    }

    fn check_graph(&self, errors: &mut DefinitionErrors) {
        let mut workflow = InvalidElement::new(ElementKind::Workflow, self.id.to_string());
        if !self.has_action(&self.start) {
            workflow.add("start", format!("start action '{}' does not exist", self.start));
        }
        let mut seen = HashSet::new();
        for action in &self.actions {
            if !seen.insert(action.id.as_str()) {
                workflow.add("actions", format!("duplicate action id '{}'", action.id));
            }
        }
        errors.push(workflow);

        for action in &self.actions {
            for branch in &action.branches {
                let mut element = InvalidElement::new(ElementKind::Branch, branch.id.to_string());
                if !self.has_action(&branch.destination) {
                    element.add(
                        "destination",
                        format!("destination action '{}' does not exist", branch.destination),
                    );
                }
                if let Some(source) = &branch.source {
                    if source != &action.id {
                        element.add(
                            "source",
                            format!("source '{}' does not match owning action '{}'", source, action.id),
                        );
                    }
                }
                errors.push(element);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Condition, Operator};
    use branchline_apps::create_default_registry;
    use serde_json::json;

    fn two_step() -> Workflow {
        Workflow::new("two", "a")
            .with_action(
                Action::new("a", "builtin", "echo")
                    .with_argument(Argument::value("data", json!(1)))
                    .with_branch(Branch::new("b")),
            )
            .with_action(Action::new("b", "builtin", "echo"))
    }

    #[test]
    fn test_validate_ok() {
        assert!(two_step().validate().is_ok());
    }

    #[test]
    fn test_validate_structure() {
        let mut workflow = two_step();
        workflow.start = "missing".to_string();
        workflow.actions.push(Action::new("b", "builtin", "echo"));
        workflow.actions[0].branches.push(Branch::new("nowhere"));
        workflow.actions[0]
            .branches
            .push(Branch::new("b").with_condition(ConditionalExpression::new(Operator::Not)));

        let err = workflow.validate().unwrap_err();
        let elements = err.elements();
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[0].kind, ElementKind::Workflow);
        assert!(elements[0].errors.contains_key("start"));
        assert!(elements[0].errors.contains_key("actions"));
        assert_eq!(elements[1].kind, ElementKind::Branch);
        assert_eq!(elements[2].kind, ElementKind::ConditionalExpression);
    }

    #[test]
    fn test_resolve_binds_and_aggregates() {
        let registry = create_default_registry();
        let mut workflow = two_step();
        assert!(!workflow.is_resolved());
        workflow.resolve(&registry).unwrap();
        assert!(workflow.is_resolved());

        let mut broken = two_step();
        broken.actions[1].action_name = "nope".to_string();
        broken.actions[0].branches[0].condition = Some(
            ConditionalExpression::new(Operator::And)
                .with_condition(Condition::new("builtin", "equals")),
        );
        let err = broken.resolve(&registry).unwrap_err();
        let kinds: Vec<ElementKind> = err.elements().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ElementKind::Condition, ElementKind::Action]);
    }

    #[test]
    fn test_ordered_branches_stable() {
        let action = Action::new("a", "builtin", "echo")
            .with_branch(Branch::new("x").with_priority(2))
            .with_branch(Branch::new("y").with_priority(1))
            .with_branch(Branch::new("z").with_priority(1));
        let order: Vec<&str> = action
            .ordered_branches()
            .iter()
            .map(|b| b.destination.as_str())
            .collect();
        assert_eq!(order, vec!["y", "z", "x"]);
    }

    #[test]
    fn test_branch_status_matching() {
        assert!(BranchStatus::Success.matches(ActionState::Success));
        assert!(!BranchStatus::Success.matches(ActionState::Failure));
        assert!(BranchStatus::Failure.matches(ActionState::Failure));
        assert!(!BranchStatus::Failure.matches(ActionState::AwaitingData));
    }
}
