//! App registry and dispatch.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::{Accumulator, ActionContext};
use crate::error::{AppError, RegistryError};
use crate::schema::{ArgumentMap, ParameterSchema};

/// What an action invocation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutput {
    /// The action finished with a result.
    Complete(Value),
    /// The action needs external input before the workflow can continue.
    /// The payload describes what is being waited for.
    AwaitData(Value),
}

/// An executable workflow step.
#[async_trait]
pub trait AppAction: Send + Sync {
    /// Name the action is registered under inside its app.
    fn name(&self) -> &'static str;

    /// Declared parameters.
    fn parameters(&self) -> ParameterSchema;

    /// Invoke the action with validated arguments.
    async fn execute(
        &self,
        args: &ArgumentMap,
        ctx: &ActionContext,
    ) -> Result<ActionOutput, AppError>;
}

/// A boolean predicate used by branch conditions.
pub trait AppCondition: Send + Sync {
    fn name(&self) -> &'static str;

    /// Parameter that receives the (transformed) data under test.
    fn data_parameter(&self) -> &'static str;

    /// Declared parameters, data parameter included.
    fn parameters(&self) -> ParameterSchema;

    fn evaluate(&self, args: &ArgumentMap) -> Result<bool, AppError>;
}

/// A data mapping applied before a condition's predicate.
pub trait AppTransform: Send + Sync {
    fn name(&self) -> &'static str;

    /// Parameter that receives the incoming data.
    fn data_parameter(&self) -> &'static str;

    /// Declared parameters, data parameter included.
    fn parameters(&self) -> ParameterSchema;

    fn apply(&self, args: &ArgumentMap, accumulator: &Accumulator) -> Result<Value, AppError>;
}

/// A condition resolved to its callable and schema.
#[derive(Clone)]
pub struct ResolvedCondition {
    pub data_parameter: String,
    pub predicate: Arc<dyn AppCondition>,
    pub parameters: ParameterSchema,
}

/// A transform resolved to its callable and schema.
#[derive(Clone)]
pub struct ResolvedTransform {
    pub data_parameter: String,
    pub transform: Arc<dyn AppTransform>,
    pub parameters: ParameterSchema,
}

impl std::fmt::Debug for ResolvedCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCondition")
            .field("predicate", &self.predicate.name())
            .field("data_parameter", &self.data_parameter)
            .finish()
    }
}

impl std::fmt::Debug for ResolvedTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedTransform")
            .field("transform", &self.transform.name())
            .field("data_parameter", &self.data_parameter)
            .finish()
    }
}

/// A named bundle of actions, conditions and transforms.
pub struct App {
    name: String,
    actions: HashMap<String, Arc<dyn AppAction>>,
    conditions: HashMap<String, Arc<dyn AppCondition>>,
    transforms: HashMap<String, Arc<dyn AppTransform>>,
}

impl App {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: HashMap::new(),
            conditions: HashMap::new(),
            transforms: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn register_action<T: AppAction + 'static>(&mut self, action: T) {
        self.actions.insert(action.name().to_string(), Arc::new(action));
    }

    pub fn register_condition<T: AppCondition + 'static>(&mut self, condition: T) {
        self.conditions
            .insert(condition.name().to_string(), Arc::new(condition));
    }

    pub fn register_transform<T: AppTransform + 'static>(&mut self, transform: T) {
        self.transforms
            .insert(transform.name().to_string(), Arc::new(transform));
    }

    pub fn with_action<T: AppAction + 'static>(mut self, action: T) -> Self {
        self.register_action(action);
        self
    }

    pub fn with_condition<T: AppCondition + 'static>(mut self, condition: T) -> Self {
        self.register_condition(condition);
        self
    }

    pub fn with_transform<T: AppTransform + 'static>(mut self, transform: T) -> Self {
        self.register_transform(transform);
        self
    }

    fn sorted(keys: impl Iterator<Item = String>) -> Vec<String> {
        let mut names: Vec<String> = keys.collect();
        names.sort();
        names
    }

    pub fn action_names(&self) -> Vec<String> {
        Self::sorted(self.actions.keys().cloned())
    }

    pub fn condition_names(&self) -> Vec<String> {
        Self::sorted(self.conditions.keys().cloned())
    }

    pub fn transform_names(&self) -> Vec<String> {
        Self::sorted(self.transforms.keys().cloned())
    }
}

/// Registry of available apps.
pub struct AppRegistry {
    apps: HashMap<String, App>,
}

impl AppRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            apps: HashMap::new(),
        }
    }

    /// Register an app, replacing any app with the same name.
    pub fn register(&mut self, app: App) {
        self.apps.insert(app.name.clone(), app);
    }

    pub fn has(&self, app: &str) -> bool {
        self.apps.contains_key(app)
    }

    pub fn app(&self, app: &str) -> Option<&App> {
        self.apps.get(app)
    }

    /// List all registered app names.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.apps.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    fn get_app(&self, app: &str) -> Result<&App, RegistryError> {
        self.apps
            .get(app)
            .ok_or_else(|| RegistryError::UnknownApp(app.to_string()))
    }

    /// Resolve an action to its callable and parameter schema.
    pub fn resolve_action(
        &self,
        app: &str,
        action: &str,
    ) -> Result<(Arc<dyn AppAction>, ParameterSchema), RegistryError> {
        let found = self.get_app(app)?.actions.get(action).cloned().ok_or_else(|| {
            RegistryError::UnknownAction {
                app: app.to_string(),
                action: action.to_string(),
            }
        })?;
        let schema = found.parameters();
        Ok((found, schema))
    }

    /// Resolve a condition to its data parameter, predicate and schema.
    pub fn resolve_condition(
        &self,
        app: &str,
        condition: &str,
    ) -> Result<ResolvedCondition, RegistryError> {
        let predicate = self
            .get_app(app)?
            .conditions
            .get(condition)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownCondition {
                app: app.to_string(),
                condition: condition.to_string(),
            })?;
        Ok(ResolvedCondition {
            data_parameter: predicate.data_parameter().to_string(),
            parameters: predicate.parameters(),
            predicate,
        })
    }

    /// Resolve a transform to its data parameter, callable and schema.
    pub fn resolve_transform(
        &self,
        app: &str,
        transform: &str,
    ) -> Result<ResolvedTransform, RegistryError> {
        let found = self
            .get_app(app)?
            .transforms
            .get(transform)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownTransform {
                app: app.to_string(),
                transform: transform.to_string(),
            })?;
        Ok(ResolvedTransform {
            data_parameter: found.data_parameter().to_string(),
            parameters: found.parameters(),
            transform: found,
        })
    }
}

impl Default for AppRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AppRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppRegistry")
            .field("apps", &self.list())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ParamType, ParameterSpec};
    use serde_json::json;

    struct MockAction;

    #[async_trait]
    impl AppAction for MockAction {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn parameters(&self) -> ParameterSchema {
            ParameterSchema::default().with(ParameterSpec::required("x", ParamType::Integer))
        }

        async fn execute(
            &self,
            args: &ArgumentMap,
            _ctx: &ActionContext,
        ) -> Result<ActionOutput, AppError> {
            Ok(ActionOutput::Complete(json!({"x": args.get("x")})))
        }
    }

    struct AlwaysTrue;

    impl AppCondition for AlwaysTrue {
        fn name(&self) -> &'static str {
            "always"
        }

        fn data_parameter(&self) -> &'static str {
            "value"
        }

        fn parameters(&self) -> ParameterSchema {
            ParameterSchema::default().with(ParameterSpec::required("value", ParamType::Any))
        }

        fn evaluate(&self, _args: &ArgumentMap) -> Result<bool, AppError> {
            Ok(true)
        }
    }

    fn registry() -> AppRegistry {
        let mut registry = AppRegistry::new();
        registry.register(App::new("test").with_action(MockAction).with_condition(AlwaysTrue));
        registry
    }

    #[test]
    fn test_registry_new() {
        let registry = AppRegistry::new();
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_registry_register() {
        let registry = registry();
        assert!(registry.has("test"));
        assert!(!registry.has("unknown"));
        assert_eq!(registry.list(), vec!["test"]);
        assert_eq!(registry.app("test").unwrap().action_names(), vec!["mock"]);
    }

    #[tokio::test]
    async fn test_resolve_and_execute_action() {
        let registry = registry();
        let (action, schema) = registry.resolve_action("test", "mock").unwrap();
        assert!(schema.contains("x"));

        let mut args = ArgumentMap::new();
        args.insert("x".to_string(), json!(3));
        let ctx = ActionContext::default();
        let output = action.execute(&args, &ctx).await.unwrap();
        assert_eq!(output, ActionOutput::Complete(json!({"x": 3})));
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = registry();
        assert!(matches!(
            registry.resolve_action("nope", "mock"),
            Err(RegistryError::UnknownApp(_))
        ));
        assert!(matches!(
            registry.resolve_action("test", "nope"),
            Err(RegistryError::UnknownAction { .. })
        ));
        assert!(matches!(
            registry.resolve_condition("test", "nope"),
            Err(RegistryError::UnknownCondition { .. })
        ));
        assert!(matches!(
            registry.resolve_transform("test", "nope"),
            Err(RegistryError::UnknownTransform { .. })
        ));
    }

    #[test]
    fn test_resolve_condition() {
        let registry = registry();
        let resolved = registry.resolve_condition("test", "always").unwrap();
        assert_eq!(resolved.data_parameter, "value");
        assert!(resolved.predicate.evaluate(&ArgumentMap::new()).unwrap());
    }
}
