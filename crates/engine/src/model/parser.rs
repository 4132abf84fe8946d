//! Workflow definition parser.
//!
//! Definitions are written in YAML (or JSON) and deserialize straight into
//! [`Workflow`]. Parsing checks graph structure; binding to the registry
//! is a separate `Workflow::resolve` step.

use crate::error::{EngineError, EngineResult};
use crate::model::Workflow;

/// Parse a YAML string into a Workflow.
pub fn parse_workflow(yaml_content: &str) -> EngineResult<Workflow> {
    let workflow: Workflow = serde_yaml::from_str(yaml_content)?;
    workflow.validate().map_err(EngineError::Definition)?;
    Ok(workflow)
}

/// Parse a JSON string into a Workflow.
pub fn parse_workflow_json(json_content: &str) -> EngineResult<Workflow> {
    let workflow: Workflow = serde_json::from_str(json_content)?;
    workflow.validate().map_err(EngineError::Definition)?;
    Ok(workflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArgumentSource, BranchStatus, Operator};
    use serde_json::json;

    const APPROVAL: &str = r#"
name: approval
start: fetch
actions:
  - id: fetch
    app_name: builtin
    action_name: echo
    arguments:
      - name: data
        value:
          amount: 120
    branches:
      - destination: review
        priority: 1
        condition:
          operator: and
          conditions:
            - app_name: builtin
              action_name: greater_than
              transforms:
                - app_name: builtin
                  action_name: get_key
                  arguments:
                    - name: key
                      value: amount
              arguments:
                - name: threshold
                  value: 100
      - destination: done
        priority: 2
  - id: review
    app_name: builtin
    action_name: request_data
    branches:
      - destination: done
  - id: done
    app_name: builtin
    action_name: echo
    arguments:
      - name: data
        reference: fetch
        selection: [amount]
"#;

    #[test]
    fn test_parse_yaml() {
        let workflow = parse_workflow(APPROVAL).unwrap();
        assert_eq!(workflow.name, "approval");
        assert_eq!(workflow.start, "fetch");
        assert_eq!(workflow.actions.len(), 3);

        let fetch = workflow.action("fetch").unwrap();
        assert_eq!(fetch.branches.len(), 2);
        assert_eq!(fetch.branches[0].status, BranchStatus::Success);
        let condition = fetch.branches[0].condition.as_ref().unwrap();
        assert_eq!(condition.operator, Operator::And);
        assert_eq!(condition.conditions[0].transforms.len(), 1);

        let done = workflow.action("done").unwrap();
        assert!(matches!(
            &done.arguments[0].source,
            ArgumentSource::Reference { reference, selection }
                if reference == "fetch" && selection == &vec![json!("amount")]
        ));
    }

    #[test]
    fn test_parse_rejects_bad_graph() {
        let yaml = r#"
name: broken
start: nowhere
actions:
  - id: a
    app_name: builtin
    action_name: echo
"#;
        let err = parse_workflow(yaml).unwrap_err();
        assert!(matches!(err, EngineError::Definition(_)));
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let err = parse_workflow("name: [unclosed").unwrap_err();
        assert!(matches!(err, EngineError::Parse(_)));
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{"name": "j", "start": "a",
            "actions": [{"id": "a", "app_name": "builtin", "action_name": "echo"}]}"#;
        let workflow = parse_workflow_json(json).unwrap();
        assert!(workflow.has_action("a"));
    }
}
