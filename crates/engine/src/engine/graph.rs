//! Branch selection.

use serde_json::{json, Value};

use branchline_apps::Accumulator;

use crate::engine::evaluator::evaluate;
use crate::engine::state::ActionState;
use crate::error::{EngineError, EngineResult};
use crate::events::{EventKind, EventLog};
use crate::model::{ActionId, Workflow};

/// Select the action to run after `current_action_id`.
///
/// Branches whose status matches `outcome` are tried by ascending
/// priority; the first without a condition, or whose condition holds,
/// wins. `None` means the walk ends here. Revisiting actions is allowed.
pub fn next_action(
    workflow: &Workflow,
    current_action_id: &str,
    outcome: ActionState,
    result: &Value,
    accumulator: &Accumulator,
    log: &mut EventLog,
) -> EngineResult<Option<ActionId>> {
    let action = workflow.action(current_action_id).ok_or_else(|| {
        EngineError::NotFound(format!(
            "action {} in workflow {}",
            current_action_id, workflow.id
        ))
    })?;

    for branch in action.ordered_branches() {
        if !branch.status.matches(outcome) {
            continue;
        }
        let taken = match &branch.condition {
            None => true,
            Some(expression) => evaluate(expression, result, accumulator, log)?,
        };
        let payload = json!({"source": action.id, "destination": branch.destination});
        if taken {
            log.push(branch.id.to_string(), EventKind::BranchTaken, payload);
            return Ok(Some(branch.destination.clone()));
        }
        log.push(branch.id.to_string(), EventKind::BranchNotTaken, payload);
    }
    Ok(None)
}
