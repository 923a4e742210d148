//! Name discipline and DAG validation (spec §4.3 steps 3-4).

use std::collections::{HashMap, HashSet};

use osmo_types::ids::{is_valid_token_name, normalize_name};

use crate::error::CompileError;
use crate::spec::WorkflowSpec;

/// Validates task/group name grammar and rejects duplicates, comparing
/// case-insensitively with `_`/`-` treated as equal (spec §4.3 step 3).
pub fn validate_names(spec: &WorkflowSpec) -> Result<(), CompileError> {
    let mut seen = HashSet::new();
    for group in &spec.groups {
        check_and_record(&group.name, &mut seen)?;
        for task in &group.tasks {
            check_and_record(&task.name, &mut seen)?;
        }
    }
    Ok(())
}

fn check_and_record(name: &str, seen: &mut HashSet<String>) -> Result<(), CompileError> {
    if !is_valid_token_name(name) {
        return Err(CompileError::InvalidName(name.to_string()));
    }
    let normalized = normalize_name(name);
    if !seen.insert(normalized) {
        return Err(CompileError::DuplicateName(name.to_string()));
    }
    Ok(())
}

/// For each group with `inputs` referencing another task/group, the
/// referenced symbol must already be defined earlier in `groups[]`. Self- and
/// forward-references are rejected (spec §4.3 step 4). Cross-workflow inputs
/// (`{prev_workflow_id}:{task_name}`) are validated separately by the caller
/// via `is_cross_workflow_task_finished`, since resolving them requires a
/// durable-store lookup this crate does not own.
pub fn validate_dag(spec: &WorkflowSpec) -> Result<(), CompileError> {
    let mut defined: HashMap<String, usize> = HashMap::new();

    for (index, group) in spec.groups.iter().enumerate() {
        for input in &group.inputs {
            if input.cross_workflow_reference().is_some() {
                continue;
            }
            let Some(symbol) = input.dag_symbol() else { continue };

            if symbol.eq_ignore_ascii_case(&group.name) {
                return Err(CompileError::SelfReference(group.name.clone()));
            }
            match defined.get(symbol) {
                Some(&defined_at) if defined_at < index => {}
                Some(_) => return Err(CompileError::ForwardReference(group.name.clone(), symbol.to_string())),
                None => return Err(CompileError::UndefinedReference(group.name.clone(), symbol.to_string())),
            }
        }

        defined.insert(group.name.clone(), index);
        for task in &group.tasks {
            defined.insert(task.name.clone(), index);
        }
    }
    Ok(())
}

/// Total task count across all groups (spec §4.3 step 7).
pub fn total_tasks(spec: &WorkflowSpec) -> usize {
    spec.groups.iter().map(|g| g.tasks.len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::parse_workflow_spec;
    use serde_json::json;

    fn spec_with_groups(groups: serde_json::Value) -> WorkflowSpec {
        parse_workflow_spec(&json!({"name": "w", "groups": groups})).unwrap()
    }

    #[test]
    fn rejects_forward_reference() {
        let spec = spec_with_groups(json!([
            {"name": "a", "inputs": [{"group": "b"}], "tasks": [{"name": "ta", "image": "i"}]},
            {"name": "b", "tasks": [{"name": "tb", "image": "i"}]},
        ]));
        assert!(matches!(validate_dag(&spec), Err(CompileError::ForwardReference(_, _))));
    }

    #[test]
    fn rejects_self_reference() {
        let spec = spec_with_groups(json!([
            {"name": "a", "inputs": [{"group": "a"}], "tasks": [{"name": "ta", "image": "i"}]},
        ]));
        assert!(matches!(validate_dag(&spec), Err(CompileError::SelfReference(_))));
    }

    #[test]
    fn accepts_backward_reference() {
        let spec = spec_with_groups(json!([
            {"name": "a", "tasks": [{"name": "ta", "image": "i"}]},
            {"name": "b", "inputs": [{"group": "a"}], "tasks": [{"name": "tb", "image": "i"}]},
        ]));
        assert!(validate_dag(&spec).is_ok());
    }

    #[test]
    fn name_discipline_rejects_duplicates_case_insensitively() {
        let spec = spec_with_groups(json!([
            {"name": "A", "tasks": [{"name": "t1", "image": "i"}]},
            {"name": "a", "tasks": [{"name": "t2", "image": "i"}]},
        ]));
        assert!(matches!(validate_names(&spec), Err(CompileError::DuplicateName(_))));
    }
}
