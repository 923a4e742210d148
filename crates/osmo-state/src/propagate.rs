//! Downstream failure propagation (spec §4.6: "Else if any task failed →
//! downstream groups become `FAILED_UPSTREAM`"). A group that never started
//! any tasks because an upstream dependency failed gets `FAILED_UPSTREAM`
//! directly, rather than waiting forever in `WAITING` for a barrier that will
//! never clear.

use std::collections::BTreeMap;

use osmo_types::{TaskGroup, TaskStatus};

/// Walks `groups` to a fixed point, marking any group that has not started
/// (`status == WAITING` and its upstream dependencies are not all satisfied)
/// as `FAILED_UPSTREAM` once any of its direct upstream groups has reached a
/// failed terminal status (`failed()`, i.e. not `COMPLETED`). Returns the
/// names of groups that changed.
pub fn cascade_upstream_failures(groups: &mut BTreeMap<String, TaskGroup>) -> Vec<String> {
    let mut changed = Vec::new();
    loop {
        let failed_names: Vec<String> =
            groups.iter().filter(|(_, g)| g.status.failed() || g.status == TaskStatus::FailedUpstream).map(|(n, _)| n.clone()).collect();

        let mut round_changed = false;
        for name in &failed_names {
            let downstream: Vec<String> = groups.get(name).map(|g| g.downstream_groups.iter().cloned().collect()).unwrap_or_default();
            for downstream_name in downstream {
                let should_fail = groups
                    .get(&downstream_name)
                    .map(|g| g.status == TaskStatus::Waiting && g.remaining_upstream_groups.contains(name))
                    .unwrap_or(false);
                if should_fail {
                    if let Some(group) = groups.get_mut(&downstream_name) {
                        group.status = TaskStatus::FailedUpstream;
                        group.remaining_upstream_groups.remove(name);
                        round_changed = true;
                        changed.push(downstream_name.clone());
                    }
                }
            }
        }
        if !round_changed {
            break;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn group(name: &str, status: TaskStatus, downstream: &[&str], remaining_upstream: &[&str]) -> TaskGroup {
        TaskGroup {
            group_uuid: format!("{name}-uuid"),
            workflow_id: "wf-1".into(),
            name: name.to_string(),
            spec: serde_json::Value::Null,
            status,
            remaining_upstream_groups: remaining_upstream.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            downstream_groups: downstream.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            barrier: false,
            last_retry_at: None,
        }
    }

    #[test]
    fn direct_downstream_of_a_failed_group_becomes_failed_upstream() {
        let mut groups = BTreeMap::new();
        groups.insert("fetch".to_string(), group("fetch", TaskStatus::Failed, &["build"], &[]));
        groups.insert("build".to_string(), group("build", TaskStatus::Waiting, &[], &["fetch"]));

        let changed = cascade_upstream_failures(&mut groups);
        assert_eq!(changed, vec!["build".to_string()]);
        assert_eq!(groups["build"].status, TaskStatus::FailedUpstream);
    }

    #[test]
    fn failure_cascades_transitively() {
        let mut groups = BTreeMap::new();
        groups.insert("fetch".to_string(), group("fetch", TaskStatus::Failed, &["build"], &[]));
        groups.insert("build".to_string(), group("build", TaskStatus::Waiting, &["deploy"], &["fetch"]));
        groups.insert("deploy".to_string(), group("deploy", TaskStatus::Waiting, &[], &["build"]));

        cascade_upstream_failures(&mut groups);
        assert_eq!(groups["build"].status, TaskStatus::FailedUpstream);
        assert_eq!(groups["deploy"].status, TaskStatus::FailedUpstream);
    }

    #[test]
    fn completed_upstream_does_not_propagate() {
        let mut groups = BTreeMap::new();
        groups.insert("fetch".to_string(), group("fetch", TaskStatus::Completed, &["build"], &[]));
        groups.insert("build".to_string(), group("build", TaskStatus::Waiting, &[], &["fetch"]));

        let changed = cascade_upstream_failures(&mut groups);
        assert!(changed.is_empty());
        assert_eq!(groups["build"].status, TaskStatus::Waiting);
    }

    #[test]
    fn already_started_downstream_is_untouched() {
        let mut groups = BTreeMap::new();
        groups.insert("fetch".to_string(), group("fetch", TaskStatus::Failed, &["build"], &[]));
        groups.insert("build".to_string(), group("build", TaskStatus::Running, &[], &[]));

        let changed = cascade_upstream_failures(&mut groups);
        assert!(changed.is_empty());
        assert_eq!(groups["build"].status, TaskStatus::Running);
    }
}
