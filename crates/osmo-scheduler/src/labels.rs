//! Pod and subgroup labeling (spec §4.5 "Pod labeling").

use std::collections::BTreeMap;

use osmo_types::Priority;

/// Labels every emitted pod carries, regardless of scheduler (spec §4.5):
/// `osmo.pool`, `osmo.priority`, `osmo.task_name`, `osmo.task_uuid`,
/// `osmo.group_uuid`, `osmo.workflow_uuid`, `osmo.user`.
pub struct PodLabelInputs<'a> {
    pub pool: &'a str,
    pub priority: Priority,
    pub task_name: &'a str,
    pub task_uuid: &'a str,
    pub group_uuid: &'a str,
    pub workflow_uuid: &'a str,
    pub user: &'a str,
}

pub fn base_pod_labels(inputs: &PodLabelInputs<'_>) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("osmo.pool".to_string(), inputs.pool.to_string()),
        ("osmo.priority".to_string(), inputs.priority.priority_class().to_string()),
        ("osmo.task_name".to_string(), inputs.task_name.to_string()),
        ("osmo.task_uuid".to_string(), inputs.task_uuid.to_string()),
        ("osmo.group_uuid".to_string(), inputs.group_uuid.to_string()),
        ("osmo.workflow_uuid".to_string(), inputs.workflow_uuid.to_string()),
        ("osmo.user".to_string(), inputs.user.to_string()),
    ])
}

/// `kai.scheduler/subgroup-name`, stamped on leaf pods that belong to a
/// subgroup (spec §4.5.1 step 6).
pub const SUBGROUP_NAME_LABEL: &str = "kai.scheduler/subgroup-name";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_labels_cover_every_spec_field() {
        let inputs = PodLabelInputs {
            pool: "default",
            priority: Priority::High,
            task_name: "build",
            task_uuid: "t-1",
            group_uuid: "g-1",
            workflow_uuid: "w-1",
            user: "alice",
        };
        let labels = base_pod_labels(&inputs);
        assert_eq!(labels["osmo.priority"], "osmo-high");
        assert_eq!(labels.len(), 7);
    }
}
