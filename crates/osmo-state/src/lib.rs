//! State Machine (spec §4.6): computes workflow/group status from task
//! status, propagates upstream failures across a workflow's dependency DAG,
//! and funnels all workflow status writes through a single CAS entry point
//! that enforces write-once fields and terminal-state immutability.

pub mod aggregate;
pub mod cancellation;
pub mod error;
pub mod notify;
pub mod propagate;
pub mod retry;
pub mod timeout;
pub mod transitions;

pub use aggregate::{aggregate_group_status, aggregate_workflow_status};
pub use cancellation::{apply_cancel, apply_force_cancel, validate_cancel, CancelOutcome};
pub use error::StateError;
pub use notify::{should_notify, InMemoryNotifier, NotificationPreferences, Notifier, TerminalEvent};
pub use propagate::cascade_upstream_failures;
pub use retry::{next_attempt, should_rerun_barrier_group, RetryPolicy};
pub use timeout::{exec_timeout_expired, queue_timeout_expired};
pub use transitions::{apply_transition, TransitionRequest};

#[cfg(test)]
mod tests {
    use super::*;
    use osmo_types::{Priority, TaskStatus, WorkflowStatus};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    /// A small end-to-end run through the pieces this crate exposes: a
    /// workflow with two groups, one of which fails, cascades into a
    /// `FAILED_UPSTREAM` downstream group, aggregates up to a failed
    /// workflow status, and finally gets funneled through the CAS entry
    /// point to its terminal state exactly once.
    #[test]
    fn workflow_lifecycle_from_task_failure_to_terminal_status() {
        let mut groups = BTreeMap::new();
        groups.insert(
            "fetch".to_string(),
            osmo_types::TaskGroup {
                group_uuid: "fetch-uuid".into(),
                workflow_id: "wf-1".into(),
                name: "fetch".into(),
                spec: serde_json::Value::Null,
                status: aggregate_group_status(&[TaskStatus::FailedImagePull]),
                remaining_upstream_groups: Default::default(),
                downstream_groups: ["build".to_string()].into_iter().collect(),
                barrier: false,
                last_retry_at: None,
            },
        );
        groups.insert(
            "build".to_string(),
            osmo_types::TaskGroup {
                group_uuid: "build-uuid".into(),
                workflow_id: "wf-1".into(),
                name: "build".into(),
                spec: serde_json::Value::Null,
                status: TaskStatus::Waiting,
                remaining_upstream_groups: ["fetch".to_string()].into_iter().collect(),
                downstream_groups: Default::default(),
                barrier: false,
                last_retry_at: None,
            },
        );

        assert_eq!(groups["fetch"].status, TaskStatus::FailedImagePull);

        cascade_upstream_failures(&mut groups);
        assert_eq!(groups["build"].status, TaskStatus::FailedUpstream);

        let group_statuses: Vec<TaskStatus> = groups.values().map(|g| g.status).collect();
        let workflow_status = aggregate_workflow_status(&group_statuses);
        assert_eq!(workflow_status, WorkflowStatus::FailedImagePull);

        let mut workflow = osmo_types::Workflow {
            workflow_uuid: "wf-uuid-1".into(),
            workflow_name: "nightly-build".into(),
            job_id: 42,
            submitted_by: "alice".into(),
            backend: "kai".into(),
            pool: "default".into(),
            priority: Priority::Normal,
            status: WorkflowStatus::Running,
            submit_time: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            start_time: Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 1, 0).unwrap()),
            end_time: None,
            exec_timeout: None,
            queue_timeout: None,
            parent_name: None,
            parent_job_id: None,
            app_uuid: None,
            app_version: None,
            tags: BTreeMap::new(),
            plugins: serde_json::Value::Null,
            cancelled_by: None,
            failure_message: None,
            logs: None,
            outputs: None,
        };

        apply_transition(&mut workflow, TransitionRequest::new(workflow_status).failure_message("fetch: image pull failed")).unwrap();
        assert_eq!(workflow.status, WorkflowStatus::FailedImagePull);
        assert!(workflow.end_time.is_some());

        let err = apply_transition(&mut workflow, TransitionRequest::new(WorkflowStatus::Running)).unwrap_err();
        assert!(matches!(err, StateError::AlreadyFinished(_)));
    }
}
