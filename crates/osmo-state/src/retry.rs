//! Retry semantics (spec §4.6 "Retries", §8 scenario 7): a failed task in a
//! non-barrier group may become a new `retry_id+1` attempt; a barrier group
//! reruns every task on any single failure.

use osmo_types::{Task, TaskStatus};

/// Per-backend/scheduler retry gate (spec §4.6: "policy is configurable per
/// backend/scheduler (`retry_allowed` gate)").
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retry_allowed: bool,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { retry_allowed: true, max_retries: 3 }
    }
}

/// Builds the next attempt for `task`, provided the policy allows it and the
/// task actually failed (not `FAILED_CANCELED`, which never retries). The
/// caller is responsible for writing the new row and flipping the old row's
/// status to `RESCHEDULED` (spec §3: "Retries create new `task_uuid` but
/// reuse `task_db_key`").
pub fn next_attempt(task: &Task, policy: &RetryPolicy) -> Option<Task> {
    if !policy.retry_allowed || !task.status.failed() || task.status == TaskStatus::FailedCanceled {
        return None;
    }
    if task.retry_id + 1 > policy.max_retries {
        return None;
    }

    let mut attempt = task.clone();
    attempt.retry_id = task.retry_id + 1;
    attempt.task_uuid = osmo_types::ids::generate_unique_id(32);
    attempt.status = TaskStatus::Waiting;
    attempt.node_name = None;
    attempt.start_time = None;
    attempt.end_time = None;
    attempt.last_heartbeat = None;
    Some(attempt)
}

/// Whether a barrier group should rerun all of its tasks (spec §4.6:
/// "A barrier group reruns all tasks on any failure").
pub fn should_rerun_barrier_group(barrier: bool, task_statuses: &[TaskStatus]) -> bool {
    barrier && task_statuses.iter().any(|s| s.failed() && *s != TaskStatus::FailedCanceled)
}
