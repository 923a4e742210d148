//! Timeout clocks (spec §4.6 "Timeouts"): `queue_timeout` bounds how long a
//! task may sit `in_queue()`, `exec_timeout` bounds how long it may run once
//! started.

use chrono::{DateTime, Duration, Utc};

use osmo_types::{Task, TaskStatus};

/// Whether `task` has overstayed `queue_timeout` counted from `submit_time`
/// (the workflow's submission instant — queue time is not reset per retry
/// attempt, spec §4.6).
pub fn queue_timeout_expired(task: &Task, submit_time: DateTime<Utc>, queue_timeout: Duration, now: DateTime<Utc>) -> bool {
    task.status.in_queue() && now - submit_time > queue_timeout
}

/// Whether a running task has overstayed `exec_timeout` counted from its own
/// `start_time`.
pub fn exec_timeout_expired(task: &Task, exec_timeout: Duration, now: DateTime<Utc>) -> bool {
    match task.start_time {
        Some(start) if task.status == TaskStatus::Running => now - start > exec_timeout,
        _ => false,
    }
}
