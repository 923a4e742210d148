//! Per-user workflow/task quota enforcement (spec §4.4 "User quotas"), run
//! before admission completes: `max_num_workflows` bounds the count of the
//! user's currently-alive workflows; `max_num_tasks` bounds the sum of the
//! user's alive tasks plus the new workflow's task count.

use serde::{Deserialize, Serialize};

use crate::error::AdmissionError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UserWorkflowLimits {
    pub max_num_workflows: usize,
    pub max_num_tasks: usize,
}

/// Checks a submission against a user's limits (spec §4.4).
/// `alive_workflows`/`alive_tasks` count the user's currently non-finished
/// workflows/tasks; `new_task_count` is the submission's own task count.
pub fn check_user_quota(
    user: &str,
    limits: &UserWorkflowLimits,
    alive_workflows: usize,
    alive_tasks: usize,
    new_task_count: usize,
) -> Result<(), AdmissionError> {
    if alive_workflows + 1 > limits.max_num_workflows {
        return Err(AdmissionError::TooManyWorkflows(user.to_string(), alive_workflows + 1, limits.max_num_workflows));
    }
    let total_tasks = alive_tasks + new_task_count;
    if total_tasks > limits.max_num_tasks {
        return Err(AdmissionError::TooManyTasks(user.to_string(), total_tasks, limits.max_num_tasks));
    }
    Ok(())
}
