//! The funneled compare-and-set entry point for workflow status writes (spec
//! §8 invariant 4: "terminal states never revert"; §3: `start_time`,
//! `end_time`, `cancelled_by` are write-once). Every status change a caller
//! wants to persist should pass through `apply_transition` rather than
//! writing `workflow.status` directly, so the write-once/CAS rules cannot be
//! bypassed by a shortcut call site.

use chrono::{DateTime, Utc};

use osmo_types::{Workflow, WorkflowStatus};

use crate::error::StateError;

/// A transition request: the new status plus whatever write-once fields this
/// particular transition sets (most only set one, cancellation sets both
/// `end_time` and `cancelled_by`).
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub new_status: WorkflowStatus,
    pub now: Option<DateTime<Utc>>,
    pub cancelled_by: Option<String>,
    pub failure_message: Option<String>,
}

impl TransitionRequest {
    pub fn new(new_status: WorkflowStatus) -> Self {
        Self { new_status, now: None, cancelled_by: None, failure_message: None }
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn cancelled_by(mut self, who: impl Into<String>) -> Self {
        self.cancelled_by = Some(who.into());
        self
    }

    pub fn failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = Some(message.into());
        self
    }
}

/// Applies `request` to `workflow` in place, enforcing:
/// - a finished workflow's status never changes again (CAS on `finished()`);
/// - `start_time` is set exactly once, the first time status becomes `RUNNING`;
/// - `end_time` is set exactly once, the first time the new status is `finished()`;
/// - `cancelled_by` is set exactly once, only by a cancellation transition.
pub fn apply_transition(workflow: &mut Workflow, request: TransitionRequest) -> Result<(), StateError> {
    if workflow.status.finished() {
        return Err(StateError::AlreadyFinished(workflow.workflow_id()));
    }

    let now = request.now.unwrap_or_else(Utc::now);

    if request.new_status == WorkflowStatus::Running && workflow.start_time.is_none() {
        workflow.start_time = Some(now);
    }

    if request.new_status.finished() && workflow.end_time.is_none() {
        workflow.end_time = Some(now);
    }

    if let Some(cancelled_by) = request.cancelled_by {
        if workflow.cancelled_by.is_none() {
            workflow.cancelled_by = Some(cancelled_by);
        }
    }

    if request.failure_message.is_some() && workflow.failure_message.is_none() {
        workflow.failure_message = request.failure_message;
    }

    workflow.status = request.new_status;
    Ok(())
}
