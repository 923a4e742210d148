//! Workflow cancellation (spec §4.6 "Cancellation", §8 scenario 8): a normal
//! cancel transitions a live workflow to `FAILED_CANCELED`; a force-cancel
//! operates on a workflow whose backend has gone unresponsive and fabricates
//! a synthetic job id to keep the audit trail coherent.

use osmo_types::{ids::force_cancel_job_id, WorkflowStatus};

use crate::error::StateError;

/// Validates that `workflow_id` (named only for the error message) may be
/// canceled: only alive workflows can transition to `FAILED_CANCELED` (spec
/// §8 invariant 4: terminal states do not revert).
pub fn validate_cancel(workflow_id: &str, current: WorkflowStatus) -> Result<(), StateError> {
    if current.finished() {
        return Err(StateError::AlreadyFinished(workflow_id.to_string()));
    }
    Ok(())
}

/// Outcome of a successful cancel: the new status plus, for force-cancels,
/// the synthetic job id to record against the workflow (spec §4.6: "a
/// synthetic `job_id` is minted so the cancellation still has an audit
/// trail entry even though the backend never reported one").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelOutcome {
    pub status: WorkflowStatus,
    pub synthetic_job_id: Option<String>,
}

/// Applies a normal, backend-acknowledged cancel.
pub fn apply_cancel(workflow_id: &str, current: WorkflowStatus) -> Result<CancelOutcome, StateError> {
    validate_cancel(workflow_id, current)?;
    Ok(CancelOutcome { status: WorkflowStatus::FailedCanceled, synthetic_job_id: None })
}

/// Applies a force-cancel: the backend is presumed unresponsive, so a
/// synthetic job id stands in for the missing backend-side confirmation.
pub fn apply_force_cancel(workflow_uuid: &str, current: WorkflowStatus) -> Result<CancelOutcome, StateError> {
    validate_cancel(workflow_uuid, current)?;
    Ok(CancelOutcome {
        status: WorkflowStatus::FailedCanceled,
        synthetic_job_id: Some(force_cancel_job_id(workflow_uuid)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alive_workflow_can_be_canceled() {
        let outcome = apply_cancel("wf-1", WorkflowStatus::Running).unwrap();
        assert_eq!(outcome.status, WorkflowStatus::FailedCanceled);
        assert!(outcome.synthetic_job_id.is_none());
    }

    #[test]
    fn finished_workflow_cannot_be_canceled_again() {
        let err = apply_cancel("wf-1", WorkflowStatus::Completed).unwrap_err();
        assert!(matches!(err, StateError::AlreadyFinished(_)));
    }

    #[test]
    fn force_cancel_mints_a_synthetic_job_id() {
        let outcome = apply_force_cancel("wf-uuid-1", WorkflowStatus::Running).unwrap();
        assert_eq!(outcome.status, WorkflowStatus::FailedCanceled);
        let job_id = outcome.synthetic_job_id.unwrap();
        assert!(job_id.starts_with("wf-uuid-1-"));
        assert!(job_id.ends_with("-force-cancel"));
    }

    #[test]
    fn force_cancel_also_refuses_finished_workflows() {
        let err = apply_force_cancel("wf-1", WorkflowStatus::FailedCanceled).unwrap_err();
        assert!(matches!(err, StateError::AlreadyFinished(_)));
    }
}
