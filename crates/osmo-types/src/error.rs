//! Shared error taxonomy (spec §7)
//!
//! Every crate in the workspace defines its own `thiserror` enum for its own
//! failure modes, but each variant maps onto one of these coarse kinds so the
//! (out-of-scope) HTTP layer can translate to a status code without pulling
//! an HTTP framework into the core crates.

use serde::{Deserialize, Serialize};

/// Coarse error classification used to pick an HTTP status and disposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Spec parse failure, invalid name, duplicate names, missing pool, bad priority. 400, no retry.
    UserInput,
    /// Bad template variable, bad registry URL, bad regex. 400.
    Usage,
    /// No node satisfies assertions, missing platform, privileged disallowed. 400 + candidate table.
    Resource,
    /// Registry/data-backend credential failure. 400.
    Credential,
    /// Tenant workflow/task limit exceeded. 400.
    Quota,
    /// Unknown workflow/task/group/backend/pool. 404.
    NotFound,
    /// Action attempted before its precondition holds (e.g. exec on a not-yet-running task). 425.
    TooEarly,
    /// Action attempted after the resource can no longer accept it (e.g. exec on a finished workflow). 410.
    Gone,
    /// Unique-constraint races and other transient storage errors. Retried with full jitter.
    Database,
    /// Cluster unreachable, apply failed. Surfaced as a server error; may drive `FAILED_BACKEND_ERROR`.
    Backend,
    /// Renderer subprocess crash, unexpected internal error. 500.
    Server,
}

impl ErrorKind {
    /// Whether this class of error is safe to retry internally (as opposed to
    /// surfacing immediately to the caller).
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::Database)
    }

    /// Whether the error is attributable to the caller (as opposed to the service).
    pub fn is_user_error(self) -> bool {
        matches!(
            self,
            ErrorKind::UserInput
                | ErrorKind::Usage
                | ErrorKind::Resource
                | ErrorKind::Credential
                | ErrorKind::Quota
                | ErrorKind::NotFound
                | ErrorKind::TooEarly
                | ErrorKind::Gone
        )
    }
}

/// An error carrying enough context for client correlation (spec §7: "Workflow-scoped
/// errors always carry the `workflow_id`").
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct OsmoError {
    pub kind: ErrorKind,
    pub message: String,
    pub workflow_id: Option<String>,
}

impl OsmoError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            workflow_id: None,
        }
    }

    pub fn with_workflow(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }
}
