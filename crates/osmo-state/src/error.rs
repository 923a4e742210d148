//! State Machine error taxonomy (spec §4.6, §7).

use osmo_types::{ErrorKind, OsmoError};

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("workflow {0:?} is already finished; pass --force to cancel it anyway")]
    AlreadyFinished(String),
    #[error("task {0:?} cannot be retried: retries are disallowed for this backend/scheduler")]
    RetryNotAllowed(String),
    #[error("task {0:?} exceeded its maximum retry count ({1})")]
    MaxRetriesExceeded(String, u32),
    #[error("exec on task {0:?} attempted before it is running")]
    TooEarly(String),
    #[error("exec on task {0:?} attempted after its workflow finished")]
    Gone(String),
    #[error("notification dispatch failed: {0}")]
    NotificationFailed(String),
}

impl From<StateError> for OsmoError {
    fn from(err: StateError) -> Self {
        let kind = match &err {
            StateError::AlreadyFinished(_) => ErrorKind::UserInput,
            StateError::RetryNotAllowed(_) | StateError::MaxRetriesExceeded(_, _) => ErrorKind::UserInput,
            StateError::TooEarly(_) => ErrorKind::TooEarly,
            StateError::Gone(_) => ErrorKind::Gone,
            StateError::NotificationFailed(_) => ErrorKind::Server,
        };
        OsmoError::new(kind, err.to_string())
    }
}
