//! Scheduler Bridge error taxonomy (spec §4.5, §7).

use osmo_types::{ErrorKind, OsmoError};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("tasks in group {0:?} reference different topology key sets")]
    NonUniformTopologyKeys(String),
    #[error("topology key {0:?} is not configured on pool {1:?}")]
    UnknownTopologyKey(String, String),
    #[error("topology node {0:?} has conflicting required/preferred requirements")]
    MixedRequiredness(String),
    #[error("unsupported scheduler type {0:?}")]
    UnsupportedScheduler(String),
}

impl From<SchedulerError> for OsmoError {
    fn from(err: SchedulerError) -> Self {
        OsmoError::new(ErrorKind::UserInput, err.to_string())
    }
}
