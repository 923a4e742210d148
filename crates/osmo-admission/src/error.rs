//! Admission & Validator error taxonomy (spec §4.4, §7).

use osmo_types::{ErrorKind, OsmoError};

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("static resource assertion failed: {0}")]
    StaticAssertionFailed(String),
    #[error("no candidate node satisfied every per-node assertion: {0:?}")]
    NoCandidateNode(Vec<CandidateRejection>),
    #[error("privileged containers are not allowed on platform {0:?}")]
    PrivilegedDisallowed(String),
    #[error("hostNetwork is not allowed on platform {0:?}")]
    HostNetworkDisallowed(String),
    #[error("volume mount {0:?} is not allowed on platform {1:?}")]
    VolumeMountDisallowed(String, String),
    #[error("security policy check failed (memoized): {0}")]
    SecurityRejected(String),
    #[error("registry auth failed for {0:?}: {1}")]
    RegistryAuth(String, String),
    #[error("could not parse docker image {0:?}")]
    BadImageReference(String),
    #[error("registry connection error for {0:?}: {1}")]
    RegistryConnection(String, String),
    #[error("no credential named {0:?} grants {1:?} access to {2:?}")]
    NoDataCredential(String, String, String),
    #[error("user {0:?} exceeds max_num_workflows ({1} alive, limit {2})")]
    TooManyWorkflows(String, usize, usize),
    #[error("user {0:?} exceeds max_num_tasks ({1} alive + new, limit {2})")]
    TooManyTasks(String, usize, usize),
}

/// One candidate node's rejection reasons, surfaced in the 400 response table
/// (spec §4.4 "On failure, a table of candidate nodes and reasons").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CandidateRejection {
    pub hostname: String,
    pub reasons: Vec<String>,
}

impl From<AdmissionError> for OsmoError {
    fn from(err: AdmissionError) -> Self {
        let kind = match &err {
            AdmissionError::StaticAssertionFailed(_)
            | AdmissionError::NoCandidateNode(_)
            | AdmissionError::PrivilegedDisallowed(_)
            | AdmissionError::HostNetworkDisallowed(_)
            | AdmissionError::VolumeMountDisallowed(_, _)
            | AdmissionError::SecurityRejected(_) => ErrorKind::Resource,
            AdmissionError::RegistryAuth(_, _)
            | AdmissionError::BadImageReference(_)
            | AdmissionError::RegistryConnection(_, _)
            | AdmissionError::NoDataCredential(_, _, _) => ErrorKind::Credential,
            AdmissionError::TooManyWorkflows(_, _, _) | AdmissionError::TooManyTasks(_, _, _) => ErrorKind::Quota,
        };
        OsmoError::new(kind, err.to_string())
    }
}
