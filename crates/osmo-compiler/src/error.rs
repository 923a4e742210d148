//! Compiler error taxonomy (spec §4.3, §7).

use osmo_types::{ErrorKind, OsmoError};

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("spec must have exactly one of `groups` or `tasks`, found {0}")]
    ShapeAmbiguous(&'static str),
    #[error("invalid name {0:?}: must match [a-zA-Z]([a-zA-Z0-9_-]*[a-zA-Z0-9])?")]
    InvalidName(String),
    #[error("duplicate name {0:?} (case/`_`/`-`-insensitive)")]
    DuplicateName(String),
    #[error("group {0:?} references undefined symbol {1:?}")]
    UndefinedReference(String, String),
    #[error("group {0:?} references itself")]
    SelfReference(String),
    #[error("group {0:?} references {1:?}, which is defined later (forward reference)")]
    ForwardReference(String, String),
    #[error("cross-workflow input {0:?} does not resolve to a finished task")]
    UnresolvedCrossWorkflowInput(String),
    #[error("resource spec {0:?} not found")]
    UnknownResourceSpec(String),
    #[error("platform {0:?} not found in pool {1:?}")]
    UnknownPlatform(String, String),
    #[error("pod template {0:?} not found")]
    UnknownPodTemplate(String),
    #[error("total task count {actual} exceeds workflow_config.max_num_tasks {max}")]
    TooManyTasks { actual: usize, max: usize },
    #[error("malformed resource quantity {0:?}")]
    BadQuantity(String),
    #[error("{0}")]
    Parse(String),
}

impl From<CompileError> for OsmoError {
    fn from(err: CompileError) -> Self {
        OsmoError::new(ErrorKind::UserInput, err.to_string())
    }
}
