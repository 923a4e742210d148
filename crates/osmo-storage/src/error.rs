//! Durable-store error taxonomy (spec §7 "Database", §9 encryption notes).

use osmo_types::{ErrorKind, OsmoError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("workflow {0:?} not found")]
    WorkflowNotFound(String),
    #[error("group {0:?}/{1:?} not found")]
    GroupNotFound(String, String),
    #[error("task {0:?}/{1:?} retry {2} not found")]
    TaskNotFound(String, String, u32),
    #[error("credential {0:?}/{1:?} not found")]
    CredentialNotFound(String, String),
    #[error("unique-constraint conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("encryption error: {0}")]
    Encryption(String),
    #[error("unknown master key id {0:?}; rotate the key ring before decrypting this value")]
    UnknownMasterKeyId(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // Postgres unique_violation is SQLSTATE 23505 (spec §7: retried up to 5x).
            if db_err.code().as_deref() == Some("23505") {
                return StoreError::Conflict(db_err.message().to_string());
            }
        }
        StoreError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<StoreError> for OsmoError {
    fn from(err: StoreError) -> Self {
        let kind = match &err {
            StoreError::WorkflowNotFound(_)
            | StoreError::GroupNotFound(_, _)
            | StoreError::TaskNotFound(_, _, _)
            | StoreError::CredentialNotFound(_, _) => ErrorKind::NotFound,
            StoreError::Conflict(_) | StoreError::Database(_) => ErrorKind::Database,
            StoreError::Serialization(_) | StoreError::Encryption(_) | StoreError::UnknownMasterKeyId(_) => {
                ErrorKind::Server
            }
        };
        OsmoError::new(kind, err.to_string())
    }
}
