//! Data-backend (S3-style) credential resolution (spec §4.4): a user's
//! credential is matched against a bucket URI prefix; absent a match, access
//! proceeds only if the backend supports environment auth. `Read` is
//! required for inputs, `Write` for outputs.

use serde::{Deserialize, Serialize};

use crate::error::AdmissionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    Read,
    Write,
}

impl AccessMode {
    fn label(self) -> &'static str {
        match self {
            AccessMode::Read => "READ",
            AccessMode::Write => "WRITE",
        }
    }
}

/// One user's named credential for a data backend, scoped to a URI prefix
/// (e.g. `s3://my-bucket/`).
#[derive(Debug, Clone)]
pub struct DataCredential {
    pub name: String,
    pub owner: String,
    pub uri_prefix: String,
    pub can_read: bool,
    pub can_write: bool,
}

impl DataCredential {
    fn grants(&self, mode: AccessMode) -> bool {
        match mode {
            AccessMode::Read => self.can_read,
            AccessMode::Write => self.can_write,
        }
    }
}

/// Resolves access to `uri` for `user`, requiring `mode`. Matches the
/// longest credential `uri_prefix` covering `uri`; if none of the user's
/// credentials cover it, access is granted only when `backend_supports_env_auth`
/// (spec §4.4 "only proceed when the backend supports environment auth").
pub fn resolve_access<'a>(
    uri: &str,
    user: &str,
    mode: AccessMode,
    credentials: &'a [DataCredential],
    backend_supports_env_auth: bool,
) -> Result<Option<&'a DataCredential>, AdmissionError> {
    let best = credentials
        .iter()
        .filter(|c| c.owner == user && uri.starts_with(&c.uri_prefix))
        .max_by_key(|c| c.uri_prefix.len());

    match best {
        Some(cred) if cred.grants(mode) => Ok(Some(cred)),
        Some(cred) => Err(AdmissionError::NoDataCredential(cred.name.clone(), mode.label().to_string(), uri.to_string())),
        None if backend_supports_env_auth => Ok(None),
        None => Err(AdmissionError::NoDataCredential("<none>".to_string(), mode.label().to_string(), uri.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cred(prefix: &str, read: bool, write: bool) -> DataCredential {
        DataCredential { name: "cred".into(), owner: "alice".into(), uri_prefix: prefix.into(), can_read: read, can_write: write }
    }

    #[test]
    fn grants_read_when_credential_covers_prefix() {
        let creds = vec![cred("s3://bucket/", true, false)];
        let result = resolve_access("s3://bucket/path", "alice", AccessMode::Read, &creds, false).unwrap();
        assert!(result.is_some());
    }

    #[test]
    fn rejects_write_without_write_grant() {
        let creds = vec![cred("s3://bucket/", true, false)];
        let err = resolve_access("s3://bucket/path", "alice", AccessMode::Write, &creds, false).unwrap_err();
        assert!(matches!(err, AdmissionError::NoDataCredential(_, _, _)));
    }

    #[test]
    fn falls_back_to_env_auth_when_no_credential_matches() {
        let creds = vec![];
        let result = resolve_access("s3://other-bucket/x", "alice", AccessMode::Read, &creds, true).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn rejects_when_no_match_and_no_env_auth() {
        let creds = vec![];
        let err = resolve_access("s3://other-bucket/x", "alice", AccessMode::Read, &creds, false).unwrap_err();
        assert!(matches!(err, AdmissionError::NoDataCredential(_, _, _)));
    }

    #[test]
    fn prefers_the_longest_matching_prefix() {
        let creds = vec![cred("s3://bucket/", false, false), cred("s3://bucket/subdir/", true, false)];
        let result = resolve_access("s3://bucket/subdir/file", "alice", AccessMode::Read, &creds, false).unwrap();
        assert_eq!(result.unwrap().uri_prefix, "s3://bucket/subdir/");
    }
}
