//! The Config Store trait and an in-memory reference implementation
//! (spec §4.1). The durable Postgres-backed implementation lives in
//! `osmo-storage`, which depends on this crate for the trait and the
//! strategic-merge/diff logic.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use osmo_types::ConfigRevision;
use serde_json::Value;

use crate::diff::diff_secret_strs;
use crate::patch::apply_patch;

#[derive(Debug, thiserror::Error)]
pub enum ConfigStoreError {
    #[error("unknown config type {0:?}")]
    UnknownConfigType(String),
    #[error("no config named {name:?} of type {config_type:?}")]
    NotFound { config_type: String, name: String },
    #[error("revision {revision} of type {config_type:?} is deleted")]
    RevisionDeleted { config_type: String, revision: u64 },
    #[error("revision {revision} of type {config_type:?} does not exist")]
    RevisionNotFound { config_type: String, revision: u64 },
    #[error("cannot roll back to the current revision {0}")]
    RollbackToCurrent(u64),
    #[error("a config named {0:?} already exists")]
    RenameCollision(String),
}

#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub config_type: Option<String>,
    pub name: Option<String>,
    pub include_deleted: bool,
    pub at_timestamp: Option<DateTime<Utc>>,
}

/// Strongly-typed, history-tracked storage for policy objects (spec §4.1).
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, config_type: &str, name: &str) -> Result<ConfigRevision, ConfigStoreError>;

    /// Replaces a config's data wholesale, writing a new revision.
    async fn put(
        &self,
        config_type: &str,
        name: &str,
        data: Value,
        username: &str,
        tags: BTreeMap<String, String>,
        description: Option<String>,
    ) -> Result<ConfigRevision, ConfigStoreError>;

    /// Applies a strategic-merge patch on top of the current data, writing a new revision.
    async fn patch(
        &self,
        config_type: &str,
        name: &str,
        patch: Value,
        username: &str,
    ) -> Result<ConfigRevision, ConfigStoreError>;

    /// Soft-deletes the current revision. The data is retained for history/rollback.
    async fn delete(&self, config_type: &str, name: &str, username: &str) -> Result<(), ConfigStoreError>;

    async fn rename(
        &self,
        config_type: &str,
        name: &str,
        new_name: &str,
        username: &str,
    ) -> Result<ConfigRevision, ConfigStoreError>;

    async fn list(&self, config_type: &str) -> Result<Vec<ConfigRevision>, ConfigStoreError>;

    async fn history(&self, filter: HistoryFilter) -> Result<Vec<ConfigRevision>, ConfigStoreError>;

    /// Writes a new revision carrying the historical data from `revision`.
    /// Forbidden on deleted revisions and on the current revision (spec §4.1).
    async fn rollback(&self, config_type: &str, revision: u64, username: &str) -> Result<ConfigRevision, ConfigStoreError>;

    /// Diffs revision `b` against `a`, obfuscating changed secret values (spec §4.1).
    async fn diff(&self, config_type: &str, a: u64, b: u64) -> Result<Value, ConfigStoreError> {
        let history = self.history(HistoryFilter { config_type: Some(config_type.to_string()), ..Default::default() }).await?;
        let find = |rev: u64| {
            history
                .iter()
                .find(|r| r.revision == rev)
                .cloned()
                .ok_or(ConfigStoreError::RevisionNotFound { config_type: config_type.to_string(), revision: rev })
        };
        let rev_a = find(a)?;
        let rev_b = find(b)?;
        Ok(diff_secret_strs(&rev_a.data, &rev_b.data, b))
    }
}

struct Inner {
    /// All revisions ever written for a type, in ascending revision order.
    revisions: BTreeMap<String, Vec<ConfigRevision>>,
    /// Next revision number to assign, keyed by config_type.
    next_revision: BTreeMap<String, u64>,
}

/// A process-local `ConfigStore` backed by an in-memory revision log.
/// Used by tests and by any crate that needs a store without pulling in
/// `osmo-storage`'s sqlx dependency.
pub struct InMemoryConfigStore {
    inner: parking_lot::Mutex<Inner>,
}

impl Default for InMemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self {
            inner: parking_lot::Mutex::new(Inner {
                revisions: BTreeMap::new(),
                next_revision: BTreeMap::new(),
            }),
        }
    }

    fn write_revision(
        inner: &mut Inner,
        config_type: &str,
        name: &str,
        data: Value,
        username: &str,
        tags: BTreeMap<String, String>,
        description: Option<String>,
    ) -> ConfigRevision {
        let counter = inner.next_revision.entry(config_type.to_string()).or_insert(0);
        *counter += 1;
        let revision = ConfigRevision {
            config_type: config_type.to_string(),
            name: name.to_string(),
            revision: *counter,
            data,
            username: username.to_string(),
            description,
            created_at: Utc::now(),
            tags,
            deleted_at: None,
            deleted_by: None,
        };
        inner.revisions.entry(config_type.to_string()).or_default().push(revision.clone());
        revision
    }

    fn current_unlocked(inner: &Inner, config_type: &str, name: &str) -> Option<ConfigRevision> {
        inner
            .revisions
            .get(config_type)?
            .iter()
            .rev()
            .find(|r| r.name == name && r.deleted_at.is_none())
            .cloned()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get(&self, config_type: &str, name: &str) -> Result<ConfigRevision, ConfigStoreError> {
        let inner = self.inner.lock();
        Self::current_unlocked(&inner, config_type, name).ok_or_else(|| ConfigStoreError::NotFound {
            config_type: config_type.to_string(),
            name: name.to_string(),
        })
    }

    async fn put(
        &self,
        config_type: &str,
        name: &str,
        data: Value,
        username: &str,
        tags: BTreeMap<String, String>,
        description: Option<String>,
    ) -> Result<ConfigRevision, ConfigStoreError> {
        let mut inner = self.inner.lock();
        Ok(Self::write_revision(&mut inner, config_type, name, data, username, tags, description))
    }

    async fn patch(
        &self,
        config_type: &str,
        name: &str,
        patch: Value,
        username: &str,
    ) -> Result<ConfigRevision, ConfigStoreError> {
        let mut inner = self.inner.lock();
        let current = Self::current_unlocked(&inner, config_type, name).ok_or_else(|| ConfigStoreError::NotFound {
            config_type: config_type.to_string(),
            name: name.to_string(),
        })?;
        let merged = apply_patch(current.data, patch);
        Ok(Self::write_revision(&mut inner, config_type, name, merged, username, current.tags, current.description))
    }

    async fn delete(&self, config_type: &str, name: &str, username: &str) -> Result<(), ConfigStoreError> {
        let mut inner = self.inner.lock();
        let revisions = inner
            .revisions
            .get_mut(config_type)
            .ok_or_else(|| ConfigStoreError::NotFound { config_type: config_type.to_string(), name: name.to_string() })?;
        let target = revisions
            .iter_mut()
            .rev()
            .find(|r| r.name == name && r.deleted_at.is_none())
            .ok_or_else(|| ConfigStoreError::NotFound { config_type: config_type.to_string(), name: name.to_string() })?;
        target.deleted_at = Some(Utc::now());
        target.deleted_by = Some(username.to_string());
        Ok(())
    }

    async fn rename(
        &self,
        config_type: &str,
        name: &str,
        new_name: &str,
        username: &str,
    ) -> Result<ConfigRevision, ConfigStoreError> {
        let mut inner = self.inner.lock();
        if Self::current_unlocked(&inner, config_type, new_name).is_some() {
            return Err(ConfigStoreError::RenameCollision(new_name.to_string()));
        }
        let current = Self::current_unlocked(&inner, config_type, name).ok_or_else(|| ConfigStoreError::NotFound {
            config_type: config_type.to_string(),
            name: name.to_string(),
        })?;
        Ok(Self::write_revision(
            &mut inner,
            config_type,
            new_name,
            current.data,
            username,
            current.tags,
            current.description,
        ))
    }

    async fn list(&self, config_type: &str) -> Result<Vec<ConfigRevision>, ConfigStoreError> {
        let inner = self.inner.lock();
        let names: std::collections::BTreeSet<String> = inner
            .revisions
            .get(config_type)
            .map(|revs| revs.iter().map(|r| r.name.clone()).collect())
            .unwrap_or_default();
        Ok(names
            .into_iter()
            .filter_map(|name| Self::current_unlocked(&inner, config_type, &name))
            .collect())
    }

    async fn history(&self, filter: HistoryFilter) -> Result<Vec<ConfigRevision>, ConfigStoreError> {
        let inner = self.inner.lock();
        let mut result = Vec::new();
        let types: Vec<String> = match &filter.config_type {
            Some(t) => vec![t.clone()],
            None => inner.revisions.keys().cloned().collect(),
        };
        for config_type in types {
            let Some(revisions) = inner.revisions.get(&config_type) else { continue };
            for rev in revisions {
                if let Some(name) = &filter.name {
                    if &rev.name != name {
                        continue;
                    }
                }
                if !filter.include_deleted && rev.deleted_at.is_some() {
                    continue;
                }
                if let Some(ts) = filter.at_timestamp {
                    if rev.created_at > ts {
                        continue;
                    }
                }
                result.push(rev.clone());
            }
        }
        Ok(result)
    }

    async fn rollback(&self, config_type: &str, revision: u64, username: &str) -> Result<ConfigRevision, ConfigStoreError> {
        let mut inner = self.inner.lock();
        let revisions = inner
            .revisions
            .get(config_type)
            .ok_or_else(|| ConfigStoreError::RevisionNotFound { config_type: config_type.to_string(), revision })?;
        let target = revisions
            .iter()
            .find(|r| r.revision == revision)
            .cloned()
            .ok_or_else(|| ConfigStoreError::RevisionNotFound { config_type: config_type.to_string(), revision })?;
        if target.deleted_at.is_some() {
            return Err(ConfigStoreError::RevisionDeleted { config_type: config_type.to_string(), revision });
        }
        let max_revision = revisions.iter().map(|r| r.revision).max().unwrap_or(0);
        if revision == max_revision {
            return Err(ConfigStoreError::RollbackToCurrent(revision));
        }
        Ok(Self::write_revision(
            &mut inner,
            config_type,
            &target.name,
            target.data,
            username,
            target.tags,
            target.description,
        ))
    }
}
