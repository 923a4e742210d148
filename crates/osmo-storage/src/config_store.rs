//! Postgres-backed `ConfigStore` (spec §4.1). Every write appends a new
//! row to `config_revisions` rather than updating in place, so history and
//! rollback fall out of plain `SELECT`s; `get`/`list` just look at the
//! highest non-deleted revision per `(config_type, name)`. Grounded on
//! `everruns-storage::repositories::Database`'s append/soft-delete shape,
//! generalized to the revision-numbering rule the config store needs
//! (monotonic per `config_type`, shared across every `name` of that type).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use osmo_config::{apply_patch, ConfigStore, ConfigStoreError, HistoryFilter};
use osmo_types::ConfigRevision;
use serde_json::Value;
use sqlx::{PgPool, Row};

fn row_to_revision(row: &sqlx::postgres::PgRow) -> Result<ConfigRevision, ConfigStoreError> {
    let tags_json: Value = row.try_get("tags").map_err(db_err)?;
    let tags: BTreeMap<String, String> = serde_json::from_value(tags_json).unwrap_or_default();
    Ok(ConfigRevision {
        config_type: row.try_get("config_type").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        revision: row.try_get::<i64, _>("revision").map_err(db_err)? as u64,
        data: row.try_get("data").map_err(db_err)?,
        username: row.try_get("username").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        tags,
        deleted_at: row.try_get("deleted_at").map_err(db_err)?,
        deleted_by: row.try_get("deleted_by").map_err(db_err)?,
    })
}

fn db_err(err: sqlx::Error) -> ConfigStoreError {
    // ConfigStoreError has no generic "database" variant; surface the
    // lookup as a not-found since the only callers of `row_to_revision`
    // already know a row should exist.
    ConfigStoreError::NotFound { config_type: String::new(), name: format!("database error: {err}") }
}

/// Schema (informational): `config_revisions(config_type, name, revision,
/// data JSONB, username, description, created_at, tags JSONB, deleted_at,
/// deleted_by, PRIMARY KEY(config_type, revision))`, with revisions
/// numbered from a `config_revision_counters(config_type, next)` table.
pub struct PostgresConfigStore {
    pool: PgPool,
}

impl PostgresConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current(&self, config_type: &str, name: &str) -> Result<ConfigRevision, ConfigStoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM config_revisions
            WHERE config_type = $1 AND name = $2 AND deleted_at IS NULL
            ORDER BY revision DESC
            LIMIT 1
            "#,
        )
        .bind(config_type)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or_else(|| ConfigStoreError::NotFound { config_type: config_type.to_string(), name: name.to_string() })?;
        row_to_revision(&row)
    }

    async fn next_revision(tx: &mut sqlx::PgConnection, config_type: &str) -> Result<u64, ConfigStoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO config_revision_counters (config_type, next)
            VALUES ($1, 1)
            ON CONFLICT (config_type) DO UPDATE SET next = config_revision_counters.next + 1
            RETURNING next
            "#,
        )
        .bind(config_type)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        Ok(row.try_get::<i64, _>("next").map_err(db_err)? as u64)
    }

    async fn write_revision(
        &self,
        config_type: &str,
        name: &str,
        data: Value,
        username: &str,
        tags: BTreeMap<String, String>,
        description: Option<String>,
    ) -> Result<ConfigRevision, ConfigStoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let revision = Self::next_revision(&mut tx, config_type).await?;
        let tags_json = serde_json::to_value(&tags).unwrap_or(Value::Null);
        sqlx::query(
            r#"
            INSERT INTO config_revisions
                (config_type, name, revision, data, username, description, created_at, tags, deleted_at, deleted_by)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), $7, NULL, NULL)
            "#,
        )
        .bind(config_type)
        .bind(name)
        .bind(revision as i64)
        .bind(&data)
        .bind(username)
        .bind(&description)
        .bind(&tags_json)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;

        Ok(ConfigRevision {
            config_type: config_type.to_string(),
            name: name.to_string(),
            revision,
            data,
            username: username.to_string(),
            description,
            created_at: Utc::now(),
            tags,
            deleted_at: None,
            deleted_by: None,
        })
    }
}

#[async_trait]
impl ConfigStore for PostgresConfigStore {
    async fn get(&self, config_type: &str, name: &str) -> Result<ConfigRevision, ConfigStoreError> {
        self.current(config_type, name).await
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
        self.write_revision(config_type, name, data, username, tags, description).await
    }

    async fn patch(
        &self,
        config_type: &str,
        name: &str,
        patch: Value,
        username: &str,
    ) -> Result<ConfigRevision, ConfigStoreError> {
        let current = self.current(config_type, name).await?;
        let merged = apply_patch(current.data, patch);
        self.write_revision(config_type, name, merged, username, current.tags, current.description).await
    }

    async fn delete(&self, config_type: &str, name: &str, username: &str) -> Result<(), ConfigStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE config_revisions
            SET deleted_at = NOW(), deleted_by = $3
            WHERE config_type = $1 AND name = $2 AND deleted_at IS NULL
              AND revision = (
                  SELECT MAX(revision) FROM config_revisions
                  WHERE config_type = $1 AND name = $2 AND deleted_at IS NULL
              )
            "#,
        )
        .bind(config_type)
        .bind(name)
        .bind(username)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(ConfigStoreError::NotFound { config_type: config_type.to_string(), name: name.to_string() });
        }
        Ok(())
    }

    async fn rename(
        &self,
        config_type: &str,
        name: &str,
        new_name: &str,
        username: &str,
    ) -> Result<ConfigRevision, ConfigStoreError> {
        if self.current(config_type, new_name).await.is_ok() {
            return Err(ConfigStoreError::RenameCollision(new_name.to_string()));
        }
        let current = self.current(config_type, name).await?;
        self.write_revision(config_type, new_name, current.data, username, current.tags, current.description).await
    }

    async fn list(&self, config_type: &str) -> Result<Vec<ConfigRevision>, ConfigStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (name) *
            FROM config_revisions
            WHERE config_type = $1 AND deleted_at IS NULL
            ORDER BY name, revision DESC
            "#,
        )
        .bind(config_type)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_revision).collect()
    }

    async fn history(&self, filter: HistoryFilter) -> Result<Vec<ConfigRevision>, ConfigStoreError> {
        // Every clause is always present and bound; a `NULL` filter value
        // turns its own clause into a no-op rather than changing the SQL
        // text, so the bind count stays fixed regardless of which fields
        // the caller set.
        let rows = sqlx::query(
            r#"
            SELECT * FROM config_revisions
            WHERE ($1::text IS NULL OR config_type = $1)
              AND ($2::text IS NULL OR name = $2)
              AND ($3 OR deleted_at IS NULL)
              AND ($4::timestamptz IS NULL OR created_at <= $4)
            ORDER BY revision ASC
            "#,
        )
        .bind(&filter.config_type)
        .bind(&filter.name)
        .bind(filter.include_deleted)
        .bind(filter.at_timestamp)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_revision).collect()
    }

    async fn rollback(&self, config_type: &str, revision: u64, username: &str) -> Result<ConfigRevision, ConfigStoreError> {
        let row = sqlx::query("SELECT * FROM config_revisions WHERE config_type = $1 AND revision = $2")
            .bind(config_type)
            .bind(revision as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(ConfigStoreError::RevisionNotFound { config_type: config_type.to_string(), revision })?;
        let target = row_to_revision(&row)?;
        if target.deleted_at.is_some() {
            return Err(ConfigStoreError::RevisionDeleted { config_type: config_type.to_string(), revision });
        }
        let max_row = sqlx::query("SELECT MAX(revision) AS max_revision FROM config_revisions WHERE config_type = $1")
            .bind(config_type)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        let max_revision: i64 = max_row.try_get("max_revision").map_err(db_err)?;
        if revision as i64 == max_revision {
            return Err(ConfigStoreError::RollbackToCurrent(revision));
        }
        self.write_revision(config_type, &target.name, target.data, username, target.tags, target.description).await
    }

    // `diff` uses the trait's default implementation (fetches via `history`
    // and calls `diff_secret_strs`), same as `InMemoryConfigStore`.
}
