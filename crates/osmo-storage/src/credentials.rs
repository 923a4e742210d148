//! Per-user credential storage (spec §3 "Credential", §4.4 "Credentials"):
//! a user's registry/data-backend secrets, encrypted with
//! [`crate::encryption::EncryptionService`]. Grounded on
//! `everruns-storage::repositories::Database`'s CRUD shape, generalized from
//! a single `api_key_encrypted` column to the full owner/name-keyed
//! credential set OSMO's data model calls for.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};

use crate::encryption::{EncryptedSecret, EncryptionService, WrappedKek};
use crate::error::StoreError;

/// A stored, still-encrypted credential. `wrapped_kek` is carried alongside
/// the secret so a caller can decrypt without a separate KEK lookup; in
/// practice every credential owned by the same user shares one KEK, fetched
/// once per request and reused (spec §9 cache note).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub owner: String,
    pub name: String,
    pub kind: String,
    pub wrapped_kek: WrappedKek,
    pub secret: EncryptedSecret,
    pub created_at: DateTime<Utc>,
}

impl CredentialRecord {
    /// Converts to the spec's public `Credential` shape (spec §3). The
    /// envelope (wrapped KEK + encrypted DEK + ciphertext) is serialized
    /// into the opaque `ciphertext` blob; `key_version` is left at 0 since
    /// the blob is self-describing (`mek_kid` travels with the wrapped KEK).
    pub fn into_model(self) -> Result<osmo_types::Credential, StoreError> {
        let ciphertext = serde_json::to_vec(&(self.wrapped_kek, self.secret))?;
        Ok(osmo_types::Credential {
            owner: self.owner,
            name: self.name,
            kind: self.kind,
            ciphertext,
            key_version: 0,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Encrypts `plaintext` under `owner`'s KEK (creating one if this is
    /// their first credential) and stores it as `name`/`kind`.
    async fn put(
        &self,
        encryption: &EncryptionService,
        owner: &str,
        name: &str,
        kind: &str,
        plaintext: &[u8],
    ) -> Result<CredentialRecord, StoreError>;

    async fn get(&self, owner: &str, name: &str) -> Result<CredentialRecord, StoreError>;

    async fn list(&self, owner: &str) -> Result<Vec<CredentialRecord>, StoreError>;

    async fn delete(&self, owner: &str, name: &str) -> Result<(), StoreError>;

    /// Decrypts a stored credential (a thin convenience over `get` + the
    /// encryption service, since both are needed together at every call site).
    async fn reveal(&self, encryption: &EncryptionService, owner: &str, name: &str) -> Result<Vec<u8>, StoreError> {
        let record = self.get(owner, name).await?;
        encryption.decrypt(owner, &record.wrapped_kek, &record.secret)
    }
}

/// A process-local `CredentialStore`, used by tests and by crates that don't
/// want to pull in sqlx.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    inner: parking_lot::Mutex<BTreeMap<(String, String), CredentialRecord>>,
    user_keks: parking_lot::Mutex<BTreeMap<String, WrappedKek>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn kek_for(&self, encryption: &EncryptionService, owner: &str) -> Result<WrappedKek, StoreError> {
        let mut keks = self.user_keks.lock();
        if let Some(existing) = keks.get(owner) {
            return Ok(existing.clone());
        }
        let fresh = encryption.generate_wrapped_kek()?;
        keks.insert(owner.to_string(), fresh.clone());
        Ok(fresh)
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn put(
        &self,
        encryption: &EncryptionService,
        owner: &str,
        name: &str,
        kind: &str,
        plaintext: &[u8],
    ) -> Result<CredentialRecord, StoreError> {
        let wrapped_kek = self.kek_for(encryption, owner)?;
        let secret = encryption.encrypt(owner, &wrapped_kek, plaintext)?;
        let record = CredentialRecord {
            owner: owner.to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
            wrapped_kek,
            secret,
            created_at: Utc::now(),
        };
        self.inner
            .lock()
            .insert((owner.to_string(), name.to_string()), record.clone());
        Ok(record)
    }

    async fn get(&self, owner: &str, name: &str) -> Result<CredentialRecord, StoreError> {
        self.inner
            .lock()
            .get(&(owner.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::CredentialNotFound(owner.to_string(), name.to_string()))
    }

    async fn list(&self, owner: &str) -> Result<Vec<CredentialRecord>, StoreError> {
        Ok(self
            .inner
            .lock()
            .iter()
            .filter(|((o, _), _)| o == owner)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn delete(&self, owner: &str, name: &str) -> Result<(), StoreError> {
        self.inner
            .lock()
            .remove(&(owner.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| StoreError::CredentialNotFound(owner.to_string(), name.to_string()))
    }
}

/// Postgres-backed `CredentialStore`. Schema (informational):
/// `user_keks(owner PRIMARY KEY, mek_kid, nonce, ciphertext)` and
/// `credentials(owner, name, kind, dek_nonce, dek_wrapped, nonce, ciphertext,
/// created_at, PRIMARY KEY(owner, name))`.
pub struct PostgresCredentialStore {
    pool: PgPool,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_or_create_kek(&self, encryption: &EncryptionService, owner: &str) -> Result<WrappedKek, StoreError> {
        let row = sqlx::query("SELECT mek_kid, nonce, ciphertext FROM user_keks WHERE owner = $1")
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = row {
            return Ok(WrappedKek {
                mek_kid: row.get("mek_kid"),
                nonce: row.get("nonce"),
                ciphertext: row.get("ciphertext"),
            });
        }
        let fresh = encryption.generate_wrapped_kek()?;
        sqlx::query(
            r#"
            INSERT INTO user_keks (owner, mek_kid, nonce, ciphertext)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (owner) DO NOTHING
            "#,
        )
        .bind(owner)
        .bind(&fresh.mek_kid)
        .bind(&fresh.nonce)
        .bind(&fresh.ciphertext)
        .execute(&self.pool)
        .await?;
        // Another writer may have raced us; re-read to get the row that won.
        self.load_or_create_kek(encryption, owner).await
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<CredentialRecord, StoreError> {
        Ok(CredentialRecord {
            owner: row.try_get("owner")?,
            name: row.try_get("name")?,
            kind: row.try_get("kind")?,
            wrapped_kek: WrappedKek {
                mek_kid: row.try_get("mek_kid")?,
                nonce: row.try_get("kek_nonce")?,
                ciphertext: row.try_get("kek_ciphertext")?,
            },
            secret: EncryptedSecret {
                version: 1,
                dek_nonce: row.try_get("dek_nonce")?,
                dek_wrapped: row.try_get("dek_wrapped")?,
                nonce: row.try_get("nonce")?,
                ciphertext: row.try_get("ciphertext")?,
            },
            created_at: row.try_get("created_at")?,
        })
    }
}

const CREDENTIAL_SELECT: &str = r#"
    SELECT c.owner, c.name, c.kind, c.dek_nonce, c.dek_wrapped, c.nonce, c.ciphertext, c.created_at,
           k.mek_kid, k.nonce AS kek_nonce, k.ciphertext AS kek_ciphertext
    FROM credentials c
    JOIN user_keks k ON k.owner = c.owner
"#;

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    async fn put(
        &self,
        encryption: &EncryptionService,
        owner: &str,
        name: &str,
        kind: &str,
        plaintext: &[u8],
    ) -> Result<CredentialRecord, StoreError> {
        let wrapped_kek = self.load_or_create_kek(encryption, owner).await?;
        let secret = encryption.encrypt(owner, &wrapped_kek, plaintext)?;

        sqlx::query(
            r#"
            INSERT INTO credentials (owner, name, kind, dek_nonce, dek_wrapped, nonce, ciphertext, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (owner, name) DO UPDATE SET
                kind = EXCLUDED.kind,
                dek_nonce = EXCLUDED.dek_nonce,
                dek_wrapped = EXCLUDED.dek_wrapped,
                nonce = EXCLUDED.nonce,
                ciphertext = EXCLUDED.ciphertext,
                created_at = NOW()
            "#,
        )
        .bind(owner)
        .bind(name)
        .bind(kind)
        .bind(&secret.dek_nonce)
        .bind(&secret.dek_wrapped)
        .bind(&secret.nonce)
        .bind(&secret.ciphertext)
        .execute(&self.pool)
        .await?;

        Ok(CredentialRecord {
            owner: owner.to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
            wrapped_kek,
            secret,
            created_at: Utc::now(),
        })
    }

    async fn get(&self, owner: &str, name: &str) -> Result<CredentialRecord, StoreError> {
        let row = sqlx::query(&format!("{CREDENTIAL_SELECT} WHERE c.owner = $1 AND c.name = $2"))
            .bind(owner)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::CredentialNotFound(owner.to_string(), name.to_string()))?;
        Self::row_to_record(&row)
    }

    async fn list(&self, owner: &str) -> Result<Vec<CredentialRecord>, StoreError> {
        let rows = sqlx::query(&format!("{CREDENTIAL_SELECT} WHERE c.owner = $1 ORDER BY c.name"))
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn delete(&self, owner: &str, name: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM credentials WHERE owner = $1 AND name = $2")
            .bind(owner)
            .bind(name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::CredentialNotFound(owner.to_string(), name.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::{generate_mek, MasterKeyRing};

    fn encryption_service() -> EncryptionService {
        let ring = MasterKeyRing::new(&[generate_mek("mek-v1")], "mek-v1").unwrap();
        EncryptionService::new(ring, 8)
    }

    #[tokio::test]
    async fn put_then_reveal_round_trips() {
        let store = InMemoryCredentialStore::new();
        let encryption = encryption_service();
        store.put(&encryption, "alice", "dockerhub", "registry", b"hunter2").await.unwrap();
        let revealed = store.reveal(&encryption, "alice", "dockerhub").await.unwrap();
        assert_eq!(revealed, b"hunter2");
    }

    #[tokio::test]
    async fn second_credential_for_same_user_reuses_kek() {
        let store = InMemoryCredentialStore::new();
        let encryption = encryption_service();
        let first = store.put(&encryption, "alice", "dockerhub", "registry", b"a").await.unwrap();
        let second = store.put(&encryption, "alice", "s3", "datastore", b"b").await.unwrap();
        assert_eq!(first.wrapped_kek.ciphertext, second.wrapped_kek.ciphertext);
    }

    #[tokio::test]
    async fn delete_removes_credential() {
        let store = InMemoryCredentialStore::new();
        let encryption = encryption_service();
        store.put(&encryption, "alice", "dockerhub", "registry", b"a").await.unwrap();
        store.delete("alice", "dockerhub").await.unwrap();
        let err = store.get("alice", "dockerhub").await.unwrap_err();
        assert!(matches!(err, StoreError::CredentialNotFound(_, _)));
    }

    #[tokio::test]
    async fn list_scopes_to_owner() {
        let store = InMemoryCredentialStore::new();
        let encryption = encryption_service();
        store.put(&encryption, "alice", "dockerhub", "registry", b"a").await.unwrap();
        store.put(&encryption, "bob", "dockerhub", "registry", b"b").await.unwrap();
        let alice_creds = store.list("alice").await.unwrap();
        assert_eq!(alice_creds.len(), 1);
        assert_eq!(alice_creds[0].owner, "alice");
    }
}
