//! Durable Store & Secrets (spec §3, §4.1, §9): transactional Postgres
//! repositories for workflows/groups/tasks, a revisioned config store
//! satisfying `osmo_config::ConfigStore`, and envelope-encrypted credential
//! storage. Grounded throughout on `everruns-storage` (its
//! `repositories::Database` for the query shape, its `encryption` module
//! for the envelope scheme) and on `durable::persistence::postgres` for the
//! `SKIP LOCKED` claiming pattern.

pub mod config_store;
pub mod credentials;
pub mod encryption;
pub mod error;
pub mod workflows;

pub use config_store::PostgresConfigStore;
pub use credentials::{CredentialRecord, CredentialStore, InMemoryCredentialStore, PostgresCredentialStore};
pub use encryption::{generate_mek, EncryptionService, JwkKey, MasterKeyRing, WrappedKek};
pub use error::StoreError;
pub use workflows::{InMemoryWorkflowStore, WorkflowRepository, WorkflowStore};
