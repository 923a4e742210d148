//! The Config Store (spec §4.1): strongly-typed, revisioned storage for
//! pool/platform/backend policy objects, with strategic-merge patching and
//! secret-obfuscating diffs.

pub mod diff;
pub mod patch;
pub mod store;

pub use diff::diff_secret_strs;
pub use patch::apply_patch;
pub use store::{ConfigStore, ConfigStoreError, HistoryFilter, InMemoryConfigStore};
