//! Process bootstrap configuration, read from the environment the same way
//! `everruns-api`'s `main.rs` reads `DATABASE_URL` and `everruns-worker`'s
//! `RunnerConfig::from_env` reads `TEMPORAL_*`: plain `std::env::var`, typed
//! into a struct, with `anyhow::Context` at the single call site that needs
//! the value to exist. This is process-level bootstrap config (how do I
//! reach Postgres, what do I bind to) -- *application* policy (pools,
//! platforms, pod templates) lives in the Config Store (`osmo-config`),
//! never here (`SPEC_FULL.md` "Configuration").

use std::time::Duration;

use anyhow::{Context, Result};

/// The three environment variables the spec names (§6), plus the bootstrap
/// settings every `everruns-*` binary reads the same way.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `OSMO_CONFIG_FILE_DIR`: root directory config bootstrap reads from
    /// before the Config Store has been seeded.
    pub config_file_dir: Option<String>,
    /// `OSMO_LOG_FILE_DIR`: root directory workflow log files are staged in
    /// before the log flusher ships them to object storage.
    pub log_file_dir: Option<String>,
    /// `OSMO_LOGIN_DEV`: dev-mode auth bypass, consumed by the (external,
    /// out-of-scope) HTTP/REST layer; carried here only so it's part of one
    /// typed config struct rather than scattered `env::var` calls.
    pub login_dev: bool,
    pub database_url: String,
    pub bind_addr: String,
    pub heartbeat_interval: Duration,
    pub aggregator_interval: Duration,
    pub timeout_enforcer_interval: Duration,
    pub log_flush_interval: Duration,
}

impl ServerConfig {
    /// Loads configuration from the process environment, applying `.env`
    /// via `dotenvy` first (as `everruns-api` does) so local development
    /// doesn't need the variables exported in the shell.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            config_file_dir: std::env::var("OSMO_CONFIG_FILE_DIR").ok(),
            log_file_dir: std::env::var("OSMO_LOG_FILE_DIR").ok(),
            login_dev: env_bool("OSMO_LOGIN_DEV"),
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL environment variable required")?,
            bind_addr: std::env::var("OSMO_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:9100".to_string()),
            heartbeat_interval: Duration::from_secs(env_u64("OSMO_HEARTBEAT_INTERVAL_SECS", 30)),
            aggregator_interval: Duration::from_secs(env_u64("OSMO_AGGREGATOR_INTERVAL_SECS", 5)),
            timeout_enforcer_interval: Duration::from_secs(env_u64("OSMO_TIMEOUT_ENFORCER_INTERVAL_SECS", 15)),
            log_flush_interval: Duration::from_secs(env_u64("OSMO_LOG_FLUSH_INTERVAL_SECS", 10)),
        })
    }
}

fn env_bool(name: &str) -> bool {
    std::env::var(name).map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes")).unwrap_or(false)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
