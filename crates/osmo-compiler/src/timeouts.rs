//! Timeout resolution (spec §4.3 step 6): "fill missing `exec_timeout`/
//! `queue_timeout` from pool then service defaults; clamp to pool/service
//! maxima."

use osmo_types::Pool;

use crate::error::CompileError;
use crate::spec::TimeoutSpec;

/// Service-wide timeout defaults/maxima, sourced from the `service` config
/// type in the Config Store (spec §4.1's `Service` policy object).
#[derive(Debug, Clone, Copy)]
pub struct ServiceTimeoutDefaults {
    pub default_exec_timeout_secs: i64,
    pub max_exec_timeout_secs: i64,
    pub default_queue_timeout_secs: i64,
    pub max_queue_timeout_secs: i64,
}

impl Default for ServiceTimeoutDefaults {
    fn default() -> Self {
        Self {
            default_exec_timeout_secs: 86_400,
            max_exec_timeout_secs: 7 * 86_400,
            default_queue_timeout_secs: 3_600,
            max_queue_timeout_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResolvedTimeouts {
    pub exec_timeout_secs: i64,
    pub queue_timeout_secs: i64,
}

fn resolve_one(
    requested: Option<&str>,
    pool_default: Option<i64>,
    pool_max: Option<i64>,
    service_default: i64,
    service_max: i64,
) -> Result<i64, CompileError> {
    let value = match requested {
        Some(raw) => osmo_types::duration::parse_duration(raw)
            .map_err(CompileError::BadQuantity)?
            .as_secs() as i64,
        None => pool_default.unwrap_or(service_default),
    };
    let max = pool_max.unwrap_or(service_max);
    Ok(value.min(max))
}

/// Resolves `exec_timeout`/`queue_timeout` for one workflow, filling missing
/// values from the pool then the service, then clamping to whichever maximum
/// is tighter (spec §4.3 step 6).
pub fn resolve_timeouts(
    requested: &TimeoutSpec,
    pool: &Pool,
    service: &ServiceTimeoutDefaults,
) -> Result<ResolvedTimeouts, CompileError> {
    Ok(ResolvedTimeouts {
        exec_timeout_secs: resolve_one(
            requested.exec_timeout.as_deref(),
            pool.default_exec_timeout,
            pool.max_exec_timeout,
            service.default_exec_timeout_secs,
            service.max_exec_timeout_secs,
        )?,
        queue_timeout_secs: resolve_one(
            requested.queue_timeout.as_deref(),
            pool.default_queue_timeout,
            pool.max_queue_timeout,
            service.default_queue_timeout_secs,
            service.max_queue_timeout_secs,
        )?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use osmo_types::GpuQuota;
    use std::collections::BTreeMap;

    fn pool_with(max_exec: Option<i64>, default_exec: Option<i64>) -> Pool {
        Pool {
            name: "p".into(),
            backend: "b".into(),
            default_platform: "cpu".into(),
            platforms: BTreeMap::new(),
            common_pod_template: vec![],
            common_resource_validations: vec![],
            common_default_variables: BTreeMap::new(),
            gpu: GpuQuota { guarantee: -1, maximum: -1, weight: 1.0 },
            topology_keys: vec![],
            max_exec_timeout: max_exec,
            default_exec_timeout: default_exec,
            max_queue_timeout: None,
            default_queue_timeout: None,
            enable_maintenance: false,
        }
    }

    #[test]
    fn missing_timeout_falls_back_to_pool_default() {
        let pool = pool_with(None, Some(600));
        let resolved = resolve_timeouts(&TimeoutSpec::default(), &pool, &ServiceTimeoutDefaults::default()).unwrap();
        assert_eq!(resolved.exec_timeout_secs, 600);
    }

    #[test]
    fn requested_timeout_clamps_to_pool_maximum() {
        let pool = pool_with(Some(100), None);
        let requested = TimeoutSpec { exec_timeout: Some("1h".to_string()), queue_timeout: None };
        let resolved = resolve_timeouts(&requested, &pool, &ServiceTimeoutDefaults::default()).unwrap();
        assert_eq!(resolved.exec_timeout_secs, 100);
    }
}
