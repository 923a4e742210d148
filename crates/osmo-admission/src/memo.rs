//! Read-through memoization for admission checks (spec §4.4: "Memoize both
//! static results by `ResourceSpec` and privileged/host-network/volume-mount
//! checks by `(privileged, hostNetwork, tuple(volumeMounts), platform)`").
//! Built on `osmo_types::cache::LruCache`, the same bounded read-through
//! cache the pool-config and image-digest caches use (spec §5, §9).

use serde_json::Value;

use osmo_types::cache::LruCache;

/// Caches are keyed by a serialized form of their inputs; values are the
/// `Ok`/`Err(message)` outcome so a second call with the same key never
/// re-runs the (potentially expensive) evaluation.
#[derive(Clone)]
pub struct AdmissionMemo {
    static_results: LruCache<String, Result<(), String>>,
    security_results: LruCache<String, Result<(), String>>,
}

impl AdmissionMemo {
    pub fn new(capacity: usize) -> Self {
        Self {
            static_results: LruCache::new(capacity),
            security_results: LruCache::new(capacity),
        }
    }

    pub fn static_key(resource: &Value) -> String {
        resource.to_string()
    }

    pub fn security_key(privileged: bool, host_network: bool, volume_mounts: &[Value], platform: &str) -> String {
        format!(
            "{privileged}:{host_network}:{platform}:{}",
            serde_json::to_string(volume_mounts).unwrap_or_default()
        )
    }

    pub fn get_static(&self, key: &str) -> Option<Result<(), String>> {
        self.static_results.get(&key.to_string())
    }

    pub fn put_static(&self, key: String, value: Result<(), String>) {
        self.static_results.set(key, value);
    }

    pub fn get_security(&self, key: &str) -> Option<Result<(), String>> {
        self.security_results.get(&key.to_string())
    }

    pub fn put_security(&self, key: String, value: Result<(), String>) {
        self.security_results.set(key, value);
    }
}
