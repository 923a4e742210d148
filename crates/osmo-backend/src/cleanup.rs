//! Cleanup descriptors (spec §4.5 "Cleanup specs", §4.8). A cleanup spec
//! tells a backend how to find and reclaim stale scheduler-native objects by
//! label selector, optionally through a custom (CRD) API path.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomApi {
    pub group: String,
    pub version: String,
    pub plural: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupSpec {
    pub resource_type: String,
    pub labels: BTreeMap<String, String>,
    pub custom_api: Option<CustomApi>,
}

/// The key cleanup specs are deduplicated on: `(resource_type, sorted
/// labels, api path)` (spec §4.5 "Cleanup specs").
fn dedup_key(spec: &CleanupSpec) -> (String, Vec<(String, String)>, Option<(String, String, String)>) {
    let labels: Vec<(String, String)> = spec.labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    let api = spec
        .custom_api
        .as_ref()
        .map(|a| (a.group.clone(), a.version.clone(), a.plural.clone()));
    (spec.resource_type.clone(), labels, api)
}

/// Merges cleanup specs from an old and a new scheduler when a backend
/// switches scheduler type, deduplicating so stale CRDs from either
/// scheduler get reclaimed exactly once (spec §4.5 "When switching scheduler
/// types, cleanup specs from both old and new schedulers are merged
/// (deduplicated ...) so stale CRDs are reclaimed").
pub fn merge_cleanup_specs(old: Vec<CleanupSpec>, new: Vec<CleanupSpec>) -> Vec<CleanupSpec> {
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();
    for spec in old.into_iter().chain(new) {
        if seen.insert(dedup_key(&spec)) {
            result.push(spec);
        }
    }
    result
}
