//! Scheduler selection (spec §9 "Cross-scheduler portability": "a tagged
//! variant picks the concrete emitter; scheduler-specific details never leak
//! past that boundary").

use std::collections::BTreeMap;

use osmo_compiler::CompiledGroup;
use osmo_types::Pool;
use serde_json::Value;

use crate::crds::{Queue, Topology};
use crate::error::SchedulerError;
use crate::kai::KaiScheduler;
use crate::podgroup::{ComposedGroup, GroupContext};

/// The scheduler-abstraction seam (spec §9). Everything the Scheduler
/// Bridge needs from a concrete scheduler implementation; scheduler-specific
/// label keys, API groups and CRD shapes live entirely behind it.
pub trait SchedulerBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn supports_priority(&self) -> bool;
    fn queue_label_key(&self) -> &'static str;
    fn compose_group(&self, group: &CompiledGroup, ctx: &GroupContext<'_>, task_uuids: &BTreeMap<String, String>) -> Result<ComposedGroup, SchedulerError>;
    fn build_queue(&self, namespace: &str, pool: &Pool) -> Queue;
    fn build_topology(&self, namespace: &str, pool: &Pool) -> Option<Topology>;
    fn queue_as_json(&self, queue: &Queue) -> Value;
    fn topology_as_json(&self, topology: &Topology) -> Value;
}

/// The tagged variant of supported schedulers (spec §9). New backends are
/// added here, never by branching on scheduler name elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    Kai,
}

impl SchedulerKind {
    pub fn parse(raw: &str) -> Result<Self, SchedulerError> {
        match raw {
            "kai" | "kai-scheduler" => Ok(SchedulerKind::Kai),
            other => Err(SchedulerError::UnsupportedScheduler(other.to_string())),
        }
    }

    pub fn build(self) -> Box<dyn SchedulerBackend> {
        match self {
            SchedulerKind::Kai => Box::new(KaiScheduler),
        }
    }
}
