//! Shared data model, status lattice, and small reusable primitives used
//! across the OSMO control plane.

pub mod backoff;
pub mod cache;
pub mod duration;
pub mod error;
pub mod ids;
pub mod merge;
pub mod model;
pub mod ratelimit;
pub mod status;

pub use error::{ErrorKind, OsmoError};
pub use model::{
    Backend, ConfigRevision, Credential, GpuQuota, Platform, Pool, PodTemplate, ResourceCounters,
    SchedulerSettings, Task, TaskGroup, TopologyKey, Workflow,
};
pub use status::{task_failure_to_workflow_status, Priority, TaskStatus, WorkflowStatus};

pub type Result<T> = std::result::Result<T, OsmoError>;
