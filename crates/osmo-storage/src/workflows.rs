//! Postgres repositories for workflows, task groups, and tasks (spec §3,
//! §4.6 "State Machine"). Grounded on
//! `everruns-storage::repositories::Database`'s query shape, with two
//! additions the teacher didn't need: a CAS status update (spec §4.6:
//! "funnels all workflow status writes through a single ... entry point")
//! and a `SKIP LOCKED` claim query for handing queued tasks to a scheduler,
//! grounded on `durable::persistence::postgres::claim_task`.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use osmo_types::{ResourceCounters, Task, TaskGroup, TaskStatus, Workflow, WorkflowStatus};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sqlx::{PgPool, Row};
use tracing::instrument;

use crate::error::StoreError;

/// Statuses, like `Priority`, are plain `serde`-tagged enums (no `sqlx::Type`
/// impl), so columns hold their serialized text form and round-trip through
/// `serde_json::Value::String`.
fn enum_text<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value).ok() {
        Some(Value::String(s)) => s,
        _ => unreachable!("status/priority enums always serialize to a string"),
    }
}

fn enum_from_text<T: DeserializeOwned>(text: String) -> Result<T, StoreError> {
    serde_json::from_value(Value::String(text)).map_err(StoreError::from)
}

fn workflow_from_row(row: &sqlx::postgres::PgRow) -> Result<Workflow, StoreError> {
    let tags_json: Value = row.try_get("tags")?;
    let tags: BTreeMap<String, String> = serde_json::from_value(tags_json).unwrap_or_default();
    Ok(Workflow {
        workflow_uuid: row.try_get("workflow_uuid")?,
        workflow_name: row.try_get("workflow_name")?,
        job_id: row.try_get::<i64, _>("job_id")? as u64,
        submitted_by: row.try_get("submitted_by")?,
        backend: row.try_get("backend")?,
        pool: row.try_get("pool")?,
        priority: enum_from_text(row.try_get("priority")?)?,
        status: enum_from_text(row.try_get("status")?)?,
        submit_time: row.try_get("submit_time")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        exec_timeout: row.try_get("exec_timeout")?,
        queue_timeout: row.try_get("queue_timeout")?,
        parent_name: row.try_get("parent_name")?,
        parent_job_id: row.try_get::<Option<i64>, _>("parent_job_id")?.map(|v| v as u64),
        app_uuid: row.try_get("app_uuid")?,
        app_version: row.try_get("app_version")?,
        tags,
        plugins: row.try_get("plugins")?,
        cancelled_by: row.try_get("cancelled_by")?,
        failure_message: row.try_get("failure_message")?,
        logs: row.try_get("logs")?,
        outputs: row.try_get("outputs")?,
    })
}

/// Repository for workflows, task groups, and tasks.
pub struct WorkflowRepository {
    pool: PgPool,
}

impl WorkflowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, workflow))]
    pub async fn insert_workflow(&self, workflow: &Workflow) -> Result<(), StoreError> {
        let tags_json = serde_json::to_value(&workflow.tags)?;
        sqlx::query(
            r#"
            INSERT INTO workflows
                (workflow_uuid, workflow_name, job_id, submitted_by, backend, pool, priority,
                 status, submit_time, start_time, end_time, exec_timeout, queue_timeout,
                 parent_name, parent_job_id, app_uuid, app_version, tags, plugins,
                 cancelled_by, failure_message, logs, outputs)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)
            "#,
        )
        .bind(&workflow.workflow_uuid)
        .bind(&workflow.workflow_name)
        .bind(workflow.job_id as i64)
        .bind(&workflow.submitted_by)
        .bind(&workflow.backend)
        .bind(&workflow.pool)
        .bind(enum_text(&workflow.priority))
        .bind(enum_text(&workflow.status))
        .bind(workflow.submit_time)
        .bind(workflow.start_time)
        .bind(workflow.end_time)
        .bind(workflow.exec_timeout)
        .bind(workflow.queue_timeout)
        .bind(&workflow.parent_name)
        .bind(workflow.parent_job_id.map(|v| v as i64))
        .bind(&workflow.app_uuid)
        .bind(&workflow.app_version)
        .bind(&tags_json)
        .bind(&workflow.plugins)
        .bind(&workflow.cancelled_by)
        .bind(&workflow.failure_message)
        .bind(&workflow.logs)
        .bind(&workflow.outputs)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow, StoreError> {
        let (name, job_id) = osmo_types::ids::deconstruct_workflow_id(workflow_id)
            .ok_or_else(|| StoreError::WorkflowNotFound(workflow_id.to_string()))?;
        let row = sqlx::query("SELECT * FROM workflows WHERE workflow_name = $1 AND job_id = $2")
            .bind(name)
            .bind(job_id as i64)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::WorkflowNotFound(workflow_id.to_string()))?;
        workflow_from_row(&row)
    }

    pub async fn list_workflows(&self, submitted_by: Option<&str>) -> Result<Vec<Workflow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM workflows
            WHERE ($1::text IS NULL OR submitted_by = $1)
            ORDER BY submit_time DESC
            "#,
        )
        .bind(submitted_by)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(workflow_from_row).collect()
    }

    /// Workflows the state aggregator and timeout enforcer still have work
    /// to do on (spec §5 "state aggregator", "timeout enforcer" background
    /// loops). `status = ANY(alive)` is the same predicate `cas_update_status`
    /// uses to decide whether a row is still writable.
    #[instrument(skip(self))]
    pub async fn list_alive_workflow_ids(&self) -> Result<Vec<String>, StoreError> {
        let alive: Vec<String> = WorkflowStatus::alive_statuses().iter().map(enum_text).collect();
        let rows = sqlx::query("SELECT workflow_name, job_id FROM workflows WHERE status = ANY($1)")
            .bind(&alive)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| -> Result<String, StoreError> {
                let name: String = row.try_get("workflow_name")?;
                let job_id: i64 = row.try_get("job_id")?;
                Ok(format!("{name}-{job_id}"))
            })
            .collect()
    }

    /// Funnels every status write through one CAS update, mirroring
    /// `osmo_state::apply_transition`'s single entry point: the row is only
    /// written if it isn't already in a finished state (spec §3 invariant 4,
    /// §4.6 "never retreat"). The finished-state list mirrors
    /// `WorkflowStatus::alive_statuses`, inverted.
    #[instrument(skip(self))]
    pub async fn cas_update_status(
        &self,
        workflow_id: &str,
        new_status: WorkflowStatus,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        failure_message: Option<&str>,
    ) -> Result<bool, StoreError> {
        let (name, job_id) = osmo_types::ids::deconstruct_workflow_id(workflow_id)
            .ok_or_else(|| StoreError::WorkflowNotFound(workflow_id.to_string()))?;
        let alive: Vec<String> = WorkflowStatus::alive_statuses().iter().map(enum_text).collect();
        let result = sqlx::query(
            r#"
            UPDATE workflows
            SET status = $3,
                start_time = COALESCE(start_time, $4),
                end_time = COALESCE(end_time, $5),
                failure_message = COALESCE($6, failure_message)
            WHERE workflow_name = $1 AND job_id = $2
              AND status = ANY($7)
            "#,
        )
        .bind(name)
        .bind(job_id as i64)
        .bind(enum_text(&new_status))
        .bind(start_time)
        .bind(end_time)
        .bind(failure_message)
        .bind(&alive)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, group))]
    pub async fn insert_group(&self, group: &TaskGroup) -> Result<(), StoreError> {
        let upstream_json = serde_json::to_value(&group.remaining_upstream_groups)?;
        let downstream_json = serde_json::to_value(&group.downstream_groups)?;
        sqlx::query(
            r#"
            INSERT INTO task_groups
                (group_uuid, workflow_id, name, spec, status, remaining_upstream_groups,
                 downstream_groups, barrier, last_retry_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&group.group_uuid)
        .bind(&group.workflow_id)
        .bind(&group.name)
        .bind(&group.spec)
        .bind(enum_text(&group.status))
        .bind(&upstream_json)
        .bind(&downstream_json)
        .bind(group.barrier)
        .bind(group.last_retry_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_groups(&self, workflow_id: &str) -> Result<Vec<TaskGroup>, StoreError> {
        let rows = sqlx::query("SELECT * FROM task_groups WHERE workflow_id = $1 ORDER BY name")
            .bind(workflow_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| -> Result<TaskGroup, StoreError> {
                let upstream_json: Value = row.try_get("remaining_upstream_groups")?;
                let downstream_json: Value = row.try_get("downstream_groups")?;
                Ok(TaskGroup {
                    group_uuid: row.try_get("group_uuid")?,
                    workflow_id: row.try_get("workflow_id")?,
                    name: row.try_get("name")?,
                    spec: row.try_get("spec")?,
                    status: enum_from_text(row.try_get("status")?)?,
                    remaining_upstream_groups: serde_json::from_value(upstream_json).unwrap_or_default(),
                    downstream_groups: serde_json::from_value(downstream_json).unwrap_or_default(),
                    barrier: row.try_get("barrier")?,
                    last_retry_at: row.try_get("last_retry_at")?,
                })
            })
            .collect()
    }

    /// Clears `group` from the `remaining_upstream_groups` set of every
    /// downstream group, in one statement per downstream row rather than a
    /// read-modify-write round trip (spec §4.6: groups unblock as soon as
    /// their last upstream finishes).
    #[instrument(skip(self))]
    pub async fn clear_upstream_dependency(&self, workflow_id: &str, finished_group: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE task_groups
            SET remaining_upstream_groups = remaining_upstream_groups - $2
            WHERE workflow_id = $1
            "#,
        )
        .bind(workflow_id)
        .bind(finished_group)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, task))]
    pub async fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        let exit_actions_json = serde_json::to_value(&task.exit_actions)?;
        sqlx::query(
            r#"
            INSERT INTO tasks
                (task_db_key, task_uuid, workflow_id, name, retry_id, group_name, status,
                 node_name, start_time, end_time, last_heartbeat, cpu, memory_bytes, gpu,
                 storage_bytes, exit_actions, lead)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(&task.task_db_key)
        .bind(&task.task_uuid)
        .bind(&task.workflow_id)
        .bind(&task.name)
        .bind(task.retry_id as i32)
        .bind(&task.group_name)
        .bind(enum_text(&task.status))
        .bind(&task.node_name)
        .bind(task.start_time)
        .bind(task.end_time)
        .bind(task.last_heartbeat)
        .bind(task.resources.cpu)
        .bind(task.resources.memory_bytes)
        .bind(task.resources.gpu)
        .bind(task.resources.storage_bytes)
        .bind(&exit_actions_json)
        .bind(task.lead)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_task(&self, workflow_id: &str, name: &str, retry_id: u32) -> Result<Task, StoreError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE workflow_id = $1 AND name = $2 AND retry_id = $3")
            .bind(workflow_id)
            .bind(name)
            .bind(retry_id as i32)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::TaskNotFound(workflow_id.to_string(), name.to_string(), retry_id))?;
        Self::task_from_row(&row)
    }

    pub async fn list_tasks(&self, workflow_id: &str) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE workflow_id = $1 ORDER BY name, retry_id")
            .bind(workflow_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::task_from_row).collect()
    }

    fn task_from_row(row: &sqlx::postgres::PgRow) -> Result<Task, StoreError> {
        let exit_actions_json: Value = row.try_get("exit_actions")?;
        Ok(Task {
            task_db_key: row.try_get("task_db_key")?,
            task_uuid: row.try_get("task_uuid")?,
            workflow_id: row.try_get("workflow_id")?,
            name: row.try_get("name")?,
            retry_id: row.try_get::<i32, _>("retry_id")? as u32,
            group_name: row.try_get("group_name")?,
            status: enum_from_text(row.try_get("status")?)?,
            node_name: row.try_get("node_name")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            last_heartbeat: row.try_get("last_heartbeat")?,
            resources: ResourceCounters {
                cpu: row.try_get("cpu")?,
                memory_bytes: row.try_get("memory_bytes")?,
                gpu: row.try_get("gpu")?,
                storage_bytes: row.try_get("storage_bytes")?,
            },
            exit_actions: serde_json::from_value(exit_actions_json).unwrap_or_default(),
            lead: row.try_get("lead")?,
        })
    }

    #[instrument(skip(self))]
    pub async fn heartbeat_task(&self, workflow_id: &str, name: &str, retry_id: u32, node_name: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET last_heartbeat = NOW()
            WHERE workflow_id = $1 AND name = $2 AND retry_id = $3 AND node_name = $4
              AND status = $5
            "#,
        )
        .bind(workflow_id)
        .bind(name)
        .bind(retry_id as i32)
        .bind(node_name)
        .bind(enum_text(&TaskStatus::Running))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Applies a backend-reported status/placement update to the task
    /// identified by `task_uuid` (spec §4.8: backend events carry only the
    /// task's attempt-scoped `task_uuid`, not its workflow id).
    #[instrument(skip(self))]
    pub async fn set_task_status(&self, task_uuid: &str, status: TaskStatus, node_name: Option<&str>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = $2,
                node_name = COALESCE($3, node_name),
                start_time = CASE WHEN start_time IS NULL AND $2 = $4 THEN NOW() ELSE start_time END,
                end_time = CASE WHEN end_time IS NULL AND $5 THEN NOW() ELSE end_time END
            WHERE task_uuid = $1
            "#,
        )
        .bind(task_uuid)
        .bind(enum_text(&status))
        .bind(node_name)
        .bind(enum_text(&TaskStatus::Running))
        .bind(status.finished())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Claims up to `max_tasks` tasks still in `WAITING` for `pool`, moving
    /// them to `SCHEDULING` atomically so no two scheduler loops place the
    /// same task (spec §5 "Scheduler" consumes this; spec §4.6 `in_queue()`
    /// names `WAITING` as the state a task sits in before it's picked up).
    #[instrument(skip(self))]
    pub async fn claim_queued_tasks(&self, pool: &str, max_tasks: i64) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query(
            r#"
            WITH claimable AS (
                SELECT t.task_db_key
                FROM tasks t
                JOIN workflows w ON t.workflow_id = (w.workflow_name || '-' || w.job_id)
                WHERE t.status = $1 AND w.pool = $2
                ORDER BY t.start_time NULLS FIRST
                LIMIT $3
                FOR UPDATE OF t SKIP LOCKED
            )
            UPDATE tasks t
            SET status = $4
            FROM claimable c
            WHERE t.task_db_key = c.task_db_key
            RETURNING t.*
            "#,
        )
        .bind(enum_text(&TaskStatus::Waiting))
        .bind(pool)
        .bind(max_tasks)
        .bind(enum_text(&TaskStatus::Scheduling))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::task_from_row).collect()
    }
}

/// A process-local double for tests, avoiding a live Postgres instance.
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    workflows: parking_lot::Mutex<BTreeMap<String, Workflow>>,
    groups: parking_lot::Mutex<BTreeMap<String, BTreeMap<String, TaskGroup>>>,
    tasks: parking_lot::Mutex<BTreeMap<String, Vec<Task>>>,
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn insert_workflow(&self, workflow: Workflow) -> Result<(), StoreError>;
    async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow, StoreError>;
    async fn list_alive_workflow_ids(&self) -> Result<Vec<String>, StoreError>;
    async fn cas_update_status(&self, workflow_id: &str, new_status: WorkflowStatus) -> Result<bool, StoreError>;
    async fn insert_group(&self, group: TaskGroup) -> Result<(), StoreError>;
    async fn list_groups(&self, workflow_id: &str) -> Result<Vec<TaskGroup>, StoreError>;
    async fn insert_task(&self, task: Task) -> Result<(), StoreError>;
    async fn list_tasks(&self, workflow_id: &str) -> Result<Vec<Task>, StoreError>;
    async fn set_task_status(&self, task_uuid: &str, status: TaskStatus, node_name: Option<&str>) -> Result<bool, StoreError>;
}

#[async_trait]
impl WorkflowStore for WorkflowRepository {
    async fn insert_workflow(&self, workflow: Workflow) -> Result<(), StoreError> {
        self.insert_workflow(&workflow).await
    }

    async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow, StoreError> {
        self.get_workflow(workflow_id).await
    }

    async fn list_alive_workflow_ids(&self) -> Result<Vec<String>, StoreError> {
        self.list_alive_workflow_ids().await
    }

    async fn cas_update_status(&self, workflow_id: &str, new_status: WorkflowStatus) -> Result<bool, StoreError> {
        let now = Utc::now();
        let (start_time, end_time) = match new_status {
            WorkflowStatus::Running => (Some(now), None),
            s if s.finished() => (None, Some(now)),
            _ => (None, None),
        };
        self.cas_update_status(workflow_id, new_status, start_time, end_time, None).await
    }

    async fn insert_group(&self, group: TaskGroup) -> Result<(), StoreError> {
        self.insert_group(&group).await
    }

    async fn list_groups(&self, workflow_id: &str) -> Result<Vec<TaskGroup>, StoreError> {
        self.list_groups(workflow_id).await
    }

    async fn insert_task(&self, task: Task) -> Result<(), StoreError> {
        self.insert_task(&task).await
    }

    async fn list_tasks(&self, workflow_id: &str) -> Result<Vec<Task>, StoreError> {
        self.list_tasks(workflow_id).await
    }

    async fn set_task_status(&self, task_uuid: &str, status: TaskStatus, node_name: Option<&str>) -> Result<bool, StoreError> {
        self.set_task_status(task_uuid, status, node_name).await
    }
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn insert_workflow(&self, workflow: Workflow) -> Result<(), StoreError> {
        self.workflows.lock().insert(workflow.workflow_id(), workflow);
        Ok(())
    }

    async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow, StoreError> {
        self.workflows
            .lock()
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| StoreError::WorkflowNotFound(workflow_id.to_string()))
    }

    async fn list_alive_workflow_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.workflows.lock().values().filter(|w| !w.is_finished()).map(|w| w.workflow_id()).collect())
    }

    async fn cas_update_status(&self, workflow_id: &str, new_status: WorkflowStatus) -> Result<bool, StoreError> {
        let mut workflows = self.workflows.lock();
        let Some(workflow) = workflows.get_mut(workflow_id) else {
            return Err(StoreError::WorkflowNotFound(workflow_id.to_string()));
        };
        if workflow.is_finished() {
            return Ok(false);
        }
        workflow.status = new_status;
        Ok(true)
    }

    async fn insert_group(&self, group: TaskGroup) -> Result<(), StoreError> {
        self.groups
            .lock()
            .entry(group.workflow_id.clone())
            .or_default()
            .insert(group.name.clone(), group);
        Ok(())
    }

    async fn list_groups(&self, workflow_id: &str) -> Result<Vec<TaskGroup>, StoreError> {
        Ok(self
            .groups
            .lock()
            .get(workflow_id)
            .map(|groups| groups.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn insert_task(&self, task: Task) -> Result<(), StoreError> {
        self.tasks.lock().entry(task.workflow_id.clone()).or_default().push(task);
        Ok(())
    }

    async fn list_tasks(&self, workflow_id: &str) -> Result<Vec<Task>, StoreError> {
        Ok(self.tasks.lock().get(workflow_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use osmo_types::Priority;

    fn sample_workflow() -> Workflow {
        Workflow {
            workflow_uuid: "wf-uuid".into(),
            workflow_name: "nightly".into(),
            job_id: 1,
            submitted_by: "alice".into(),
            backend: "kai".into(),
            pool: "default".into(),
            priority: Priority::Normal,
            status: WorkflowStatus::Pending,
            submit_time: Utc::now(),
            start_time: None,
            end_time: None,
            exec_timeout: None,
            queue_timeout: None,
            parent_name: None,
            parent_job_id: None,
            app_uuid: None,
            app_version: None,
            tags: BTreeMap::new(),
            plugins: Value::Null,
            cancelled_by: None,
            failure_message: None,
            logs: None,
            outputs: None,
        }
    }

    #[test]
    fn enum_text_round_trips() {
        let text = enum_text(&WorkflowStatus::FailedExecTimeout);
        assert_eq!(text, "FAILED_EXEC_TIMEOUT");
        let back: WorkflowStatus = enum_from_text(text).unwrap();
        assert_eq!(back, WorkflowStatus::FailedExecTimeout);
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let store = InMemoryWorkflowStore::new();
        let workflow = sample_workflow();
        let id = workflow.workflow_id();
        store.insert_workflow(workflow).await.unwrap();
        let got = store.get_workflow(&id).await.unwrap();
        assert_eq!(got.workflow_name, "nightly");
    }

    #[tokio::test]
    async fn list_alive_workflow_ids_excludes_finished_workflows() {
        let store = InMemoryWorkflowStore::new();
        let running = sample_workflow();
        let running_id = running.workflow_id();
        store.insert_workflow(running).await.unwrap();

        let mut finished = sample_workflow();
        finished.workflow_name = "other".into();
        let finished_id = finished.workflow_id();
        store.insert_workflow(finished).await.unwrap();
        store.cas_update_status(&finished_id, WorkflowStatus::Completed).await.unwrap();

        let alive = store.list_alive_workflow_ids().await.unwrap();
        assert_eq!(alive, vec![running_id]);
    }

    #[tokio::test]
    async fn cas_update_rejects_once_finished() {
        let store = InMemoryWorkflowStore::new();
        let workflow = sample_workflow();
        let id = workflow.workflow_id();
        store.insert_workflow(workflow).await.unwrap();
        assert!(store.cas_update_status(&id, WorkflowStatus::Completed).await.unwrap());
        assert!(!store.cas_update_status(&id, WorkflowStatus::Running).await.unwrap());
    }

    #[tokio::test]
    async fn groups_scope_by_workflow() {
        let store = InMemoryWorkflowStore::new();
        let group = TaskGroup {
            group_uuid: "g1".into(),
            workflow_id: "nightly-1".into(),
            name: "fetch".into(),
            spec: Value::Null,
            status: TaskStatus::Waiting,
            remaining_upstream_groups: BTreeSet::new(),
            downstream_groups: BTreeSet::new(),
            barrier: false,
            last_retry_at: None,
        };
        store.insert_group(group).await.unwrap();
        let groups = store.list_groups("nightly-1").await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(store.list_groups("other-1").await.unwrap().len(), 0);
    }
}
