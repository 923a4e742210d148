//! State aggregator (spec §5 background loops; §4.6, §8 invariant 1): the
//! periodic pass that recomputes every alive workflow's status from its
//! groups' current-attempt tasks, cascades upstream failures, and funnels
//! the result through the state machine's single CAS entry point. Exists
//! because backend events update individual tasks (`event_listener`); this
//! loop is what actually rolls those task-level writes up into group and
//! workflow status (spec §3 invariant 3: "a group's/workflow's status is a
//! pure function" -- recomputed here, not maintained incrementally, so it
//! is always correct even if an event was missed).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use osmo_state::{aggregate_group_status, aggregate_workflow_status, apply_transition, cascade_upstream_failures, TransitionRequest};
use osmo_storage::WorkflowStore;
use osmo_types::TaskStatus;

use crate::shutdown::ShutdownHandle;

#[instrument(skip(store, shutdown))]
pub async fn run(store: Arc<dyn WorkflowStore>, interval: Duration, mut shutdown: ShutdownHandle) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = shutdown.signalled() => return,
            _ = ticker.tick() => {
                if let Err(err) = run_once(store.as_ref()).await {
                    warn!(error = %err, "state aggregation pass failed");
                }
            }
        }
    }
}

async fn run_once(store: &dyn WorkflowStore) -> Result<(), osmo_storage::StoreError> {
    for workflow_id in store.list_alive_workflow_ids().await? {
        aggregate_one(store, &workflow_id).await?;
    }
    Ok(())
}

async fn aggregate_one(store: &dyn WorkflowStore, workflow_id: &str) -> Result<(), osmo_storage::StoreError> {
    let mut groups = store.list_groups(workflow_id).await?;
    let tasks = store.list_tasks(workflow_id).await?;

    // Current attempt per task name = the row with the highest retry_id
    // (spec §3 invariant 2).
    let mut current_attempt: BTreeMap<(String, String), TaskStatus> = BTreeMap::new();
    let mut highest_retry: BTreeMap<(String, String), u32> = BTreeMap::new();
    for task in &tasks {
        let key = (task.group_name.clone(), task.name.clone());
        let seen = highest_retry.get(&key).copied().unwrap_or(0);
        if task.retry_id >= seen || !current_attempt.contains_key(&key) {
            highest_retry.insert(key.clone(), task.retry_id);
            current_attempt.insert(key, task.status);
        }
    }

    let mut group_map = BTreeMap::new();
    for mut group in groups.drain(..) {
        let statuses: Vec<TaskStatus> =
            current_attempt.iter().filter(|(key, _)| key.0 == group.name).map(|(_, status)| *status).collect();
        if !statuses.is_empty() {
            group.status = aggregate_group_status(&statuses);
        }
        group_map.insert(group.name.clone(), group);
    }

    cascade_upstream_failures(&mut group_map);

    let group_statuses: Vec<TaskStatus> = group_map.values().map(|g| g.status).collect();
    let new_status = aggregate_workflow_status(&group_statuses);

    let mut workflow = store.get_workflow(workflow_id).await?;
    if workflow.status == new_status {
        return Ok(());
    }

    let failure_message = group_map
        .values()
        .find(|g| g.status.failed())
        .map(|g| format!("group {:?} failed with status {}", g.name, g.status));

    let mut request = TransitionRequest::new(new_status);
    if let Some(message) = failure_message {
        request = request.failure_message(message);
    }

    match apply_transition(&mut workflow, request) {
        Ok(()) => {
            store.cas_update_status(workflow_id, new_status).await?;
            debug!(%workflow_id, ?new_status, "workflow status rolled up");
        }
        // The only error `apply_transition` raises is "already finished"
        // (spec §3 invariant 4: terminal rows never move again); harmless
        // to see here since the alive-workflow snapshot can be stale by a
        // tick if another path finished the workflow concurrently.
        Err(err) => debug!(%workflow_id, %err, "skipping rollup for already-finished workflow"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use osmo_storage::InMemoryWorkflowStore;
    use osmo_types::{Priority, Task, TaskGroup, Workflow, WorkflowStatus};
    use std::collections::BTreeSet;

    fn workflow() -> Workflow {
        Workflow {
            workflow_uuid: "wf-uuid".into(),
            workflow_name: "nightly".into(),
            job_id: 1,
            submitted_by: "alice".into(),
            backend: "kai".into(),
            pool: "default".into(),
            priority: Priority::Normal,
            status: WorkflowStatus::Running,
            submit_time: Utc::now(),
            start_time: Some(Utc::now()),
            end_time: None,
            exec_timeout: None,
            queue_timeout: None,
            parent_name: None,
            parent_job_id: None,
            app_uuid: None,
            app_version: None,
            tags: Default::default(),
            plugins: serde_json::Value::Null,
            cancelled_by: None,
            failure_message: None,
            logs: None,
            outputs: None,
        }
    }

    fn task(group_name: &str, name: &str, status: TaskStatus) -> Task {
        Task {
            task_db_key: format!("{group_name}-{name}"),
            task_uuid: format!("{group_name}-{name}-uuid"),
            workflow_id: "nightly-1".into(),
            name: name.into(),
            retry_id: 0,
            group_name: group_name.into(),
            status,
            node_name: None,
            start_time: None,
            end_time: None,
            last_heartbeat: None,
            resources: Default::default(),
            exit_actions: vec![],
            lead: false,
        }
    }

    #[tokio::test]
    async fn rolls_a_completed_single_group_workflow_up_to_completed() {
        let store = InMemoryWorkflowStore::new();
        store.insert_workflow(workflow()).await.unwrap();
        store
            .insert_group(TaskGroup {
                group_uuid: "g1".into(),
                workflow_id: "nightly-1".into(),
                name: "build".into(),
                spec: serde_json::Value::Null,
                status: TaskStatus::Running,
                remaining_upstream_groups: BTreeSet::new(),
                downstream_groups: BTreeSet::new(),
                barrier: false,
                last_retry_at: None,
            })
            .await
            .unwrap();
        store.insert_task(task("build", "compile", TaskStatus::Completed)).await.unwrap();

        run_once(&store).await.unwrap();

        let updated = store.get_workflow("nightly-1").await.unwrap();
        assert_eq!(updated.status, WorkflowStatus::Completed);
        assert!(updated.end_time.is_some());
    }

    #[tokio::test]
    async fn already_terminal_workflows_are_skipped_without_error() {
        let store = InMemoryWorkflowStore::new();
        let mut wf = workflow();
        wf.status = WorkflowStatus::Completed;
        wf.end_time = Some(Utc::now());
        store.insert_workflow(wf).await.unwrap();

        // Not in `list_alive_workflow_ids`, so the pass does nothing to it.
        run_once(&store).await.unwrap();
        let still = store.get_workflow("nightly-1").await.unwrap();
        assert_eq!(still.status, WorkflowStatus::Completed);
    }
}
