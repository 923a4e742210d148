//! Timeout enforcer (spec §5 background loops; §4.6 "Timeouts"): periodic
//! pass that marks tasks `FAILED_QUEUE_TIMEOUT` once they have overstayed
//! `queue_timeout` in the queue, or `FAILED_EXEC_TIMEOUT` once a running task
//! has overstayed `exec_timeout`. The state aggregator then rolls these
//! task-level failures up into group/workflow status on its own next pass --
//! this loop only owns the clock comparison, not the aggregation rule (spec
//! §3 invariant 3 keeps those two concerns separate).

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tracing::{instrument, warn};

use osmo_state::{exec_timeout_expired, queue_timeout_expired};
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
                    warn!(error = %err, "timeout enforcement pass failed");
                }
            }
        }
    }
}

async fn run_once(store: &dyn WorkflowStore) -> Result<(), osmo_storage::StoreError> {
    let now = chrono::Utc::now();
    for workflow_id in store.list_alive_workflow_ids().await? {
        let workflow = store.get_workflow(&workflow_id).await?;
        // `exec_timeout`/`queue_timeout` are stored as whole seconds (spec §6
        // durations, normalized by the compiler's timeout-resolution step).
        let queue_timeout = workflow.queue_timeout.map(ChronoDuration::seconds);
        let exec_timeout = workflow.exec_timeout.map(ChronoDuration::seconds);

        for task in store.list_tasks(&workflow_id).await? {
            if task.status.finished() {
                continue;
            }
            if let Some(queue_timeout) = queue_timeout {
                if queue_timeout_expired(&task, workflow.submit_time, queue_timeout, now) {
                    store.set_task_status(&task.task_uuid, TaskStatus::FailedQueueTimeout, None).await?;
                    continue;
                }
            }
            if let Some(exec_timeout) = exec_timeout {
                if exec_timeout_expired(&task, exec_timeout, now) {
                    store.set_task_status(&task.task_uuid, TaskStatus::FailedExecTimeout, None).await?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use osmo_storage::InMemoryWorkflowStore;
    use osmo_types::{Priority, Task, Workflow, WorkflowStatus};

    fn workflow_with_timeouts(queue_timeout_secs: i64, exec_timeout_secs: i64) -> Workflow {
        Workflow {
            workflow_uuid: "wf-uuid".into(),
            workflow_name: "nightly".into(),
            job_id: 1,
            submitted_by: "alice".into(),
            backend: "kai".into(),
            pool: "default".into(),
            priority: Priority::Normal,
            status: WorkflowStatus::Running,
            submit_time: Utc::now() - chrono::Duration::hours(5),
            start_time: Some(Utc::now() - chrono::Duration::hours(4)),
            end_time: None,
            exec_timeout: Some(exec_timeout_secs),
            queue_timeout: Some(queue_timeout_secs),
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

    #[tokio::test]
    async fn a_long_running_task_is_marked_exec_timed_out() {
        let store = InMemoryWorkflowStore::new();
        store.insert_workflow(workflow_with_timeouts(3600, 60)).await.unwrap();
        store
            .insert_task(Task {
                task_db_key: "k1".into(),
                task_uuid: "task-1".into(),
                workflow_id: "nightly-1".into(),
                name: "compile".into(),
                retry_id: 0,
                group_name: "build".into(),
                status: TaskStatus::Running,
                node_name: Some("n1".into()),
                start_time: Some(Utc::now() - chrono::Duration::hours(4)),
                end_time: None,
                last_heartbeat: Some(Utc::now()),
                resources: Default::default(),
                exit_actions: vec![],
                lead: true,
            })
            .await
            .unwrap();

        run_once(&store).await.unwrap();

        let tasks = store.list_tasks("nightly-1").await.unwrap();
        assert_eq!(tasks[0].status, TaskStatus::FailedExecTimeout);
    }
}
