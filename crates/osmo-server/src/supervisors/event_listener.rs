//! Per-backend event listener (spec §4.8 `listen_events`, §5 "pod/node
//! events fan in to the state machine"): drains one backend's event stream
//! and applies pod-phase transitions to the matching task row. Per-workflow
//! order is preserved by the backend and by processing this stream serially
//! (spec §5 "Per-workflow event order is preserved within a single
//! listener").

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, instrument, warn};

use osmo_backend::{Backend, PodPhase};
use osmo_storage::WorkflowStore;
use osmo_types::TaskStatus;

use crate::shutdown::ShutdownHandle;

/// Maps a backend-reported pod phase to the task status it drives (spec
/// §4.6 lattice). `Pending`/`Unknown` are pre-running states this listener
/// doesn't resolve further -- the compiler/scheduler bridge already placed
/// the task in `SCHEDULING`/`INITIALIZING` before any pod existed, and a
/// backend reporting `Pending` doesn't tell us which of those it still is.
fn status_for_phase(phase: PodPhase) -> Option<TaskStatus> {
    match phase {
        PodPhase::Running => Some(TaskStatus::Running),
        PodPhase::Succeeded => Some(TaskStatus::Completed),
        PodPhase::Failed => Some(TaskStatus::Failed),
        PodPhase::Pending | PodPhase::Unknown => None,
    }
}

#[instrument(skip(backend, store, shutdown), fields(backend = %backend.name()))]
pub async fn run(backend: Arc<dyn Backend>, store: Arc<dyn WorkflowStore>, mut shutdown: ShutdownHandle) {
    let mut events = backend.listen_events();
    loop {
        tokio::select! {
            _ = shutdown.signalled() => {
                debug!("event listener stopping");
                return;
            }
            event = events.next() => {
                let Some(event) = event else {
                    warn!("backend event stream closed, listener exiting");
                    return;
                };
                if event.heartbeat {
                    continue;
                }
                let (Some(task_uuid), Some(phase)) = (event.task_uuid.as_deref(), event.pod_phase) else {
                    continue;
                };
                let Some(status) = status_for_phase(phase) else { continue };
                match store.set_task_status(task_uuid, status, event.node_name.as_deref()).await {
                    Ok(true) => debug!(%task_uuid, ?status, "applied backend event"),
                    Ok(false) => debug!(%task_uuid, "event for unknown or already-finished task"),
                    Err(err) => warn!(%task_uuid, error = %err, "failed to apply backend event"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_terminal_phases_to_terminal_statuses() {
        assert_eq!(status_for_phase(PodPhase::Succeeded), Some(TaskStatus::Completed));
        assert_eq!(status_for_phase(PodPhase::Failed), Some(TaskStatus::Failed));
        assert_eq!(status_for_phase(PodPhase::Running), Some(TaskStatus::Running));
    }

    #[test]
    fn pending_and_unknown_are_left_for_the_scheduler_bridge_to_resolve() {
        assert_eq!(status_for_phase(PodPhase::Pending), None);
        assert_eq!(status_for_phase(PodPhase::Unknown), None);
    }

    #[tokio::test]
    async fn applies_a_completed_event_to_the_matching_task() {
        use chrono::Utc;
        use osmo_backend::{BackendEvent, InMemoryBackend};
        use osmo_storage::InMemoryWorkflowStore;
        use osmo_types::{Priority, Task, Workflow, WorkflowStatus};
        use std::collections::BTreeMap;

        let concrete = Arc::new(InMemoryBackend::new("kai-prod"));
        let backend: Arc<dyn Backend> = concrete.clone();
        let store: Arc<dyn WorkflowStore> = Arc::new(InMemoryWorkflowStore::new());

        store
            .insert_workflow(Workflow {
                workflow_uuid: "wf-uuid".into(),
                workflow_name: "nightly".into(),
                job_id: 1,
                submitted_by: "alice".into(),
                backend: "kai-prod".into(),
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
                tags: BTreeMap::new(),
                plugins: serde_json::Value::Null,
                cancelled_by: None,
                failure_message: None,
                logs: None,
                outputs: None,
            })
            .await
            .unwrap();
        store
            .insert_task(Task {
                task_db_key: "k1".into(),
                task_uuid: "task-uuid-1".into(),
                workflow_id: "nightly-1".into(),
                name: "build".into(),
                retry_id: 0,
                group_name: "build-group".into(),
                status: TaskStatus::Running,
                node_name: Some("node-a".into()),
                start_time: Some(Utc::now()),
                end_time: None,
                last_heartbeat: Some(Utc::now()),
                resources: Default::default(),
                exit_actions: vec![],
                lead: true,
            })
            .await
            .unwrap();

        let (controller, handle) = crate::shutdown::ShutdownController::new();
        let listener = tokio::spawn(run(backend.clone(), store.clone(), handle));
        // Let the spawned listener reach `backend.listen_events()` and
        // register its subscription before we emit, or the event is
        // dropped with no one listening.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        concrete.emit_event(BackendEvent {
            backend: "kai-prod".into(),
            observed_at: Utc::now(),
            task_uuid: Some("task-uuid-1".into()),
            node_name: Some("node-a".into()),
            pod_phase: Some(PodPhase::Succeeded),
            node_conditions: vec![],
            heartbeat: false,
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let tasks = store.list_tasks("nightly-1").await.unwrap();
        assert_eq!(tasks[0].status, TaskStatus::Completed);

        drop(controller);
        listener.abort();
    }
}
