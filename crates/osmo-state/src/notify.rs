//! Terminal-transition notifications (spec §4.6 "Notifications": "users may
//! opt in to email/chat notification on terminal transition").

use async_trait::async_trait;
use parking_lot::Mutex;

use osmo_types::WorkflowStatus;

use crate::error::StateError;

/// A user's notification opt-in for a single workflow (spec §4.6).
#[derive(Debug, Clone, Default)]
pub struct NotificationPreferences {
    pub email: Option<String>,
    pub chat_webhook: Option<String>,
}

impl NotificationPreferences {
    pub fn wants_notification(&self) -> bool {
        self.email.is_some() || self.chat_webhook.is_some()
    }
}

/// A terminal-transition event ready to hand to a `Notifier`.
#[derive(Debug, Clone)]
pub struct TerminalEvent {
    pub workflow_id: String,
    pub status: WorkflowStatus,
    pub failure_message: Option<String>,
}

/// Dispatches terminal-transition notifications. Implementations live
/// outside this crate (email/chat are outbound-integration concerns); this
/// crate only decides *whether* a transition is notification-worthy.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &TerminalEvent, prefs: &NotificationPreferences) -> Result<(), StateError>;
}

/// A transition is notification-worthy only once the workflow has actually
/// reached a terminal (`finished()`) status and the user opted in.
pub fn should_notify(status: WorkflowStatus, prefs: &NotificationPreferences) -> bool {
    status.finished() && prefs.wants_notification()
}

/// A `Notifier` that records events in memory, for tests and local dev
/// (parallels the rest of the workspace's `InMemory*` test doubles).
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    pub sent: Mutex<Vec<TerminalEvent>>,
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, event: &TerminalEvent, _prefs: &NotificationPreferences) -> Result<(), StateError> {
        self.sent.lock().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_notification_without_opt_in() {
        let prefs = NotificationPreferences::default();
        assert!(!should_notify(WorkflowStatus::Completed, &prefs));
    }

    #[test]
    fn no_notification_while_still_running() {
        let prefs = NotificationPreferences { email: Some("a@b.com".into()), chat_webhook: None };
        assert!(!should_notify(WorkflowStatus::Running, &prefs));
    }

    #[test]
    fn notifies_on_terminal_status_with_opt_in() {
        let prefs = NotificationPreferences { email: Some("a@b.com".into()), chat_webhook: None };
        assert!(should_notify(WorkflowStatus::FailedExecTimeout, &prefs));
    }

    #[tokio::test]
    async fn in_memory_notifier_records_dispatched_events() {
        let notifier = InMemoryNotifier::default();
        let event = TerminalEvent { workflow_id: "wf-1".into(), status: WorkflowStatus::Completed, failure_message: None };
        let prefs = NotificationPreferences { email: Some("a@b.com".into()), chat_webhook: None };
        notifier.notify(&event, &prefs).await.unwrap();
        assert_eq!(notifier.sent.lock().len(), 1);
    }
}
