//! Best-effort outbound notifications.
//!
//! Deliveries are spawned after the triggering transaction commits and are
//! attempted at most once. Failures are logged and never reach the caller.

mod http;

pub use http::HttpNotifier;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("GitHub error: {0}")]
    GitHub(#[from] crate::github::GitHubError),
    #[error("Receiver answered with status {0}")]
    Status(u16),
    #[error("Not configured: {0}")]
    NotConfigured(&'static str),
}

/// Something worth telling the outside world about.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Kick the site rebuild workflow on GitHub
    WorkflowDispatch,
    /// POST a JSON body to a webhook receiver
    Webhook {
        url: String,
        payload: serde_json::Value,
    },
    /// Ask the tasks API to add a task to the inbox board
    InboxTask { text: String },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::WorkflowDispatch => "workflow_dispatch",
            Notification::Webhook { .. } => "webhook",
            Notification::InboxTask { .. } => "inbox_task",
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Deliver on a background task. The caller's response never waits on it.
pub fn fire_and_forget(notifier: &Arc<dyn Notifier>, notification: Notification) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        let kind = notification.kind();
        match notifier.deliver(&notification).await {
            Ok(()) => tracing::debug!(kind, "Notification delivered"),
            Err(e) => tracing::warn!(kind, error = %e, "Notification failed"),
        }
    });
}
