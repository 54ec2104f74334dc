use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{Notification, Notifier, NotifyError};
use crate::config::{GitHubConfig, NotifyConfig};
use crate::github::GitHubClient;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const INBOX_TIMEOUT: Duration = Duration::from_secs(2);

/// Delivers notifications over HTTP with short timeouts.
pub struct HttpNotifier {
    client: Client,
    github: Option<GitHubClient>,
    config: NotifyConfig,
    repo: String,
    workflow_id: String,
}

impl HttpNotifier {
    pub fn new(
        config: NotifyConfig,
        github_config: &GitHubConfig,
        github: Option<GitHubClient>,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            github,
            config,
            repo: github_config.repo.clone(),
            workflow_id: github_config.workflow_id.clone(),
        })
    }

    async fn post_webhook(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(url)
            .header("X-Webhook-Secret", &self.config.webhook_secret)
            .json(payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(NotifyError::Status(resp.status().as_u16()));
        }
        Ok(())
    }

    async fn add_inbox_task(&self, text: &str) -> Result<(), NotifyError> {
        let base = self
            .config
            .tasks_api_url
            .as_deref()
            .ok_or(NotifyError::NotConfigured("TASKS_API_URL"))?;
        let url = format!("{}/tasks/inbox", base.trim_end_matches('/'));

        let resp = self
            .client
            .post(&url)
            .timeout(INBOX_TIMEOUT)
            .json(&serde_json::json!({ "op": "add", "text": text }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(NotifyError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        match notification {
            Notification::WorkflowDispatch => {
                let github = self
                    .github
                    .as_ref()
                    .ok_or(NotifyError::NotConfigured("GITHUB_TOKEN"))?;
                github
                    .dispatch_workflow(&self.repo, &self.workflow_id, "main")
                    .await?;
                Ok(())
            }
            Notification::Webhook { url, payload } => self.post_webhook(url, payload).await,
            Notification::InboxTask { text } => self.add_inbox_task(text).await,
        }
    }
}
