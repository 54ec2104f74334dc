//! Minimal GitHub REST client: workflow dispatch and Contents API writes.

use std::time::Duration;

use base64::Engine;
use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;

const USER_AGENT: &str = concat!("pkm-hub/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid GitHub URL: {0}")]
    InvalidUrl(String),
    #[error("GitHub answered with status {status}")]
    Upstream {
        status: u16,
        body: serde_json::Value,
    },
}

#[derive(Clone)]
pub struct GitHubClient {
    api_url: Url,
    client: Client,
    token: String,
}

#[derive(Deserialize)]
struct ContentsResponse {
    content: Option<ContentEntry>,
}

#[derive(Deserialize)]
struct ContentEntry {
    html_url: Option<String>,
}

impl GitHubClient {
    pub fn new(api_url: &str, token: &str) -> Result<Self, GitHubError> {
        let api_url = Url::parse(api_url).map_err(|e| GitHubError::InvalidUrl(e.to_string()))?;
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            api_url,
            client,
            token: token.to_string(),
        })
    }

    /// Build `<api>/repos/<owner>/<name>/<tail...>`.
    fn repo_url(&self, repo: &str, tail: &[&str]) -> Result<Url, GitHubError> {
        let (owner, name) = repo
            .split_once('/')
            .filter(|(o, n)| !o.is_empty() && !n.is_empty())
            .ok_or_else(|| GitHubError::InvalidUrl(format!("repository '{repo}'")))?;

        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| GitHubError::InvalidUrl(self.api_url.to_string()))?
            .pop_if_empty()
            .extend(["repos", owner, name])
            .extend(tail);
        Ok(url)
    }

    /// Trigger a `workflow_dispatch` run on `git_ref`.
    pub async fn dispatch_workflow(
        &self,
        repo: &str,
        workflow_id: &str,
        git_ref: &str,
    ) -> Result<(), GitHubError> {
        let url = self.repo_url(repo, &["actions", "workflows", workflow_id, "dispatches"])?;
        let resp = self
            .client
            .post(url)
            .header("Accept", "application/vnd.github+json")
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "ref": git_ref }))
            .send()
            .await?;

        check_status(resp).await.map(|_| ())
    }

    /// Create a file through the Contents API, returning its web URL.
    pub async fn put_contents(
        &self,
        repo: &str,
        path: &str,
        message: &str,
        content: &[u8],
        branch: &str,
    ) -> Result<Option<String>, GitHubError> {
        let mut tail = vec!["contents"];
        tail.extend(path.split('/').filter(|s| !s.is_empty()));
        let url = self.repo_url(repo, &tail)?;

        let resp = self
            .client
            .put(url)
            .header("Accept", "application/vnd.github+json")
            .bearer_auth(&self.token)
            .json(&serde_json::json!({
                "message": message,
                "content": base64::engine::general_purpose::STANDARD.encode(content),
                "branch": branch,
            }))
            .send()
            .await?;

        let resp = check_status(resp).await?;
        let body: ContentsResponse = resp.json().await?;
        Ok(body.content.and_then(|c| c.html_url))
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, GitHubError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.json().await.unwrap_or(serde_json::Value::Null);
    Err(GitHubError::Upstream {
        status: status.as_u16(),
        body,
    })
}
