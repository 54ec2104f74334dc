use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::log_event;
use crate::api::response::{ApiError, AppJson, JSend};
use crate::github::GitHubError;
use crate::notes::render_note;
use crate::AppState;

const NOTES_BRANCH: &str = "main";

#[derive(Debug, Deserialize)]
pub struct PublishNoteRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: String,
    /// Comma-separated
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub layout: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PublishNoteResponse {
    pub status: &'static str,
    pub path: String,
    pub html_url: Option<String>,
}

/// Route: POST /notes
pub async fn publish_note(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<PublishNoteRequest>,
) -> Result<(StatusCode, Json<JSend<PublishNoteResponse>>), ApiError> {
    let github = state
        .github
        .as_ref()
        .ok_or_else(|| ApiError::internal("GitHub token is not configured"))?;

    let title = non_blank(req.title.as_deref()).unwrap_or("Note");
    let layout = non_blank(req.layout.as_deref()).unwrap_or("post");
    let repo = non_blank(req.repo.as_deref()).unwrap_or(&state.config.github.repo);

    let note = render_note(title, &req.body, &req.tags, layout, Utc::now());
    let html_url = github
        .put_contents(
            repo,
            &note.path,
            &format!("Publish: {title}"),
            note.content.as_bytes(),
            NOTES_BRANCH,
        )
        .await
        .map_err(|e| {
            tracing::warn!(repo = %repo, path = %note.path, error = %e, "Note publish failed");
            match e {
                GitHubError::Upstream { status, .. } => {
                    ApiError::bad_gateway(format!("GitHub answered with status {status}"))
                }
                GitHubError::InvalidUrl(message) => ApiError::bad_request(message),
                GitHubError::Http(_) => ApiError::bad_gateway("GitHub is unreachable"),
            }
        })?;

    log_event(
        &state,
        "published_note",
        serde_json::json!({
            "repo": repo,
            "path": note.path,
            "html_url": html_url,
            "title": title,
        }),
    );
    tracing::info!(repo = %repo, path = %note.path, "Published note");

    Ok(JSend::with_status(
        StatusCode::CREATED,
        PublishNoteResponse {
            status: "ok",
            path: note.path,
            html_url,
        },
    ))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use tower::ServiceExt;

    use crate::api::create_app;
    use crate::testutil::{test_config, test_state, test_state_with};

    fn publish(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/notes")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_publish_without_token() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _) = test_state(&dir);
        let app = create_app(state);

        let response = app
            .oneshot(publish(serde_json::json!({ "title": "Hi", "body": "x" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_unreachable_github_is_bad_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.github.token = Some("token".into());
        // Nothing listens on the discard port
        config.github.api_url = "http://127.0.0.1:9".into();
        let (state, _) = test_state_with(config);
        let app = create_app(state.clone());

        let response = app
            .oneshot(publish(serde_json::json!({ "title": "Hi", "body": "x" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(state.db.tail_events(10).unwrap().is_empty());
    }
}
