use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::{ApiError, JSend};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub boards_deleted: u64,
    pub events_deleted: u64,
    pub files_deleted: u64,
    pub links_deleted: u64,
    pub tasks_deleted: u64,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Wipe every table and the blobs they reference. Mounted only in test mode.
pub async fn admin_purge(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<PurgeResponse>>, ApiError> {
    let files = state
        .db
        .list_files()
        .map_err(ApiError::storage("Failed to purge"))?;
    let stats = state
        .db
        .purge_all()
        .map_err(ApiError::storage("Failed to purge"))?;

    for file in &files {
        if let Err(e) = state.object_store.delete(&file.filename).await {
            tracing::warn!(file_id = file.id, error = %e, "Failed to delete blob during purge");
        }
    }

    tracing::warn!(
        boards = stats.boards,
        files = stats.files,
        links = stats.links,
        tasks = stats.tasks,
        "Purged all data"
    );

    Ok(JSend::success(PurgeResponse {
        boards_deleted: stats.boards,
        events_deleted: stats.events,
        files_deleted: stats.files,
        links_deleted: stats.links,
        tasks_deleted: stats.tasks,
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use tower::ServiceExt;

    use crate::api::create_app;
    use crate::storage::models::TaskOp;
    use crate::testutil::{test_config, test_state, test_state_with};

    fn purge() -> Request<Body> {
        Request::builder()
            .method(Method::DELETE)
            .uri("/admin/purge")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _) = test_state(&dir);
        let response = create_app(state)
            .oneshot(Request::builder().uri("/_internal/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_purge_clears_everything() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _) = test_state(&dir);
        state
            .db
            .apply_task_op("a", &TaskOp::Add { text: "x".into() }, None, Default::default())
            .unwrap();
        state.db.create_link("abcdefgh", "https://example.com").unwrap();

        let response = create_app(state.clone()).oneshot(purge()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["data"]["tasks_deleted"], 1);
        assert_eq!(body["data"]["links_deleted"], 1);

        assert!(state.db.get_board("a").unwrap().is_none());
        assert!(state.db.get_link("abcdefgh").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_hidden_outside_test_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.test_mode = false;
        let (state, _) = test_state_with(config);

        let response = create_app(state).oneshot(purge()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
