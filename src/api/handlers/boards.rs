use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{dispatch_error, log_event};
use crate::api::conditional::Validator;
use crate::api::response::{ApiError, AppJson, AppQuery, JSend};
use crate::dispatcher::TaskRequest;
use crate::ics;
use crate::notify::{fire_and_forget, Notification};
use crate::storage::models::{BoardSnapshot, TaskOp, TaskRecord};
use crate::AppState;

const MAX_BOARD_SLUG_LEN: usize = 128;
const INBOX_BOARD: &str = "inbox";

// ============================================================================
// Types
// ============================================================================

/// Wire shape of a board. Timestamps are unix seconds.
#[derive(Debug, Serialize)]
pub struct BoardView {
    pub slug: String,
    pub title: String,
    pub version: u64,
    pub created: i64,
    pub updated: i64,
    pub tasks: Vec<TaskView>,
}

#[derive(Debug, Serialize)]
pub struct TaskView {
    pub id: String,
    pub text: String,
    pub done: bool,
    pub is_published: bool,
    pub sort_order: i64,
    pub ts: i64,
}

#[derive(Debug, Serialize)]
pub struct PublishedTask {
    pub id: String,
    pub board_slug: String,
    pub text: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct PublishedResponse {
    pub tasks: Vec<PublishedTask>,
}

#[derive(Debug, Deserialize)]
pub struct InboxItemRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, rename = "type")]
    pub item_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InboxAccepted {
    pub status: &'static str,
    pub board: &'static str,
    pub task_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuickAddParams {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CalendarParams {
    #[serde(default)]
    pub b: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Route: GET /tasks/:slug
pub async fn get_board(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    validate_slug(&slug)?;

    let snapshot = state
        .db
        .board_snapshot(&slug)
        .map_err(ApiError::storage("Failed to load board"))?;

    let validator = Validator::for_board(&snapshot);
    if validator.is_fresh(&headers) {
        return Ok(validator.not_modified());
    }

    let mut response = Json(board_view(&snapshot)).into_response();
    validator.apply(response.headers_mut(), state.config.limits.cache_ttl);
    Ok(response)
}

/// Route: POST /tasks/:slug
///
/// Applies one operation and answers with the fresh projection.
pub async fn post_task_op(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    AppJson(body): AppJson<serde_json::Value>,
) -> Result<Json<BoardView>, ApiError> {
    validate_slug(&slug)?;

    let request = TaskRequest::from_json(body).map_err(dispatch_error)?;
    state
        .dispatcher
        .dispatch(&slug, &request)
        .map_err(dispatch_error)?;

    let snapshot = state
        .db
        .board_snapshot(&slug)
        .map_err(ApiError::storage("Failed to load board"))?;
    Ok(Json(board_view(&snapshot)))
}

/// Add a task from a bookmarklet or link, then send the browser to the board.
/// Route: GET /tasks/:slug/quick-add?text=
pub async fn quick_add(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    AppQuery(params): AppQuery<QuickAddParams>,
) -> Result<Response, ApiError> {
    validate_slug(&slug)?;

    let text = params.text.unwrap_or_default();
    state
        .dispatcher
        .dispatch(&slug, &TaskRequest::new(TaskOp::Add { text }))
        .map_err(dispatch_error)?;

    let location = format!("/tasks/{}", encode_segment(&slug));
    Ok((StatusCode::SEE_OTHER, [(header::LOCATION, location)]).into_response())
}

/// Route: GET /published
pub async fn published(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<PublishedResponse>>, ApiError> {
    let tasks = state
        .db
        .list_published_tasks()
        .map_err(ApiError::storage("Failed to list published tasks"))?;

    Ok(JSend::success(PublishedResponse {
        tasks: tasks.iter().map(published_task).collect(),
    }))
}

/// Route: POST /inbox/items
pub async fn inbox_item(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<InboxItemRequest>,
) -> Result<(StatusCode, Json<JSend<InboxAccepted>>), ApiError> {
    let url = req
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::bad_request("url is required"))?;

    let item_type = req.item_type.as_deref().unwrap_or("file");
    let filename = req.filename.as_deref().unwrap_or("item");
    let text = inbox_text(item_type, filename, url);

    let outcome = state
        .dispatcher
        .dispatch(INBOX_BOARD, &TaskRequest::new(TaskOp::Add { text }))
        .map_err(dispatch_error)?;

    log_event(
        &state,
        "inbox_item_accepted",
        serde_json::json!({ "url": url, "type": item_type }),
    );

    Ok(JSend::with_status(
        StatusCode::ACCEPTED,
        InboxAccepted {
            status: "accepted",
            board: INBOX_BOARD,
            task_id: outcome.added_task_id,
        },
    ))
}

/// Route: GET /tasks/:slug/calendar.ics
pub async fn calendar(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Response, ApiError> {
    render_ics(&state, &ics::safe_slug(&slug))
}

/// Route: GET /calendar?b=<slug>
pub async fn calendar_query(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<CalendarParams>,
) -> Result<Response, ApiError> {
    let slug = ics::safe_slug(params.b.as_deref().unwrap_or_default());
    render_ics(&state, &slug)
}

// ============================================================================
// Helpers
// ============================================================================

fn validate_slug(slug: &str) -> Result<(), ApiError> {
    if slug.trim().is_empty() {
        return Err(ApiError::bad_request("board slug must not be empty"));
    }
    if slug.chars().count() > MAX_BOARD_SLUG_LEN {
        return Err(ApiError::bad_request(format!(
            "board slug must be at most {MAX_BOARD_SLUG_LEN} characters"
        )));
    }
    Ok(())
}

/// Percent-encode everything outside the URL unreserved set.
fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn render_ics(state: &AppState, slug: &str) -> Result<Response, ApiError> {
    let snapshot = state
        .db
        .board_snapshot(slug)
        .map_err(ApiError::storage("Failed to load board"))?;
    let body = ics::render_calendar(&snapshot, &state.config.node.ics_uid_domain);

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "inline; filename=\"calendar.ics\""),
            (header::CACHE_CONTROL, "public, max-age=60"),
        ],
        body,
    )
        .into_response())
}

/// Text of the inbox task created for a captured item.
pub(crate) fn inbox_text(item_type: &str, filename: &str, url: &str) -> String {
    format!("Process new {item_type}: [{filename}]({url})")
}

/// Queue an inbox task for a captured item. With a tasks API configured the
/// call goes out over HTTP; otherwise the task is added to the local inbox.
pub(crate) fn queue_inbox_task(state: &AppState, text: String) {
    if state.config.notify.tasks_api_url.is_some() {
        fire_and_forget(&state.notifier, Notification::InboxTask { text });
        return;
    }

    if let Err(e) = state
        .dispatcher
        .dispatch(INBOX_BOARD, &TaskRequest::new(TaskOp::Add { text }))
    {
        tracing::warn!(board = INBOX_BOARD, error = %e, "Failed to add inbox task");
    }
}

fn board_view(snapshot: &BoardSnapshot) -> BoardView {
    BoardView {
        slug: snapshot.board.slug.clone(),
        title: snapshot.board.title.clone(),
        version: snapshot.board.version,
        created: snapshot.board.created_at.timestamp(),
        updated: snapshot.board.updated_at.timestamp(),
        tasks: snapshot
            .tasks
            .iter()
            .map(|task| TaskView {
                id: task.id.clone(),
                text: task.text.clone(),
                done: task.is_done,
                is_published: task.is_published,
                sort_order: task.sort_order,
                ts: task.created_at.timestamp(),
            })
            .collect(),
    }
}

fn published_task(task: &TaskRecord) -> PublishedTask {
    PublishedTask {
        id: task.id.clone(),
        board_slug: task.board_slug.clone(),
        text: task.text.clone(),
        updated_at: task.updated_at.to_rfc3339(),
    }
}
