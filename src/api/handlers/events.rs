use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::response::{ApiError, AppJson, AppQuery, JSend};
use crate::storage::models::EventRecord;
use crate::AppState;

const DEFAULT_TAIL: usize = 100;
const MAX_TAIL: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct EmitEventRequest {
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct EmitEventResponse {
    pub status: &'static str,
    pub event: EventRecord,
}

#[derive(Debug, Deserialize)]
pub struct TailParams {
    #[serde(default)]
    pub n: Option<i64>,
}

/// Route: POST /events
pub async fn emit_event(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<EmitEventRequest>,
) -> Result<Json<JSend<EmitEventResponse>>, ApiError> {
    let event_type = req
        .event_type
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("type is required"))?;

    let event = state
        .db
        .append_event(&event_type, req.payload)
        .map_err(ApiError::storage("Failed to record event"))?;

    Ok(JSend::success(EmitEventResponse {
        status: "ok",
        event,
    }))
}

/// Route: GET /events?n=100
pub async fn tail_events(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<TailParams>,
) -> Result<Json<JSend<Vec<EventRecord>>>, ApiError> {
    let events = state
        .db
        .tail_events(tail_len(params.n))
        .map_err(ApiError::storage("Failed to read events"))?;
    Ok(JSend::success(events))
}

fn tail_len(n: Option<i64>) -> usize {
    n.map_or(DEFAULT_TAIL, |n| n.clamp(1, MAX_TAIL as i64) as usize)
}
