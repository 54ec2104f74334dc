use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::storage::DatabaseError;

// ============================================================================
// Success envelope
// ============================================================================

/// `{"status": "success", "data": ...}`
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename = "success")]
pub struct JSend<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> JSend<T> {
    pub fn success(data: T) -> Json<JSend<T>> {
        Json(JSend { data })
    }

    /// Success envelope with a non-200 status (e.g. `201 Created`).
    pub fn with_status(status_code: StatusCode, data: T) -> (StatusCode, Json<JSend<T>>) {
        (status_code, Self::success(data))
    }
}

// ============================================================================
// Failure envelopes
// ============================================================================

#[derive(Debug, Serialize)]
struct FailData<'a> {
    message: &'a str,
}

/// Client errors carry their message under `data`, server errors at the top level.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum FailureBody<'a> {
    Fail { data: FailData<'a> },
    Error { message: &'a str },
}

/// Handler error rendered as a JSend `fail` (4xx) or `error` (5xx) body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    /// Map a storage failure. Uniqueness and version conflicts become 409;
    /// anything else is logged and reported as a generic failure.
    pub fn storage(context: &'static str) -> impl FnOnce(DatabaseError) -> ApiError {
        move |e| match e {
            DatabaseError::Conflict(message) => ApiError::conflict(message),
            DatabaseError::VersionMismatch { expected, actual } => ApiError::conflict(format!(
                "board is at version {actual}, request expected {expected}"
            )),
            other => {
                tracing::error!(error = %other, "{context}");
                ApiError::internal(context)
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.message.as_str();
        let body = if self.status.is_server_error() {
            FailureBody::Error { message }
        } else {
            FailureBody::Fail {
                data: FailData { message },
            }
        };
        (self.status, Json(body)).into_response()
    }
}

// ============================================================================
// Extractors that reject with JSend bodies
// ============================================================================

/// `axum::Json` with JSend rejections.
pub struct AppJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, ApiError> {
        let rejection = match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => return Ok(AppJson(value)),
            Err(rejection) => rejection,
        };

        Err(match rejection {
            JsonRejection::JsonDataError(err) => {
                ApiError::bad_request(format!("Invalid request body: {}", err.body_text()))
            }
            JsonRejection::JsonSyntaxError(_) => {
                ApiError::bad_request("Malformed JSON in request body")
            }
            JsonRejection::MissingJsonContentType(_) => {
                ApiError::bad_request("Missing Content-Type: application/json header")
            }
            other if other.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                ApiError::payload_too_large("Request body is too large")
            }
            _ => ApiError::bad_request("Failed to read request body"),
        })
    }
}

/// Query string extractor backed by `serde_qs`, with JSend rejections.
pub struct AppQuery<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequestParts<S> for AppQuery<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, ApiError> {
        let query = parts.uri.query().unwrap_or_default();
        serde_qs::from_str(query)
            .map(AppQuery)
            .map_err(|e| ApiError::bad_request(describe_query_error(&e.to_string())))
    }
}

/// Replace Rust integer type names in serde messages with plain words.
fn describe_query_error(raw: &str) -> String {
    let mut cleaned = raw.to_string();
    for (ty, word) in [
        ("usize", "non-negative integer"),
        ("u64", "non-negative integer"),
        ("u32", "non-negative integer"),
        ("i64", "integer"),
        ("i32", "integer"),
    ] {
        cleaned = cleaned.replace(ty, word);
    }
    format!("Invalid query parameter: {cleaned}")
}
