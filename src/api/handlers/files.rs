use std::path::Path as FsPath;
use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;

use super::boards::{inbox_text, queue_inbox_task};
use super::log_event;
use crate::api::conditional::Validator;
use crate::api::response::{ApiError, JSend};
use crate::ids::{random_id, RandomError, FILENAME_SUFFIX_BYTES};
use crate::notify::{fire_and_forget, Notification};
use crate::object_store::ObjectStoreError;
use crate::storage::models::FileRecord;
use crate::storage::DatabaseError;
use crate::AppState;

const FALLBACK_BASENAME: &str = "unnamed_file";
const OCTET_STREAM: &str = "application/octet-stream";
const MAX_NAME_ATTEMPTS: usize = 5;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub id: u64,
    pub filename: String,
    pub url: String,
}

/// A stored file plus the fields the upload frontend expects.
#[derive(Debug, Serialize)]
pub struct FileView {
    pub id: u64,
    pub filename: String,
    pub original_name: String,
    pub filesize: u64,
    pub mime_type: String,
    pub created_at: String,
    pub url: String,
    pub name: String,
    pub size: u64,
    #[serde(rename = "lastModified")]
    pub last_modified: i64,
    #[serde(rename = "creationDate")]
    pub creation_date: String,
    #[serde(rename = "displayType")]
    pub display_type: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: &'static str,
    pub id: u64,
    pub filename: String,
}

/// Where an upload came from; decides the kind reported to the cut engine.
#[derive(Debug, Clone, Copy, PartialEq)]
enum UploadKind {
    File,
    Image,
    Text,
}

impl UploadKind {
    fn from_source(source: Option<&str>) -> Self {
        match source {
            Some("paste_text") => UploadKind::Text,
            Some("paste_image") => UploadKind::Image,
            _ => UploadKind::File,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            UploadKind::File => "file",
            UploadKind::Image => "image",
            UploadKind::Text => "text",
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Route: POST /files
pub async fn create_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<JSend<UploadResponse>>), ApiError> {
    let max_upload_size = state.config.limits.max_upload_size;

    let mut file_data: Option<Bytes> = None;
    let mut client_name: Option<String> = None;
    let mut client_type: Option<String> = None;
    let mut upload_source: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "fileToUpload" | "file" => {
                client_name = field.file_name().map(|s| s.to_string());
                client_type = field.content_type().map(|s| s.to_string());

                let data = field.bytes().await.map_err(multipart_error)?;
                if data.len() as u64 > max_upload_size {
                    return Err(too_large(max_upload_size));
                }
                file_data = Some(data);
            }
            "upload_source" => {
                upload_source = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    let data = file_data
        .ok_or_else(|| ApiError::bad_request("No file data received in fileToUpload field"))?;
    let original_name = client_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("capture_{}", Utc::now().timestamp()));

    let mime_type = detect_mime(client_type.as_deref(), &original_name, &data);
    let record = store_upload(&state, &original_name, mime_type, data, || {
        random_id(FILENAME_SUFFIX_BYTES)
    })
    .await?;

    let url = public_url(&state, &record.filename);
    let kind = UploadKind::from_source(upload_source.as_deref());

    queue_inbox_task(&state, inbox_text("file", &record.filename, &url));
    if let Some(ref webhook) = state.config.notify.cut_webhook_url {
        fire_and_forget(
            &state.notifier,
            Notification::Webhook {
                url: webhook.clone(),
                payload: serde_json::json!({
                    "source": "pkm-hub",
                    "type": kind.as_str(),
                    "url": url,
                    "filename": record.filename,
                    "size": record.filesize,
                    "timestamp": Utc::now().timestamp(),
                }),
            },
        );
    }

    log_event(
        &state,
        "file_upload_success",
        serde_json::json!({
            "file_id": record.id,
            "filename": record.filename,
            "size": record.filesize,
            "mime": record.mime_type,
        }),
    );
    tracing::debug!(file_id = record.id, filename = %record.filename, "Stored file");

    Ok(JSend::with_status(
        StatusCode::CREATED,
        UploadResponse {
            message: format!("File uploaded: {}", record.filename),
            id: record.id,
            filename: record.filename,
            url,
        },
    ))
}

/// Route: GET /files
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let listing = state
        .db
        .file_listing()
        .map_err(ApiError::storage("Failed to list files"))?;

    let validator = Validator::for_files(&listing);
    if validator.is_fresh(&headers) {
        return Ok(validator.not_modified());
    }

    let items: Vec<FileView> = listing.files.iter().map(|f| file_view(&state, f)).collect();
    let mut response = JSend::success(items).into_response();
    validator.apply(response.headers_mut(), state.config.limits.cache_ttl);
    Ok(response)
}

/// Route: DELETE /files/:id
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<DeleteResponse>>, ApiError> {
    let id: u64 = id
        .parse()
        .map_err(|_| ApiError::bad_request("file id must be a positive integer"))?;

    let record = state
        .db
        .delete_file(id)
        .map_err(ApiError::storage("Failed to delete file"))?
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    // The row is gone; the blob is removed best-effort
    match state.object_store.delete(&record.filename).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(file_id = id, filename = %record.filename, "Blob already unlinked");
            log_event(
                &state,
                "file_already_unlinked",
                serde_json::json!({ "file_id": id, "filename": record.filename }),
            );
        }
        Err(e) => {
            tracing::warn!(file_id = id, error = %e, "Failed to delete blob");
        }
    }

    log_event(
        &state,
        "file_deleted",
        serde_json::json!({ "file_id": id, "filename": record.filename }),
    );

    Ok(JSend::success(DeleteResponse {
        message: "Deleted",
        id,
        filename: record.filename,
    }))
}

/// Write the blob under a fresh stored name, then record its metadata.
///
/// A name already taken on disk or in the database is retried with a new
/// suffix. A blob is only ever removed again by the attempt that created it.
async fn store_upload(
    state: &AppState,
    original_name: &str,
    mime_type: String,
    data: Bytes,
    mut next_suffix: impl FnMut() -> Result<String, RandomError>,
) -> Result<FileRecord, ApiError> {
    let filesize = data.len() as u64;

    for attempt in 1..=MAX_NAME_ATTEMPTS {
        let suffix = next_suffix().map_err(|e| {
            tracing::error!(error = %e, "Failed to generate filename suffix");
            ApiError::internal("Failed to store file")
        })?;
        let filename = stored_filename(original_name, &suffix);

        // Blob first, so a committed row always has its bytes on disk
        match state.object_store.put(&filename, data.clone()).await {
            Ok(()) => {}
            Err(ObjectStoreError::AlreadyExists(_)) => {
                tracing::debug!(filename = %filename, attempt, "Stored filename taken on disk");
                continue;
            }
            Err(e) => {
                tracing::error!(filename = %filename, error = %e, "Failed to write blob");
                return Err(ApiError::internal("Failed to store file"));
            }
        }

        let record = FileRecord {
            id: 0,
            filename: filename.clone(),
            original_name: original_name.to_string(),
            filesize,
            mime_type: mime_type.clone(),
            file_path: state.object_store.location(&filename),
            created_at: Utc::now(),
        };

        match state.db.insert_file(record) {
            Ok(record) => return Ok(record),
            Err(e) => {
                if let Err(cleanup) = state.object_store.delete(&filename).await {
                    tracing::warn!(filename = %filename, error = %cleanup, "Failed to remove orphaned blob");
                }
                if let DatabaseError::Conflict(_) = e {
                    tracing::debug!(filename = %filename, attempt, "Stored filename taken in database");
                    continue;
                }
                tracing::error!(filename = %filename, error = %e, "Failed to save file metadata");
                return Err(ApiError::internal("Failed to save file metadata"));
            }
        }
    }

    tracing::error!(original_name, attempts = MAX_NAME_ATTEMPTS, "No free stored filename");
    Err(ApiError::internal("Failed to store file"))
}

// ============================================================================
// Helpers
// ============================================================================

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large("File exceeds maximum upload size")
    } else {
        ApiError::bad_request(format!("Invalid multipart data: {}", e.body_text()))
    }
}

fn too_large(max_upload_size: u64) -> ApiError {
    ApiError::payload_too_large(format!(
        "File too large. Max {} MB",
        max_upload_size / (1024 * 1024)
    ))
}

fn public_url(state: &AppState, filename: &str) -> String {
    format!("{}{}", state.config.storage.public_file_url, filename)
}

fn file_view(state: &AppState, file: &FileRecord) -> FileView {
    let display_type = file
        .mime_type
        .split('/')
        .next()
        .filter(|t| !t.is_empty())
        .unwrap_or("file")
        .to_string();
    let name = if file.original_name.is_empty() {
        file.filename.clone()
    } else {
        file.original_name.clone()
    };

    FileView {
        id: file.id,
        filename: file.filename.clone(),
        original_name: file.original_name.clone(),
        filesize: file.filesize,
        mime_type: file.mime_type.clone(),
        created_at: file.created_at.to_rfc3339(),
        url: public_url(state, &file.filename),
        name,
        size: file.filesize,
        last_modified: file.created_at.timestamp(),
        creation_date: file.created_at.to_rfc3339(),
        display_type,
    }
}

/// Make a client-supplied base name safe for the filesystem.
///
/// Characters outside `[A-Za-z0-9_.-]` and whitespace become `_`, whitespace
/// runs collapse to a single `_`, and leading or trailing `.`, `-`, `_` are
/// trimmed.
pub fn sanitize_filename(base: &str) -> String {
    let mut out = String::with_capacity(base.len());
    let mut in_whitespace = false;
    for c in base.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
            out.push(c);
        } else {
            out.push('_');
        }
    }

    let trimmed = out.trim_matches(|c| matches!(c, '.' | '-' | '_'));
    if trimmed.is_empty() {
        FALLBACK_BASENAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `<sanitized base>-<suffix><.ext>` with the extension lowercased.
pub fn stored_filename(client_name: &str, suffix: &str) -> String {
    // Browsers on some platforms send a full path
    let leaf = client_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(client_name);
    let path = FsPath::new(leaf);

    let base = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(leaf);
    let ext: String = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            e.chars()
                .filter(char::is_ascii_alphanumeric)
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .unwrap_or_default();

    let mut name = format!("{}-{}", sanitize_filename(base), suffix);
    if !ext.is_empty() {
        name.push('.');
        name.push_str(&ext);
    }
    name
}

/// Client type, then the content's magic bytes, then a guess from the
/// name, then a sniff for plain text.
fn detect_mime(client_type: Option<&str>, name: &str, data: &[u8]) -> String {
    if let Some(client) = client_type.filter(|t| !t.is_empty() && *t != OCTET_STREAM) {
        return client.to_string();
    }
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }
    if let Some(guess) = mime_guess::from_path(name).first() {
        return guess.to_string();
    }
    if std::str::from_utf8(data).is_ok() {
        return "text/plain".to_string();
    }
    OCTET_STREAM.to_string()
}
