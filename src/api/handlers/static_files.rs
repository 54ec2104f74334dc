use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use mime_guess::mime::{self, Mime};
use std::sync::Arc;

use crate::api::response::ApiError;
use crate::object_store::ObjectStoreError;
use crate::AppState;

/// Serve a stored blob by its unique filename.
/// Route: GET /static/:filename
pub async fn serve_static(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let file = state
        .db
        .get_file_by_name(&filename)
        .map_err(ApiError::storage("Failed to look up file"))?
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    let data = state
        .object_store
        .get(&file.filename)
        .await
        .map_err(|e| match e {
            ObjectStoreError::NotFound(_) => ApiError::not_found("File content not found"),
            _ => {
                tracing::error!(file_id = file.id, error = %e, "Failed to read blob");
                ApiError::internal("Failed to retrieve file")
            }
        })?;

    let content_type = served_type(&file.filename);
    let disposition = if renders_safely(&content_type) {
        "inline"
    } else {
        "attachment"
    };

    let mut response = (StatusCode::OK, data).into_response();
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type.as_ref())
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(file.filesize));
    if let Ok(value) = HeaderValue::from_str(&format!("{disposition}; filename=\"{}\"", file.filename)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("sandbox"),
    );
    // Stored names carry a random suffix, so a name never points at new bytes
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    Ok(response)
}

/// Type for a stored blob, from its (sanitized, lowercased) extension.
/// The type the client sent at upload time is never echoed back.
fn served_type(filename: &str) -> Mime {
    mime_guess::from_path(filename).first_or_octet_stream()
}

/// Raster images, PDF and plain text display inline; everything else downloads.
fn renders_safely(content_type: &Mime) -> bool {
    let (top, sub) = (content_type.type_(), content_type.subtype());
    if top == mime::IMAGE {
        return sub != mime::SVG;
    }
    (top == mime::APPLICATION && sub == mime::PDF) || (top == mime::TEXT && sub == mime::PLAIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use bytes::Bytes;
    use chrono::Utc;
    use tower::ServiceExt;

    use crate::api::create_app;
    use crate::storage::models::FileRecord;
    use crate::testutil::test_state;

    async fn store(state: &AppState, filename: &str, mime_type: &str, data: &'static [u8]) {
        state
            .object_store
            .put(filename, Bytes::from_static(data))
            .await
            .unwrap();
        state
            .db
            .insert_file(FileRecord {
                id: 0,
                filename: filename.into(),
                original_name: filename.into(),
                filesize: data.len() as u64,
                mime_type: mime_type.into(),
                file_path: state.object_store.location(filename),
                created_at: Utc::now(),
            })
            .unwrap();
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_inline_allowlist() {
        assert!(renders_safely(&served_type("photo-x.png")));
        assert!(renders_safely(&served_type("doc-x.pdf")));
        assert!(renders_safely(&served_type("notes-x.txt")));
        assert!(!renders_safely(&served_type("logo-x.svg")));
        assert!(!renders_safely(&served_type("page-x.html")));
        assert!(!renders_safely(&served_type("README-x")));
    }

    #[tokio::test]
    async fn test_serves_blob_by_stored_name() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _) = test_state(&dir);
        store(&state, "photo-abc.png", "image/png", b"\x89PNG").await;

        let app = create_app(state);
        let response = app.clone().oneshot(get("/static/photo-abc.png")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "inline; filename=\"photo-abc.png\""
        );
        assert_eq!(response.headers()[header::CONTENT_SECURITY_POLICY], "sandbox");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"\x89PNG");

        let response = app.oneshot(get("/static/missing.txt")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_markup_is_downloaded_not_rendered() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _) = test_state(&dir);
        store(&state, "page-abc.html", "text/html", b"<script>alert(1)</script>").await;
        store(&state, "logo-abc.svg", "image/svg+xml", b"<svg onload=alert(1)/>").await;

        let app = create_app(state);
        for (uri, expected_type) in [
            ("/static/page-abc.html", "text/html"),
            ("/static/logo-abc.svg", "image/svg+xml"),
        ] {
            let response = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.headers()[header::CONTENT_TYPE], expected_type);
            let disposition = response.headers()[header::CONTENT_DISPOSITION]
                .to_str()
                .unwrap();
            assert!(disposition.starts_with("attachment;"), "{uri}: {disposition}");
            assert_eq!(response.headers()[header::CONTENT_SECURITY_POLICY], "sandbox");
        }
    }

    #[tokio::test]
    async fn test_uploaded_type_is_not_echoed() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _) = test_state(&dir);
        let app = create_app(state);

        let boundary = "staticboundary";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"fileToUpload\"; filename=\"notes.txt\"\r\n\
             Content-Type: text/html\r\n\r\n<script>alert(document.cookie)</script>\r\n--{boundary}--\r\n"
        );
        let upload = Request::builder()
            .method(Method::POST)
            .uri("/files")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();
        let response = app.clone().oneshot(upload).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let created: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let url = created["data"]["url"].as_str().unwrap().to_string();

        let response = app.oneshot(get(&url)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(response.headers()[header::CONTENT_SECURITY_POLICY], "sandbox");
        assert_eq!(
            response.headers()[header::X_CONTENT_TYPE_OPTIONS],
            "nosniff"
        );
    }
}
