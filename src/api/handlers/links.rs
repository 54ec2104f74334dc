use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use super::log_event;
use crate::api::response::{ApiError, AppJson, JSend};
use crate::ids::{random_id, LINK_SLUG_BYTES};
use crate::storage::models::LinkRecord;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateLinkRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateLinkResponse {
    pub slug: String,
    pub short_url: String,
    pub long_url: String,
}

#[derive(Debug, Serialize)]
pub struct LinkResponse {
    pub url: String,
    pub views: u64,
}

/// Route: POST /links
pub async fn create_link(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CreateLinkRequest>,
) -> Result<(StatusCode, Json<JSend<CreateLinkResponse>>), ApiError> {
    let raw = req.url.as_deref().map(str::trim).unwrap_or_default();
    let url = parse_target(raw)?;

    let slug = random_id(LINK_SLUG_BYTES).map_err(|e| {
        tracing::error!(error = %e, "Failed to generate link slug");
        ApiError::internal("Failed to create link")
    })?;
    let link = state
        .db
        .create_link(&slug, url.as_str())
        .map_err(ApiError::storage("Failed to create link"))?;

    let short_url = format!(
        "{}/s/{}",
        state.config.node.short_url_base.trim_end_matches('/'),
        link.slug
    );
    log_event(
        &state,
        "link_created",
        serde_json::json!({ "slug": link.slug, "url": link.url }),
    );
    tracing::debug!(slug = %link.slug, "Created short link");

    Ok(JSend::with_status(
        StatusCode::CREATED,
        CreateLinkResponse {
            slug: link.slug,
            short_url,
            long_url: link.url,
        },
    ))
}

/// Route: GET /links/:slug
pub async fn get_link(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<JSend<LinkResponse>>, ApiError> {
    let link = resolve(&state, &slug)?;
    Ok(JSend::success(LinkResponse {
        url: link.url,
        views: link.views,
    }))
}

/// `302 Found` to the target.
/// Route: GET /s/:slug
pub async fn redirect_link(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Response, ApiError> {
    let link = resolve(&state, &slug)?;
    let location = HeaderValue::from_str(&link.url).map_err(|_| {
        tracing::error!(slug = %slug, "Stored link is not a valid header value");
        ApiError::internal("Failed to resolve link")
    })?;
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

/// Only absolute `http`/`https` URLs with a host can be shortened.
fn parse_target(raw: &str) -> Result<Url, ApiError> {
    if raw.is_empty() {
        return Err(ApiError::bad_request("url is required"));
    }
    let url = Url::parse(raw).map_err(|e| ApiError::bad_request(format!("Invalid url: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ApiError::bad_request("url must use http or https"));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ApiError::bad_request("url must have a host"));
    }
    Ok(url)
}

/// Look up a link and count the view. Counting is best-effort.
fn resolve(state: &AppState, slug: &str) -> Result<LinkRecord, ApiError> {
    match state.db.record_link_view(slug) {
        Ok(Some(link)) => Ok(link),
        Ok(None) => Err(ApiError::not_found("Link not found")),
        Err(e) => {
            tracing::warn!(slug = %slug, error = %e, "Failed to count link view");
            state
                .db
                .get_link(slug)
                .map_err(ApiError::storage("Failed to look up link"))?
                .ok_or_else(|| ApiError::not_found("Link not found"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    use crate::api::create_app;
    use crate::testutil::test_state;

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn shorten(url: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/links")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::json!({ "url": url }).to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_parse_target() {
        assert!(parse_target("https://example.com/page").is_ok());
        assert!(parse_target("http://localhost:8080").is_ok());
        assert!(parse_target("").is_err());
        assert!(parse_target("example.com").is_err());
        assert!(parse_target("ftp://example.com/file").is_err());
        assert!(parse_target("javascript:alert(1)").is_err());
    }

    #[tokio::test]
    async fn test_shorten_and_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _) = test_state(&dir);
        let app = create_app(state.clone());

        let response = app
            .clone()
            .oneshot(shorten("https://example.com/page"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        let slug = body["data"]["slug"].as_str().unwrap().to_string();
        assert_eq!(slug.len(), 8);
        assert_eq!(body["data"]["short_url"], format!("https://cut.test/s/{slug}"));
        assert_eq!(body["data"]["long_url"], "https://example.com/page");
        assert_eq!(state.db.get_link(&slug).unwrap().unwrap().views, 0);

        let response = app
            .clone()
            .oneshot(get(&format!("/links/{slug}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["url"], "https://example.com/page");
        assert_eq!(body["data"]["views"], 1);

        let response = app
            .clone()
            .oneshot(get(&format!("/s/{slug}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "https://example.com/page");

        let response = app.oneshot(get(&format!("/?s={slug}"))).await.unwrap();
        assert!(response.status().is_redirection());
        assert_eq!(state.db.get_link(&slug).unwrap().unwrap().views, 3);
    }

    #[tokio::test]
    async fn test_rejects_bad_urls_and_unknown_slugs() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _) = test_state(&dir);
        let app = create_app(state);

        let response = app.clone().oneshot(shorten("not a url")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.clone().oneshot(get("/links/missing")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.oneshot(get("/s/missing")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
