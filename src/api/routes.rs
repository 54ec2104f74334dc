use std::any::Any;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::response::ApiError;
use crate::AppState;

/// Room for multipart boundaries and the small text fields around the file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.limits.max_upload_size as usize + MULTIPART_OVERHEAD;

    let mut router = Router::new()
        // Boards
        .route(
            "/tasks/:slug",
            get(handlers::get_board).post(handlers::post_task_op),
        )
        .route("/tasks/:slug/calendar.ics", get(handlers::calendar))
        .route("/tasks/:slug/quick-add", get(handlers::quick_add))
        .route("/calendar", get(handlers::calendar_query))
        .route("/published", get(handlers::published))
        .route("/inbox/items", post(handlers::inbox_item))
        // Files
        .route(
            "/files",
            get(handlers::list_files)
                .post(handlers::create_file)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/files/:id", delete(handlers::delete_file))
        .route("/static/:filename", get(handlers::serve_static))
        // Links
        .route("/links", post(handlers::create_link))
        .route("/links/:slug", get(handlers::get_link))
        .route("/s/:slug", get(handlers::redirect_link))
        // Notes and events
        .route("/notes", post(handlers::publish_note))
        .route(
            "/events",
            get(handlers::tail_events).post(handlers::emit_event),
        )
        // Internal
        .route("/_internal/health", get(handlers::health));

    // Test-only routes
    if state.config.test_mode {
        tracing::warn!("Test mode enabled, purge route is available.");
        router = router.route("/admin/purge", delete(handlers::admin_purge));
    }

    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(middleware::from_fn(strict_transport))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([header::ETAG, header::LAST_MODIFIED])
}

/// HSTS for requests that reached us over TLS, directly or via a proxy.
async fn strict_transport(request: Request, next: Next) -> Response {
    let secure = request.uri().scheme_str() == Some("https")
        || request
            .headers()
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|proto| proto.eq_ignore_ascii_case("https"));

    let mut response = next.run(request).await;
    if secure {
        response.headers_mut().insert(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }
    response
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };
    tracing::error!(panic = %detail, "Handler panicked");

    ApiError::internal("Internal server error").into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    use crate::api::create_app;
    use crate::testutil::test_state;

    #[tokio::test]
    async fn test_security_headers() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _) = test_state(&dir);
        let app = create_app(state);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/_internal/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let headers = response.headers();
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
        assert_eq!(headers[header::X_XSS_PROTECTION], "1; mode=block");
        assert!(headers.get(header::STRICT_TRANSPORT_SECURITY).is_none());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/_internal/health")
                    .header("x-forwarded-proto", "https")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::STRICT_TRANSPORT_SECURITY],
            "max-age=31536000; includeSubDomains"
        );
    }
}
