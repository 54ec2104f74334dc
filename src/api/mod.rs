pub mod conditional;
mod handlers;
pub mod legacy;
pub mod response;
mod routes;

use std::sync::Arc;

use axum::extract::Request;
use axum::Router;
use tower::util::{MapRequest, MapRequestLayer};
use tower::Layer;

pub use routes::create_router;

use crate::AppState;

/// The router behind the legacy `?q=` rewrite.
pub type App = MapRequest<Router, fn(Request) -> Request>;

/// Build the full service. The rewrite has to run before routing, so it
/// wraps the router instead of being one of its layers.
pub fn create_app(state: Arc<AppState>) -> App {
    let rewrite: fn(Request) -> Request = legacy::rewrite_legacy_query;
    MapRequestLayer::new(rewrite).layer(create_router(state))
}
