//! Rewrites legacy `/?q=<resource>/<id>` and `/?s=<slug>` URLs onto path routes.

use axum::extract::Request;
use axum::http::Uri;

const LEGACY_ENTRYPOINTS: [&str; 3] = ["/", "/api", "/api/"];

/// Turn `/?q=tasks/demo&x=1` (or `/api?q=...`) into `/tasks/demo?x=1`.
/// Anything else passes through untouched.
pub fn rewrite_legacy_query(mut req: Request) -> Request {
    if let Some(uri) = legacy_target(req.uri()) {
        *req.uri_mut() = uri;
    }
    req
}

fn legacy_target(uri: &Uri) -> Option<Uri> {
    if !LEGACY_ENTRYPOINTS.contains(&uri.path()) {
        return None;
    }
    let query = uri.query()?;

    let mut route = None;
    let mut rest = Vec::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        match pair.strip_prefix("q=") {
            Some(value) if route.is_none() => route = Some(value.trim_matches('/').to_string()),
            _ => rest.push(pair),
        }
    }

    // Short links were once shared as `/?s=<slug>`
    if route.is_none() {
        let position = rest.iter().position(|p| p.starts_with("s="))?;
        let slug = &rest.remove(position)[2..];
        if !is_short_slug(slug) {
            return None;
        }
        route = Some(format!("s/{slug}"));
    }

    let route = route?;
    if route.is_empty() || route.contains("..") {
        return None;
    }

    let mut target = format!("/{route}");
    if !rest.is_empty() {
        target.push('?');
        target.push_str(&rest.join("&"));
    }
    target.parse().ok()
}

fn is_short_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(uri: &str) -> String {
        let req = Request::builder()
            .uri(uri)
            .body(axum::body::Body::empty())
            .unwrap();
        rewrite_legacy_query(req).uri().to_string()
    }

    #[test]
    fn test_rewrites_root_and_api() {
        assert_eq!(rewrite("/?q=tasks/demo"), "/tasks/demo");
        assert_eq!(rewrite("/api?q=links/abc"), "/links/abc");
        assert_eq!(rewrite("/api/?q=/files/"), "/files");
    }

    #[test]
    fn test_keeps_other_params() {
        assert_eq!(rewrite("/?b=team&q=calendar"), "/calendar?b=team");
        assert_eq!(rewrite("/?q=events&n=5"), "/events?n=5");
    }

    #[test]
    fn test_short_link_query() {
        assert_eq!(rewrite("/?s=AbC-12_x"), "/s/AbC-12_x");
        assert_eq!(rewrite("/?s=bad/slug"), "/?s=bad/slug");
        assert_eq!(rewrite("/?q=links/abc&s=zzz"), "/links/abc?s=zzz");
    }

    #[test]
    fn test_leaves_other_requests_alone() {
        assert_eq!(rewrite("/tasks/demo?q=x"), "/tasks/demo?q=x");
        assert_eq!(rewrite("/"), "/");
        assert_eq!(rewrite("/?x=1"), "/?x=1");
        assert_eq!(rewrite("/?q="), "/?q=");
        assert_eq!(rewrite("/?q=../etc"), "/?q=../etc");
    }
}
