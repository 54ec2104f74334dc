//! Conditional GET: strong ETag validators plus Last-Modified.

use std::time::SystemTime;

use axum::http::header::{
    HeaderMap, HeaderValue, CACHE_CONTROL, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use ring::digest;

use crate::storage::models::{BoardSnapshot, FileListing};

/// Validator pair for one representation of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validator {
    /// Quoted strong entity tag
    etag: String,
    last_modified: Option<DateTime<Utc>>,
}

impl Validator {
    fn from_fingerprint(fingerprint: &str, last_modified: Option<DateTime<Utc>>) -> Self {
        let hash = digest::digest(&digest::SHA256, fingerprint.as_bytes());
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hash.as_ref());
        Self {
            etag: format!("\"{token}\""),
            last_modified,
        }
    }

    /// Derived from the board's `updated_at`, the newest task update and the task count.
    pub fn for_board(snapshot: &BoardSnapshot) -> Self {
        let last_task = snapshot
            .last_task_update()
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Nanos, true))
            .unwrap_or_default();
        let fingerprint = format!(
            "{}|{}|{}",
            snapshot
                .board
                .updated_at
                .to_rfc3339_opts(SecondsFormat::Nanos, true),
            last_task,
            snapshot.tasks.len()
        );
        Self::from_fingerprint(&fingerprint, Some(snapshot.board.updated_at))
    }

    /// Derived from the listing revision, file count and total size.
    ///
    /// Deletes can move the newest timestamp backwards, so file listings
    /// carry no Last-Modified and are validated by ETag alone.
    pub fn for_files(listing: &FileListing) -> Self {
        let total_size: u64 = listing.files.iter().map(|f| f.filesize).sum();
        let fingerprint = format!(
            "{}:{}:{}",
            listing.revision,
            listing.files.len(),
            total_size
        );
        Self::from_fingerprint(&fingerprint, None)
    }

    pub fn etag(&self) -> &str {
        &self.etag
    }

    /// True when the client's cached copy is still current.
    ///
    /// `If-None-Match` wins when present; `If-Modified-Since` is consulted only
    /// without it, at the one-second precision of HTTP dates.
    pub fn is_fresh(&self, headers: &HeaderMap) -> bool {
        if let Some(value) = headers.get(IF_NONE_MATCH) {
            let Ok(value) = value.to_str() else {
                return false;
            };
            return value.split(',').map(str::trim).any(|candidate| {
                candidate == "*"
                    || candidate.strip_prefix("W/").unwrap_or(candidate) == self.etag
            });
        }

        match (headers.get(IF_MODIFIED_SINCE), self.last_modified) {
            (Some(value), Some(last_modified)) => value
                .to_str()
                .ok()
                .and_then(|s| httpdate::parse_http_date(s).ok())
                .map(|since| DateTime::<Utc>::from(since).timestamp() >= last_modified.timestamp())
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Attach `ETag`, `Last-Modified` and a private cache lifetime.
    pub fn apply(&self, headers: &mut HeaderMap, cache_ttl: u64) {
        self.apply_validators(headers);
        if let Ok(value) = HeaderValue::from_str(&format!("private, max-age={cache_ttl}")) {
            headers.insert(CACHE_CONTROL, value);
        }
    }

    fn apply_validators(&self, headers: &mut HeaderMap) {
        if let Ok(value) = HeaderValue::from_str(&self.etag) {
            headers.insert(ETAG, value);
        }
        if let Some(last_modified) = self.last_modified {
            let formatted = httpdate::fmt_http_date(SystemTime::from(last_modified));
            if let Ok(value) = HeaderValue::from_str(&formatted) {
                headers.insert(LAST_MODIFIED, value);
            }
        }
    }

    /// Empty `304 Not Modified` carrying the validators.
    pub fn not_modified(&self) -> Response {
        let mut response = StatusCode::NOT_MODIFIED.into_response();
        self.apply_validators(response.headers_mut());
        response
    }
}
