//! pkm-hub - one JSON API for a small personal knowledge system
//!
//! This crate provides:
//! - Shared task boards with optimistic reordering and ETag-guarded reads
//! - File drop with durable blob writes and metadata in redb
//! - A URL shortener, an ICS feed per board and a bounded event bus
//! - Markdown note publishing to GitHub and best-effort webhooks

pub mod api;
pub mod config;
pub mod dispatcher;
pub mod github;
pub mod ics;
pub mod ids;
pub mod notes;
pub mod notify;
pub mod object_store;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use config::Config;
use dispatcher::TaskDispatcher;
use github::GitHubClient;
use notify::Notifier;
use storage::Database;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub dispatcher: TaskDispatcher,
    /// Present only when a GitHub token is configured
    pub github: Option<GitHubClient>,
    pub notifier: Arc<dyn Notifier>,
    pub object_store: Arc<dyn object_store::ObjectStore>,
}
