//! Shared test helpers for pkm-hub unit tests.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{
    Config, GitHubConfig, LimitsConfig, NodeConfig, NotifyConfig, StorageConfig,
};
use crate::dispatcher::TaskDispatcher;
use crate::github::GitHubClient;
use crate::notify::{Notification, Notifier, NotifyError};
use crate::object_store::LocalStore;
use crate::storage::Database;
use crate::AppState;

/// Configuration rooted at `root`, with every outbound integration disabled.
pub fn test_config(root: &Path) -> Config {
    Config {
        github: GitHubConfig::default(),
        limits: LimitsConfig {
            max_upload_size: 1024 * 1024, // 1MB for tests
            ..Default::default()
        },
        node: NodeConfig {
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: root.join("data").to_string_lossy().to_string(),
            short_url_base: "https://cut.test".to_string(),
            ics_uid_domain: "pkm.test".to_string(),
        },
        notify: NotifyConfig {
            engine_webhook_url: None,
            cut_webhook_url: None,
            tasks_api_url: None,
            webhook_secret: "test-secret".to_string(),
        },
        storage: StorageConfig {
            upload_dir: root.join("storage").to_string_lossy().to_string(),
            public_file_url: "/static/".to_string(),
        },
        test_mode: true,
    }
}

/// Records notifications instead of sending them.
#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn recorded(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }

    /// Wait until at least `n` notifications arrived (or give up after a second).
    pub async fn wait_for(&self, n: usize) -> Vec<Notification> {
        for _ in 0..100 {
            let seen = self.recorded();
            if seen.len() >= n {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.recorded()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.seen.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Create a test AppState with a temporary database and local object store.
pub fn test_state(temp_dir: &tempfile::TempDir) -> (Arc<AppState>, Arc<RecordingNotifier>) {
    test_state_with(test_config(temp_dir.path()))
}

pub fn test_state_with(config: Config) -> (Arc<AppState>, Arc<RecordingNotifier>) {
    let db = Database::open(&config.node.data_dir)
        .expect("Failed to open test database")
        .with_event_capacity(config.limits.event_log_capacity);
    let object_store =
        LocalStore::new(&config.storage.upload_dir).expect("Failed to create test object store");

    let recorder = Arc::new(RecordingNotifier::default());
    let notifier: Arc<dyn Notifier> = recorder.clone();
    let dispatcher = TaskDispatcher::new(db.clone(), &config, Arc::clone(&notifier));
    let github = config
        .github
        .token
        .as_deref()
        .map(|token| GitHubClient::new(&config.github.api_url, token))
        .transpose()
        .expect("Failed to create test GitHub client");

    let state = Arc::new(AppState {
        config,
        db,
        dispatcher,
        github,
        notifier,
        object_store: Arc::new(object_store),
    });
    (state, recorder)
}
