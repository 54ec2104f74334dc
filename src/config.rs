use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
    #[error("Failed to prepare webhook secret: {0}")]
    Secret(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub github: GitHubConfig,
    pub limits: LimitsConfig,
    pub node: NodeConfig,
    pub notify: NotifyConfig,
    pub storage: StorageConfig,
    /// Enables dangerous operations like purge. Must never be true in production.
    pub test_mode: bool,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub data_dir: String,
    /// Base used when building `short_url` for new links (e.g. `https://cut.ia.br`)
    pub short_url_base: String,
    /// Domain suffix for VTODO UIDs
    pub ics_uid_domain: String,
}

#[derive(Debug, Clone)]
pub struct LimitsConfig {
    /// `max-age` sent with cacheable board and file listings (seconds)
    pub cache_ttl: u64,
    /// Events retained by the event bus before the oldest are dropped
    pub event_log_capacity: u64,
    pub max_text_length: usize,
    pub max_title_length: usize,
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding uploaded blobs
    pub upload_dir: String,
    /// Prefix for public file URLs; the stored filename is appended
    pub public_file_url: String,
}

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub api_url: String,
    pub repo: String,
    pub token: Option<String>,
    pub workflow_id: String,
}

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Receives `{board, task_id}` after a task is published
    pub engine_webhook_url: Option<String>,
    /// Receives `{source, type, url, filename, size, timestamp}` after an upload
    pub cut_webhook_url: Option<String>,
    /// Base URL of a tasks API that accepts `{op: "add"}` for the inbox board
    pub tasks_api_url: Option<String>,
    pub webhook_secret: String,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            cache_ttl: 3600,
            event_log_capacity: 10_000,
            max_text_length: 10_000,
            max_title_length: 200,
            max_upload_size: 500 * 1024 * 1024,
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            repo: "ib-bsb-br/ib-bsb-br.github.io".to_string(),
            token: None,
            workflow_id: "refresh-content.yml".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: "./storage".to_string(),
            public_file_url: "/static/".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let short_url_base = std::env::var("SHORT_URL_BASE").unwrap_or_default();
        let ics_uid_domain =
            std::env::var("ICS_UID_DOMAIN").unwrap_or_else(|_| "pkm-hub".to_string());

        let test_mode = std::env::var("TEST_MODE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let defaults = LimitsConfig::default();
        let limits = LimitsConfig {
            cache_ttl: env_parse("CACHE_TTL").unwrap_or(defaults.cache_ttl),
            event_log_capacity: env_parse("EVENT_LOG_CAPACITY")
                .unwrap_or(defaults.event_log_capacity),
            max_text_length: env_parse("MAX_TEXT_LENGTH").unwrap_or(defaults.max_text_length),
            max_title_length: env_parse("MAX_TITLE_LENGTH").unwrap_or(defaults.max_title_length),
            max_upload_size: env_parse("MAX_UPLOAD_SIZE").unwrap_or(defaults.max_upload_size),
        };

        let storage = StorageConfig {
            upload_dir: std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./storage".to_string()),
            public_file_url: std::env::var("FILE_PUBLIC_URL")
                .unwrap_or_else(|_| "/static/".to_string()),
        };

        let github_defaults = GitHubConfig::default();
        let github = GitHubConfig {
            api_url: std::env::var("GITHUB_API_URL").unwrap_or(github_defaults.api_url),
            repo: std::env::var("GITHUB_REPO").unwrap_or(github_defaults.repo),
            token: env_non_empty("GITHUB_TOKEN"),
            workflow_id: std::env::var("GITHUB_WORKFLOW_ID")
                .unwrap_or(github_defaults.workflow_id),
        };

        let webhook_secret = match env_non_empty("WEBHOOK_SECRET") {
            Some(secret) => secret,
            None => load_or_create_secret(&data_dir)?,
        };

        let notify = NotifyConfig {
            engine_webhook_url: env_non_empty("ENGINE_WEBHOOK_URL"),
            cut_webhook_url: env_non_empty("CUT_WEBHOOK_URL"),
            tasks_api_url: env_non_empty("TASKS_API_URL"),
            webhook_secret,
        };

        let config = Config {
            github,
            limits,
            node: NodeConfig {
                bind_address,
                data_dir,
                short_url_base,
                ics_uid_domain,
            },
            notify,
            storage,
            test_mode,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_upload_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_UPLOAD_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.limits.max_text_length == 0 || self.limits.max_title_length == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_TEXT_LENGTH and MAX_TITLE_LENGTH must be greater than 0".to_string(),
            ));
        }

        if self.limits.event_log_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "EVENT_LOG_CAPACITY must be greater than 0".to_string(),
            ));
        }

        if !self.github.repo.contains('/') {
            return Err(ConfigError::ValidationError(format!(
                "GITHUB_REPO must look like owner/repo, got '{}'",
                self.github.repo
            )));
        }

        if self.github.token.is_none() {
            tracing::warn!("GITHUB_TOKEN is not set. Workflow dispatch and note publishing are disabled.");
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Reuse the secret persisted in `data_dir`, generating one on first start.
fn load_or_create_secret(data_dir: &str) -> Result<String, ConfigError> {
    let path = Path::new(data_dir).join("webhook_secret.txt");
    if let Ok(existing) = std::fs::read_to_string(&path) {
        let existing = existing.trim();
        if !existing.is_empty() {
            return Ok(existing.to_string());
        }
    }

    std::fs::create_dir_all(data_dir)?;
    let secret = uuid::Uuid::new_v4().simple().to_string();
    std::fs::write(&path, &secret)?;
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_is_persisted_between_loads() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let data_dir = data_dir.to_string_lossy();

        let first = load_or_create_secret(&data_dir).unwrap();
        let second = load_or_create_secret(&data_dir).unwrap();

        assert_eq!(first.len(), 32);
        assert_eq!(first, second);
    }

    #[test]
    fn test_default_limits() {
        let limits = LimitsConfig::default();
        assert_eq!(limits.max_text_length, 10_000);
        assert_eq!(limits.max_title_length, 200);
        assert_eq!(limits.max_upload_size, 500 * 1024 * 1024);
    }
}
