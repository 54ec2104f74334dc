mod local;

pub use local::LocalStore;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("Object already exists: {0}")]
    AlreadyExists(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
    #[error("Object not found: {0}")]
    NotFound(String),
}

/// Abstraction over blob storage for uploaded files.
/// Keys are stored filenames; metadata lives in the database.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write a new blob so that it is complete and durable once this returns.
    /// Never replaces an existing key; that is `AlreadyExists`.
    async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError>;
    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError>;
    /// Remove the blob. Returns false when there was nothing to remove.
    async fn delete(&self, key: &str) -> Result<bool, ObjectStoreError>;
    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError>;
    /// Where the blob for `key` lives, recorded alongside the metadata.
    fn location(&self, key: &str) -> String;
}
