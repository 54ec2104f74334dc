use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::{ObjectStore, ObjectStoreError};

/// Filesystem object store rooted at the upload directory.
pub struct LocalStore {
    base_path: PathBuf,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        if key.is_empty()
            || key.starts_with('.')
            || key.contains('/')
            || key.contains('\\')
            || key.contains('\0')
        {
            return Err(ObjectStoreError::InvalidKey(key.to_string()));
        }
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError> {
        let path = self.object_path(key)?;
        if tokio::fs::try_exists(&path).await? {
            return Err(ObjectStoreError::AlreadyExists(key.to_string()));
        }

        // Staged under a unique dot-name so a partial write is never visible under `key`
        let staging = self
            .base_path
            .join(format!(".{key}.{}.part", uuid::Uuid::new_v4().simple()));

        let mut file = tokio::fs::File::create(&staging).await?;
        let written = async {
            file.write_all(&data).await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }

        // A hard link fails instead of clobbering when another writer got there first
        let linked = tokio::fs::hard_link(&staging, &path).await;
        let _ = tokio::fs::remove_file(&staging).await;
        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(ObjectStoreError::AlreadyExists(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let path = self.object_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, ObjectStoreError> {
        let path = self.object_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        let path = self.object_path(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    fn location(&self, key: &str) -> String {
        self.base_path.join(key).to_string_lossy().to_string()
    }
}
