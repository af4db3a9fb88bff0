//! Named binary objects, one namespace per user.

use super::StorageError;
use crate::vault::FileMeta;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Streaming handle to an object's bytes.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Prepare storage for a new user. Idempotent.
    async fn create_namespace(&self, user_id: &str) -> Result<(), StorageError>;
    /// Store `data` under `name`, replacing any previous object.
    async fn put(&self, user_id: &str, name: &str, data: Bytes) -> Result<FileMeta, StorageError>;
    async fn get(&self, user_id: &str, name: &str) -> Result<ObjectReader, StorageError>;
    async fn list(&self, user_id: &str) -> Result<Vec<FileMeta>, StorageError>;
    async fn delete(&self, user_id: &str, name: &str) -> Result<(), StorageError>;
}

/// Objects as plain files under `<root>/<user_id>/<name>`.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace(&self, user_id: &str) -> Result<PathBuf, StorageError> {
        validate_name(user_id)?;
        Ok(self.root.join(user_id))
    }

    fn object_path(&self, user_id: &str, name: &str) -> Result<PathBuf, StorageError> {
        validate_name(name)?;
        Ok(self.namespace(user_id)?.join(name))
    }
}

/// A name must be one plain path component that is not hidden.
pub fn validate_name(name: &str) -> Result<(), StorageError> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0'])
        || name.len() > 255;
    if invalid {
        return Err(StorageError::InvalidName(name.to_owned()));
    }
    Ok(())
}

fn not_found_as(err: std::io::Error) -> StorageError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound
    } else {
        StorageError::Io(err)
    }
}

fn modified_at(meta: &std::fs::Metadata) -> DateTime<Utc> {
    meta.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn create_namespace(&self, user_id: &str) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(self.namespace(user_id)?).await?;
        Ok(())
    }

    async fn put(&self, user_id: &str, name: &str, data: Bytes) -> Result<FileMeta, StorageError> {
        let path = self.object_path(user_id, name)?;
        let dir = self.namespace(user_id)?;
        tokio::fs::create_dir_all(&dir).await?;

        // Write aside, then rename, so readers never see a partial object.
        let staging = dir.join(format!(".upload-{}", uuid::Uuid::new_v4()));
        let committed = match tokio::fs::write(&staging, &data).await {
            Ok(()) => tokio::fs::rename(&staging, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = committed {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }

        let meta = tokio::fs::metadata(&path).await?;
        Ok(FileMeta {
            name: name.to_owned(),
            size: meta.len(),
            uploaded_at: modified_at(&meta),
        })
    }

    async fn get(&self, user_id: &str, name: &str) -> Result<ObjectReader, StorageError> {
        let path = self.object_path(user_id, name)?;
        let file = tokio::fs::File::open(&path).await.map_err(not_found_as)?;
        Ok(Box::pin(file))
    }

    async fn list(&self, user_id: &str) -> Result<Vec<FileMeta>, StorageError> {
        let dir = self.namespace(user_id)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            files.push(FileMeta {
                name,
                size: meta.len(),
                uploaded_at: modified_at(&meta),
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn delete(&self, user_id: &str, name: &str) -> Result<(), StorageError> {
        let path = self.object_path(user_id, name)?;
        tokio::fs::remove_file(&path).await.map_err(not_found_as)
    }
}
