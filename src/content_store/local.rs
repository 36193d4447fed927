use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use super::{safe_extension, ContentStore};
use crate::error::StorageError;

/// Content store backed by a flat directory on local disk.
///
/// Handles are file names relative to the root (`<uuid>.<ext>`). Bytes are
/// written to a temporary sibling, synced, then renamed into place, so a
/// handle never points at a partially written file.
#[derive(Debug, Clone)]
pub struct LocalContentStore {
    root: PathBuf,
}

impl LocalContentStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| io_err(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a handle to a path inside the root.
    ///
    /// Handles are single path components; anything that could escape the
    /// root is rejected.
    fn handle_to_path(&self, handle: &str) -> Result<PathBuf, StorageError> {
        if handle.is_empty()
            || handle.contains('/')
            || handle.contains('\\')
            || handle.contains("..")
            || handle.starts_with('.')
        {
            return Err(StorageError::InvalidHandle(handle.to_string()));
        }
        Ok(self.root.join(handle))
    }
}

fn io_err(path: &Path, source: std::io::Error) -> StorageError {
    if source.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(path.display().to_string())
    } else {
        StorageError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl ContentStore for LocalContentStore {
    async fn put(&self, bytes: &[u8], original_name: &str) -> Result<String, StorageError> {
        let handle = format!("{}{}", Uuid::new_v4(), safe_extension(original_name));
        let path = self.handle_to_path(&handle)?;
        let staging = self.root.join(format!(".{}.part", handle));

        let write = async {
            let mut file = fs::File::create(&staging).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            fs::rename(&staging, &path).await
        };

        if let Err(e) = write.await {
            let _ = fs::remove_file(&staging).await;
            return Err(StorageError::Io {
                path: path.display().to_string(),
                source: e,
            });
        }

        tracing::debug!(
            handle = %handle,
            size_bytes = bytes.len(),
            "stored upload"
        );

        Ok(handle)
    }

    async fn get(&self, handle: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.handle_to_path(handle)?;
        fs::read(&path).await.map_err(|e| io_err(&path, e))
    }

    async fn read_prefix(&self, handle: &str, len: usize) -> Result<Vec<u8>, StorageError> {
        let path = self.handle_to_path(handle)?;
        let file = fs::File::open(&path).await.map_err(|e| io_err(&path, e))?;

        let mut buf = Vec::with_capacity(len);
        file.take(len as u64)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| io_err(&path, e))?;
        Ok(buf)
    }

    async fn delete(&self, handle: &str) -> Result<(), StorageError> {
        let path = self.handle_to_path(handle)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&path, e)),
        }
    }
}
