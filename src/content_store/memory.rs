//! In-memory [`ContentStore`] for tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use super::{safe_extension, ContentStore};
use crate::error::StorageError;

#[derive(Default)]
pub struct InMemoryContentStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the bytes behind an existing handle.
    pub fn overwrite(&self, handle: &str, bytes: &[u8]) {
        self.blobs
            .write()
            .unwrap()
            .insert(handle.to_string(), bytes.to_vec());
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn put(&self, bytes: &[u8], original_name: &str) -> Result<String, StorageError> {
        let handle = format!("{}{}", Uuid::new_v4(), safe_extension(original_name));
        self.blobs
            .write()
            .unwrap()
            .insert(handle.clone(), bytes.to_vec());
        Ok(handle)
    }

    async fn get(&self, handle: &str) -> Result<Vec<u8>, StorageError> {
        self.blobs
            .read()
            .unwrap()
            .get(handle)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(handle.to_string()))
    }

    async fn read_prefix(&self, handle: &str, len: usize) -> Result<Vec<u8>, StorageError> {
        let blobs = self.blobs.read().unwrap();
        let bytes = blobs
            .get(handle)
            .ok_or_else(|| StorageError::NotFound(handle.to_string()))?;
        Ok(bytes[..len.min(bytes.len())].to_vec())
    }

    async fn delete(&self, handle: &str) -> Result<(), StorageError> {
        self.blobs.write().unwrap().remove(handle);
        Ok(())
    }
}
