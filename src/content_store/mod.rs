//! Durable storage for uploaded bytes.
//!
//! The [`ContentStore`] trait is the only way the pipeline touches file
//! bytes. A store hands back an opaque location handle from
//! [`put`](ContentStore::put); every later access goes through that handle.
//!
//! | Implementation | Purpose |
//! |----------------|---------|
//! | [`LocalContentStore`] | Files under a root directory on local disk |
//! | [`InMemoryContentStore`] | Tests |

pub mod local;
pub mod memory;

use async_trait::async_trait;

use crate::error::StorageError;

pub use local::LocalContentStore;
pub use memory::InMemoryContentStore;

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Durably write `bytes` and return a location handle.
    ///
    /// `original_name` is only used to pick a file extension.
    async fn put(&self, bytes: &[u8], original_name: &str) -> Result<String, StorageError>;

    /// Read the full content behind a handle.
    async fn get(&self, handle: &str) -> Result<Vec<u8>, StorageError>;

    /// Read at most `len` leading bytes. May return fewer if the content is shorter.
    async fn read_prefix(&self, handle: &str, len: usize) -> Result<Vec<u8>, StorageError>;

    /// Remove the content behind a handle. Deleting a missing handle is not an error.
    async fn delete(&self, handle: &str) -> Result<(), StorageError>;
}

/// Returns a short, lowercase, alphanumeric extension (with leading dot)
/// taken from an untrusted file name, or an empty string.
pub(crate) fn safe_extension(original_name: &str) -> String {
    let ext = std::path::Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return String::new();
    }
    format!(".{}", ext.to_ascii_lowercase())
}
