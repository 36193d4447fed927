//! Upload ingestion with content-addressed deduplication.
//!
//! Flow for one upload: hash → look up by digest → (duplicate) return the
//! existing row, or (new) store the bytes and insert a row. The lookup and
//! the insert are not atomic, so two identical uploads can both miss the
//! lookup. The record store's unique digest constraint decides the winner;
//! the loser deletes the blob it just wrote and answers as a duplicate.

use std::sync::Arc;

use crate::content_store::ContentStore;
use crate::error::{ReceiptError, Result, StoreError};
use crate::hash::content_digest;
use crate::models::{IngestResult, NewReceiptFile};
use crate::record_store::RecordStore;

pub struct Ingestor {
    records: Arc<dyn RecordStore>,
    content: Arc<dyn ContentStore>,
}

impl Ingestor {
    pub fn new(records: Arc<dyn RecordStore>, content: Arc<dyn ContentStore>) -> Self {
        Self { records, content }
    }

    /// Store `bytes` unless identical content already exists.
    pub async fn ingest(&self, bytes: &[u8], original_name: &str) -> Result<IngestResult> {
        if bytes.is_empty() {
            return Err(ReceiptError::InvalidInput("File is required".to_string()));
        }

        let file_hash = content_digest(bytes);

        if let Some(existing) = self.records.find_file_by_hash(&file_hash).await? {
            tracing::info!(
                id = %existing.id,
                file_hash = %file_hash,
                "duplicate upload; returning existing record"
            );
            return Ok(IngestResult::duplicate(existing));
        }

        let file_path = self.content.put(bytes, original_name).await?;

        let new = NewReceiptFile {
            file_name: original_name.to_string(),
            file_path: file_path.clone(),
            file_hash: file_hash.clone(),
        };

        match self.records.create_file(&new).await {
            Ok(record) => {
                tracing::info!(
                    id = %record.id,
                    file_hash = %file_hash,
                    size_bytes = bytes.len(),
                    "stored new receipt file"
                );
                Ok(IngestResult::created(record))
            }
            Err(StoreError::Conflict(detail)) => {
                tracing::debug!(file_hash = %file_hash, %detail, "lost ingest race");
                self.discard(&file_path).await;
                let existing = self
                    .records
                    .find_file_by_hash(&file_hash)
                    .await?
                    .ok_or(StoreError::Conflict(detail))?;
                Ok(IngestResult::duplicate(existing))
            }
            Err(e) => {
                self.discard(&file_path).await;
                Err(e.into())
            }
        }
    }

    /// Best-effort removal of a blob that no row will reference.
    async fn discard(&self, file_path: &str) {
        if let Err(e) = self.content.delete(file_path).await {
            tracing::warn!(file_path, error = %e, "failed to remove orphaned upload");
        }
    }
}
