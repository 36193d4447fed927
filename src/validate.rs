//! Structural integrity check for stored receipts.
//!
//! Validation reads only the leading magic bytes. It is a cheap gate in
//! front of extraction, not a PDF parser. Read failures are a validation
//! fact about the file, so they end up in `is_valid`/`invalid_reason`
//! rather than as an error to the caller.

use std::sync::Arc;

use crate::content_store::ContentStore;
use crate::error::{ReceiptError, Result};
use crate::models::ReceiptFile;
use crate::record_store::RecordStore;

/// Leading bytes of every PDF document.
pub const PDF_MAGIC: &[u8; 4] = b"%PDF";

pub const REASON_SIGNATURE: &str = "Invalid file signature. Not a PDF.";
pub const REASON_UNREADABLE: &str = "File corrupted or missing from disk.";

/// Result of checking a stored blob's signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureCheck {
    Valid,
    /// Content was readable but does not start with [`PDF_MAGIC`].
    Mismatch,
    /// Content could not be read in full (missing, I/O error, too short).
    Unreadable(String),
}

impl SignatureCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, SignatureCheck::Valid)
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            SignatureCheck::Valid => None,
            SignatureCheck::Mismatch => Some(REASON_SIGNATURE),
            SignatureCheck::Unreadable(_) => Some(REASON_UNREADABLE),
        }
    }
}

/// Classify the leading bytes of a blob.
pub fn check_signature(prefix: &[u8]) -> SignatureCheck {
    if prefix.len() < PDF_MAGIC.len() {
        return SignatureCheck::Unreadable(format!(
            "truncated read: {} of {} bytes",
            prefix.len(),
            PDF_MAGIC.len()
        ));
    }
    if &prefix[..PDF_MAGIC.len()] == PDF_MAGIC {
        SignatureCheck::Valid
    } else {
        SignatureCheck::Mismatch
    }
}

pub struct Validator {
    records: Arc<dyn RecordStore>,
    content: Arc<dyn ContentStore>,
}

impl Validator {
    pub fn new(records: Arc<dyn RecordStore>, content: Arc<dyn ContentStore>) -> Self {
        Self { records, content }
    }

    /// Read the stored file's signature without touching the record.
    pub async fn inspect(&self, file: &ReceiptFile) -> SignatureCheck {
        match self
            .content
            .read_prefix(&file.file_path, PDF_MAGIC.len())
            .await
        {
            Ok(prefix) => check_signature(&prefix),
            Err(e) => SignatureCheck::Unreadable(e.to_string()),
        }
    }

    /// Check the stored file's signature and persist the outcome.
    pub async fn validate(&self, file_id: &str) -> Result<ReceiptFile> {
        let file = self
            .records
            .find_file_by_id(file_id)
            .await?
            .ok_or_else(|| ReceiptError::NotFound(format!("receipt file {}", file_id)))?;

        let check = self.inspect(&file).await;
        match &check {
            SignatureCheck::Valid => tracing::info!(id = %file.id, "receipt file is valid"),
            SignatureCheck::Mismatch => {
                tracing::info!(id = %file.id, "receipt file has wrong signature")
            }
            SignatureCheck::Unreadable(detail) => {
                tracing::warn!(id = %file.id, file_path = %file.file_path, %detail, "receipt file unreadable")
            }
        }

        let updated = self
            .records
            .update_validation(&file.id, check.is_valid(), check.reason())
            .await?;
        Ok(updated)
    }
}
