//! Core data models for the receipt pipeline.
//!
//! A [`ReceiptFile`] is one physically stored upload, keyed by its content
//! digest. A [`Receipt`] is the structured data extracted from one file.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One stored upload. At most one exists per distinct `file_hash`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptFile {
    pub id: String,
    /// Client-supplied name. Display only.
    pub file_name: String,
    /// Location handle in the content store.
    pub file_path: String,
    /// Lowercase hex SHA-256 of the stored bytes.
    pub file_hash: String,
    /// `None` until the first validation run.
    pub is_valid: Option<bool>,
    pub invalid_reason: Option<String>,
    pub is_processed: bool,
    /// Unix milliseconds.
    pub created_at: i64,
}

/// Fields needed to create a [`ReceiptFile`] row.
#[derive(Debug, Clone)]
pub struct NewReceiptFile {
    pub file_name: String,
    pub file_path: String,
    pub file_hash: String,
}

/// Structured extraction result for one [`ReceiptFile`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Receipt {
    pub id: String,
    pub merchant_name: Option<String>,
    pub total_amount: Option<f64>,
    pub purchased_at: Option<DateTime<Utc>>,
    /// Copy of the source file's location handle.
    pub file_path: String,
    pub receipt_file_id: String,
    /// Unix milliseconds. Ties in listings go to the later insert.
    pub created_at: i64,
}

/// Outcome of an ingestion: either a freshly stored file or the existing
/// record for identical bytes.
#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub duplicate: bool,
    pub message: String,
    #[serde(rename = "data")]
    pub record: ReceiptFile,
}

impl IngestResult {
    pub fn created(record: ReceiptFile) -> Self {
        Self {
            duplicate: false,
            message: "File uploaded successfully".to_string(),
            record,
        }
    }

    pub fn duplicate(record: ReceiptFile) -> Self {
        Self {
            duplicate: true,
            message: "Duplicate file detected. Returning existing record.".to_string(),
            record,
        }
    }
}
