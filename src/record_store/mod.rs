//! Persistence for [`ReceiptFile`] and [`Receipt`] rows.
//!
//! The [`RecordStore`] trait is the contract the pipeline relies on. Two
//! guarantees matter beyond plain CRUD:
//!
//! - `file_hash` is unique. A second insert for the same digest must fail
//!   with [`StoreError::Conflict`], atomically, even under concurrent
//!   writers.
//! - [`record_extraction`](RecordStore::record_extraction) creates the
//!   receipt and flips `is_processed` together or not at all.
//!
//! | Implementation | Purpose |
//! |----------------|---------|
//! | [`SqliteRecordStore`] | Production backend |
//! | [`InMemoryRecordStore`] | Tests |

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{NewReceiptFile, Receipt, ReceiptFile};

pub use memory::InMemoryRecordStore;
pub use sqlite::SqliteRecordStore;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new file row with `is_valid = true` and `is_processed = false`.
    ///
    /// Fails with [`StoreError::Conflict`] if the digest already exists.
    async fn create_file(&self, new: &NewReceiptFile) -> Result<ReceiptFile, StoreError>;

    async fn find_file_by_hash(&self, file_hash: &str) -> Result<Option<ReceiptFile>, StoreError>;

    async fn find_file_by_id(&self, id: &str) -> Result<Option<ReceiptFile>, StoreError>;

    /// Persist a validation outcome and return the updated row.
    async fn update_validation(
        &self,
        id: &str,
        is_valid: bool,
        invalid_reason: Option<&str>,
    ) -> Result<ReceiptFile, StoreError>;

    /// Insert `receipt` and mark its file processed in one atomic step.
    ///
    /// Fails with [`StoreError::Conflict`] if the file already has a receipt.
    async fn record_extraction(&self, receipt: &Receipt) -> Result<Receipt, StoreError>;

    async fn find_receipt_by_id(&self, id: &str) -> Result<Option<Receipt>, StoreError>;

    /// All receipts, newest first.
    async fn list_receipts(&self) -> Result<Vec<Receipt>, StoreError>;

    async fn count_files(&self) -> Result<i64, StoreError>;
}
