//! Read-only access to extracted receipts.

use std::sync::Arc;

use crate::error::{ReceiptError, Result};
use crate::models::Receipt;
use crate::record_store::RecordStore;

pub struct ReceiptQueries {
    records: Arc<dyn RecordStore>,
}

impl ReceiptQueries {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }

    /// All receipts, newest first.
    pub async fn list(&self) -> Result<Vec<Receipt>> {
        Ok(self.records.list_receipts().await?)
    }

    pub async fn get(&self, id: &str) -> Result<Receipt> {
        self.records
            .find_receipt_by_id(id)
            .await?
            .ok_or_else(|| ReceiptError::NotFound(format!("receipt {}", id)))
    }
}
