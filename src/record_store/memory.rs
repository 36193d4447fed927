//! In-memory [`RecordStore`] for tests.
//!
//! Both tables live behind one `RwLock`, so the uniqueness checks and the
//! insert happen under the same write guard.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use super::RecordStore;
use crate::error::StoreError;
use crate::models::{NewReceiptFile, Receipt, ReceiptFile};

#[derive(Default)]
struct Tables {
    files: HashMap<String, ReceiptFile>,
    /// file_hash -> file id
    by_hash: HashMap<String, String>,
    receipts: HashMap<String, Receipt>,
    /// receipt_file_id -> receipt id
    by_file: HashMap<String, String>,
    /// Receipt ids in insertion order.
    receipt_order: Vec<String>,
}

#[derive(Default)]
pub struct InMemoryRecordStore {
    tables: RwLock<Tables>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create_file(&self, new: &NewReceiptFile) -> Result<ReceiptFile, StoreError> {
        let mut tables = self.tables.write().unwrap();
        if tables.by_hash.contains_key(&new.file_hash) {
            return Err(StoreError::Conflict(format!(
                "receipt_files.file_hash {}",
                new.file_hash
            )));
        }

        let record = ReceiptFile {
            id: Uuid::new_v4().to_string(),
            file_name: new.file_name.clone(),
            file_path: new.file_path.clone(),
            file_hash: new.file_hash.clone(),
            is_valid: Some(true),
            invalid_reason: None,
            is_processed: false,
            created_at: Utc::now().timestamp_millis(),
        };
        tables
            .by_hash
            .insert(record.file_hash.clone(), record.id.clone());
        tables.files.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn find_file_by_hash(&self, file_hash: &str) -> Result<Option<ReceiptFile>, StoreError> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .by_hash
            .get(file_hash)
            .and_then(|id| tables.files.get(id))
            .cloned())
    }

    async fn find_file_by_id(&self, id: &str) -> Result<Option<ReceiptFile>, StoreError> {
        Ok(self.tables.read().unwrap().files.get(id).cloned())
    }

    async fn update_validation(
        &self,
        id: &str,
        is_valid: bool,
        invalid_reason: Option<&str>,
    ) -> Result<ReceiptFile, StoreError> {
        let mut tables = self.tables.write().unwrap();
        let file = tables
            .files
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("receipt file {}", id)))?;
        file.is_valid = Some(is_valid);
        file.invalid_reason = invalid_reason.map(str::to_string);
        Ok(file.clone())
    }

    async fn record_extraction(&self, receipt: &Receipt) -> Result<Receipt, StoreError> {
        let mut tables = self.tables.write().unwrap();
        if !tables.files.contains_key(&receipt.receipt_file_id) {
            return Err(StoreError::NotFound(format!(
                "receipt file {}",
                receipt.receipt_file_id
            )));
        }
        if tables.by_file.contains_key(&receipt.receipt_file_id) {
            return Err(StoreError::Conflict(format!(
                "receipts.receipt_file_id {}",
                receipt.receipt_file_id
            )));
        }

        tables
            .by_file
            .insert(receipt.receipt_file_id.clone(), receipt.id.clone());
        tables.receipts.insert(receipt.id.clone(), receipt.clone());
        tables.receipt_order.push(receipt.id.clone());
        if let Some(file) = tables.files.get_mut(&receipt.receipt_file_id) {
            file.is_processed = true;
        }
        Ok(receipt.clone())
    }

    async fn find_receipt_by_id(&self, id: &str) -> Result<Option<Receipt>, StoreError> {
        Ok(self.tables.read().unwrap().receipts.get(id).cloned())
    }

    async fn list_receipts(&self) -> Result<Vec<Receipt>, StoreError> {
        let tables = self.tables.read().unwrap();
        let mut receipts: Vec<Receipt> = tables
            .receipt_order
            .iter()
            .rev()
            .filter_map(|id| tables.receipts.get(id).cloned())
            .collect();
        // Stable, so equal timestamps keep latest-insert-first.
        receipts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(receipts)
    }

    async fn count_files(&self) -> Result<i64, StoreError> {
        Ok(self.tables.read().unwrap().files.len() as i64)
    }
}
