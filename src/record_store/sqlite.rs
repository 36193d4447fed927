//! SQLite-backed [`RecordStore`].
//!
//! Digest uniqueness is enforced by `UNIQUE(file_hash)` on `receipt_files`,
//! and single-receipt-per-file by `UNIQUE(receipt_file_id)` on `receipts`.
//! Both surface as [`StoreError::Conflict`] via the `From<sqlx::Error>` impl.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::RecordStore;
use crate::error::StoreError;
use crate::models::{NewReceiptFile, Receipt, ReceiptFile};

const FILE_COLUMNS: &str =
    "id, file_name, file_path, file_hash, is_valid, invalid_reason, is_processed, created_at";
const RECEIPT_COLUMNS: &str =
    "id, merchant_name, total_amount, purchased_at, file_path, receipt_file_id, created_at";

pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn file_from_row(row: &SqliteRow) -> ReceiptFile {
    ReceiptFile {
        id: row.get("id"),
        file_name: row.get("file_name"),
        file_path: row.get("file_path"),
        file_hash: row.get("file_hash"),
        is_valid: row.get("is_valid"),
        invalid_reason: row.get("invalid_reason"),
        is_processed: row.get("is_processed"),
        created_at: row.get("created_at"),
    }
}

fn receipt_from_row(row: &SqliteRow) -> Receipt {
    let purchased_at: Option<i64> = row.get("purchased_at");
    Receipt {
        id: row.get("id"),
        merchant_name: row.get("merchant_name"),
        total_amount: row.get("total_amount"),
        purchased_at: purchased_at.and_then(DateTime::<Utc>::from_timestamp_millis),
        file_path: row.get("file_path"),
        receipt_file_id: row.get("receipt_file_id"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn create_file(&self, new: &NewReceiptFile) -> Result<ReceiptFile, StoreError> {
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

        sqlx::query(
            r#"
            INSERT INTO receipt_files (id, file_name, file_path, file_hash, is_valid,
                                       invalid_reason, is_processed, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.file_name)
        .bind(&record.file_path)
        .bind(&record.file_hash)
        .bind(record.is_valid)
        .bind(&record.invalid_reason)
        .bind(record.is_processed)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find_file_by_hash(&self, file_hash: &str) -> Result<Option<ReceiptFile>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM receipt_files WHERE file_hash = ?",
            FILE_COLUMNS
        ))
        .bind(file_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(file_from_row))
    }

    async fn find_file_by_id(&self, id: &str) -> Result<Option<ReceiptFile>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM receipt_files WHERE id = ?",
            FILE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(file_from_row))
    }

    async fn update_validation(
        &self,
        id: &str,
        is_valid: bool,
        invalid_reason: Option<&str>,
    ) -> Result<ReceiptFile, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE receipt_files SET is_valid = ?, invalid_reason = ? WHERE id = ? RETURNING {}",
            FILE_COLUMNS
        ))
        .bind(is_valid)
        .bind(invalid_reason)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref()
            .map(file_from_row)
            .ok_or_else(|| StoreError::NotFound(format!("receipt file {}", id)))
    }

    async fn record_extraction(&self, receipt: &Receipt) -> Result<Receipt, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Read back through RETURNING so callers see the stored precision.
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO receipts (id, merchant_name, total_amount, purchased_at, file_path,
                                  receipt_file_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING {}
            "#,
            RECEIPT_COLUMNS
        ))
        .bind(&receipt.id)
        .bind(&receipt.merchant_name)
        .bind(receipt.total_amount)
        .bind(receipt.purchased_at.map(|t| t.timestamp_millis()))
        .bind(&receipt.file_path)
        .bind(&receipt.receipt_file_id)
        .bind(receipt.created_at)
        .fetch_one(&mut *tx)
        .await?;
        let stored = receipt_from_row(&row);

        let updated = sqlx::query("UPDATE receipt_files SET is_processed = 1 WHERE id = ?")
            .bind(&receipt.receipt_file_id)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            // Dropping the transaction rolls back the insert.
            return Err(StoreError::NotFound(format!(
                "receipt file {}",
                receipt.receipt_file_id
            )));
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn find_receipt_by_id(&self, id: &str) -> Result<Option<Receipt>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM receipts WHERE id = ?",
            RECEIPT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(receipt_from_row))
    }

    async fn list_receipts(&self) -> Result<Vec<Receipt>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM receipts ORDER BY created_at DESC, rowid DESC",
            RECEIPT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(receipt_from_row).collect())
    }

    async fn count_files(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM receipt_files")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
