use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Creates the receipt tables on an open pool. Safe to run repeatedly.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // One row per distinct content digest
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS receipt_files (
            id TEXT PRIMARY KEY,
            file_name TEXT NOT NULL,
            file_path TEXT NOT NULL,
            file_hash TEXT NOT NULL,
            is_valid INTEGER,
            invalid_reason TEXT,
            is_processed INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            UNIQUE(file_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one extraction result per file
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS receipts (
            id TEXT PRIMARY KEY,
            merchant_name TEXT,
            total_amount REAL,
            purchased_at INTEGER,
            file_path TEXT NOT NULL,
            receipt_file_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(receipt_file_id),
            FOREIGN KEY (receipt_file_id) REFERENCES receipt_files(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_receipts_created_at ON receipts(created_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
