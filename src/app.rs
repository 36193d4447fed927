//! Wiring of the pipeline operations over concrete stores.
//!
//! [`ReceiptApp`] owns one instance of each operation, all sharing the same
//! record store and content store. It is cheap to share behind an `Arc` and
//! is what both the CLI and the HTTP server drive.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::content_store::{ContentStore, LocalContentStore};
use crate::db;
use crate::extract::Extractor;
use crate::extraction::{build_client, ExtractionClient};
use crate::ingest::Ingestor;
use crate::migrate;
use crate::receipts::ReceiptQueries;
use crate::record_store::{RecordStore, SqliteRecordStore};
use crate::validate::Validator;

pub struct ReceiptApp {
    pub ingestor: Ingestor,
    pub validator: Validator,
    pub extractor: Extractor,
    pub receipts: ReceiptQueries,
}

impl ReceiptApp {
    /// Assemble the operations from explicit collaborators.
    pub fn new(
        records: Arc<dyn RecordStore>,
        content: Arc<dyn ContentStore>,
        client: Option<Arc<dyn ExtractionClient>>,
    ) -> Self {
        Self {
            ingestor: Ingestor::new(records.clone(), content.clone()),
            validator: Validator::new(records.clone(), content.clone()),
            extractor: Extractor::new(records.clone(), content, client),
            receipts: ReceiptQueries::new(records),
        }
    }

    /// Open the SQLite database (applying the schema), the local content
    /// store, and the configured extraction client.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply_schema(&pool).await?;

        let content = LocalContentStore::new(&config.storage.root)
            .await
            .with_context(|| {
                format!(
                    "Failed to open content store at {}",
                    config.storage.root.display()
                )
            })?;
        let client = build_client(&config.extraction)?;

        Ok(Self::new(
            Arc::new(SqliteRecordStore::new(pool)),
            Arc::new(content),
            client,
        ))
    }
}
