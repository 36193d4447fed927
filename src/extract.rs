//! Structured-data extraction from stored receipts.
//!
//! The stored PDF is sent to the extraction provider together with
//! [`EXTRACTION_INSTRUCTION`]. The reply is free text that is supposed to be
//! one JSON object; it is cleaned with [`strip_code_fences`] and parsed with
//! [`parse_extraction`]. Any failure on that path leaves the database
//! untouched and is reported once, without retry.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::content_store::ContentStore;
use crate::error::{ReceiptError, Result, StoreError};
use crate::extraction::ExtractionClient;
use crate::models::Receipt;
use crate::record_store::RecordStore;

pub const PDF_MIME: &str = "application/pdf";

/// Instruction sent with every document. Defines the output contract that
/// [`parse_extraction`] expects.
pub const EXTRACTION_INSTRUCTION: &str = r#"Analyze this receipt document. Extract these fields as a single JSON object:
- merchant_name (string, e.g. "Walmart", "Uber")
- date (string, ISO 8601 date-time YYYY-MM-DDTHH:mm:ss.000Z, or null if unknown)
- total_amount (number, or null if unknown)

Return ONLY the JSON object. No prose, no explanations, no markdown formatting or code fences."#;

/// Fields the provider is asked to return.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExtractedFields {
    #[serde(default)]
    pub merchant_name: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub total_amount: Option<f64>,
}

/// Remove markdown code fences: every run of three backticks together with
/// a language tag directly following it. The result is trimmed.
pub fn strip_code_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find("```") {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 3..];
        let tag_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '+'))
            .unwrap_or(rest.len());
        rest = &rest[tag_len..];
    }
    out.push_str(rest);

    out.trim().to_string()
}

/// Parse cleaned provider text into [`ExtractedFields`].
///
/// The text must be exactly one JSON object; arrays, scalars, trailing
/// prose, and wrongly typed fields are rejected.
pub fn parse_extraction(text: &str) -> std::result::Result<ExtractedFields, String> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| format!("response is not valid JSON: {}", e))?;

    if !value.is_object() {
        return Err("response JSON is not an object".to_string());
    }

    serde_json::from_value(value).map_err(|e| format!("response has unexpected field types: {}", e))
}

/// Parse an ISO-8601 timestamp from the provider.
///
/// Accepts RFC 3339 with an offset, a naive date-time (read as UTC), or a
/// bare date (midnight UTC). Blank input means "no date".
pub fn parse_purchased_at(raw: Option<&str>) -> std::result::Result<Option<DateTime<Utc>>, String> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(r) => r,
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(Some(naive.and_utc()));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Some(naive.and_utc()));
        }
    }

    Err(format!("unparseable date: {}", raw))
}

pub struct Extractor {
    records: Arc<dyn RecordStore>,
    content: Arc<dyn ContentStore>,
    client: Option<Arc<dyn ExtractionClient>>,
}

impl Extractor {
    /// `client` is `None` when no provider credential is configured.
    pub fn new(
        records: Arc<dyn RecordStore>,
        content: Arc<dyn ContentStore>,
        client: Option<Arc<dyn ExtractionClient>>,
    ) -> Self {
        Self {
            records,
            content,
            client,
        }
    }

    /// Run extraction for one file and persist the resulting [`Receipt`].
    pub async fn extract(&self, file_id: &str) -> Result<Receipt> {
        let file = self
            .records
            .find_file_by_id(file_id)
            .await?
            .ok_or_else(|| ReceiptError::NotFound(format!("receipt file {}", file_id)))?;

        if file.is_processed {
            return Err(ReceiptError::AlreadyProcessed(file.id));
        }

        let client = self.client.as_ref().ok_or_else(|| {
            ReceiptError::Configuration("extraction provider credential is not configured".to_string())
        })?;

        let bytes = self.content.get(&file.file_path).await?;

        let text = client
            .generate(EXTRACTION_INSTRUCTION, &bytes, PDF_MIME)
            .await
            .map_err(|e| {
                tracing::error!(id = %file.id, model = client.model_name(), error = %e, "extraction provider call failed");
                ReceiptError::Extraction(e.to_string())
            })?;

        let cleaned = strip_code_fences(&text);
        let fields = parse_extraction(&cleaned).map_err(|e| {
            tracing::error!(id = %file.id, error = %e, response = %text, "unparseable extraction response");
            ReceiptError::Extraction(e)
        })?;
        let purchased_at = parse_purchased_at(fields.date.as_deref()).map_err(|e| {
            tracing::error!(id = %file.id, error = %e, "unparseable extraction date");
            ReceiptError::Extraction(e)
        })?;

        let receipt = Receipt {
            id: Uuid::new_v4().to_string(),
            merchant_name: fields.merchant_name,
            total_amount: fields.total_amount,
            purchased_at,
            file_path: file.file_path.clone(),
            receipt_file_id: file.id.clone(),
            created_at: Utc::now().timestamp_millis(),
        };

        let receipt = match self.records.record_extraction(&receipt).await {
            Ok(r) => r,
            Err(StoreError::Conflict(_)) => return Err(ReceiptError::AlreadyProcessed(file.id)),
            Err(StoreError::NotFound(m)) => return Err(ReceiptError::NotFound(m)),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            id = %file.id,
            receipt_id = %receipt.id,
            merchant = receipt.merchant_name.as_deref().unwrap_or("-"),
            "receipt extracted"
        );
        Ok(receipt)
    }
}
