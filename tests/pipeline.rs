//! End-to-end tests of ingest → validate → extract against a real SQLite
//! database and on-disk content store, with a scripted extraction client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use receipt_harness::app::ReceiptApp;
use receipt_harness::content_store::{ContentStore, LocalContentStore};
use receipt_harness::db;
use receipt_harness::error::ReceiptError;
use receipt_harness::extract::{EXTRACTION_INSTRUCTION, PDF_MIME};
use receipt_harness::extraction::{ExtractionClient, ProviderError};
use receipt_harness::migrate;
use receipt_harness::models::Receipt;
use receipt_harness::record_store::{RecordStore, SqliteRecordStore};
use receipt_harness::validate::{REASON_SIGNATURE, REASON_UNREADABLE};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const PDF: &[u8] = b"%PDF-1.4\n1 0 obj << /Type /Catalog >> endobj\n%%EOF\n";

/// Returns a fixed reply and records every call.
struct ScriptedClient {
    reply: Result<String, String>,
    calls: AtomicUsize,
    last_request: Mutex<Option<(String, Vec<u8>, String)>>,
}

impl ScriptedClient {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionClient for ScriptedClient {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        instruction: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() =
            Some((instruction.to_string(), bytes.to_vec(), mime_type.to_string()));
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(message) => Err(ProviderError::Transport(message.clone())),
        }
    }
}

struct Harness {
    _tmp: TempDir,
    records: Arc<SqliteRecordStore>,
    content: Arc<LocalContentStore>,
}

impl Harness {
    async fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("data/receipts.sqlite"))
            .await
            .unwrap();
        migrate::apply_schema(&pool).await.unwrap();

        Self {
            records: Arc::new(SqliteRecordStore::new(pool)),
            content: Arc::new(LocalContentStore::new(tmp.path().join("uploads")).await.unwrap()),
            _tmp: tmp,
        }
    }

    fn app(&self, client: Option<Arc<ScriptedClient>>) -> ReceiptApp {
        let client = client.map(|c| c as Arc<dyn ExtractionClient>);
        ReceiptApp::new(self.records.clone(), self.content.clone(), client)
    }

    fn stored_blobs(&self) -> usize {
        std::fs::read_dir(self.content.root()).unwrap().count()
    }
}

// ─── Ingest ─────────────────────────────────────────────────────────

#[tokio::test]
async fn sequential_reupload_is_deduplicated() {
    let h = Harness::new().await;
    let app = h.app(None);

    let first = app.ingestor.ingest(PDF, "march.pdf").await.unwrap();
    let second = app.ingestor.ingest(PDF, "march-copy.pdf").await.unwrap();

    assert!(!first.duplicate);
    assert!(second.duplicate);
    assert_eq!(second.record.id, first.record.id);
    assert_eq!(second.message, "Duplicate file detected. Returning existing record.");
    assert_eq!(h.records.count_files().await.unwrap(), 1);
    assert_eq!(h.stored_blobs(), 1);
}

#[tokio::test]
async fn one_byte_difference_is_not_deduplicated() {
    let h = Harness::new().await;
    let app = h.app(None);

    let mut other = PDF.to_vec();
    *other.last_mut().unwrap() = b' ';

    let a = app.ingestor.ingest(PDF, "a.pdf").await.unwrap();
    let b = app.ingestor.ingest(&other, "b.pdf").await.unwrap();

    assert!(!a.duplicate);
    assert!(!b.duplicate);
    assert_ne!(a.record.file_hash, b.record.file_hash);
    assert_eq!(h.records.count_files().await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_uploads_persist_one_row() {
    let h = Harness::new().await;
    let app = Arc::new(h.app(None));

    let mut tasks = Vec::new();
    for i in 0..12 {
        let app = app.clone();
        tasks.push(tokio::spawn(async move {
            app.ingestor
                .ingest(PDF, &format!("copy-{}.pdf", i))
                .await
                .unwrap()
        }));
    }

    let mut fresh = 0;
    let mut ids = std::collections::HashSet::new();
    for task in tasks {
        let result = task.await.unwrap();
        if !result.duplicate {
            fresh += 1;
        }
        ids.insert(result.record.id);
    }

    assert_eq!(fresh, 1, "exactly one caller stores the file");
    assert_eq!(ids.len(), 1, "every caller sees the same record");
    assert_eq!(h.records.count_files().await.unwrap(), 1);
    assert_eq!(h.stored_blobs(), 1, "losers' blobs are removed");
}

// ─── Validate ───────────────────────────────────────────────────────

#[tokio::test]
async fn validation_outcomes_are_persisted() {
    let h = Harness::new().await;
    let app = h.app(None);

    let pdf = app.ingestor.ingest(PDF, "ok.pdf").await.unwrap().record;
    let png = app
        .ingestor
        .ingest(b"\x89PNG\r\n\x1a\n", "photo.pdf")
        .await
        .unwrap()
        .record;
    let gone = app
        .ingestor
        .ingest(b"%PDF-1.7 deleted later", "gone.pdf")
        .await
        .unwrap()
        .record;
    h.content.delete(&gone.file_path).await.unwrap();

    let pdf = app.validator.validate(&pdf.id).await.unwrap();
    assert_eq!(pdf.is_valid, Some(true));
    assert_eq!(pdf.invalid_reason, None);

    let png = app.validator.validate(&png.id).await.unwrap();
    assert_eq!(png.is_valid, Some(false));
    assert_eq!(png.invalid_reason.as_deref(), Some(REASON_SIGNATURE));

    let gone = app.validator.validate(&gone.id).await.unwrap();
    assert_eq!(gone.is_valid, Some(false));
    assert_eq!(gone.invalid_reason.as_deref(), Some(REASON_UNREADABLE));

    // Read back from the database, not just the returned value.
    let stored = h.records.find_file_by_id(&png.id).await.unwrap().unwrap();
    assert_eq!(stored.is_valid, Some(false));
    assert_eq!(stored.invalid_reason.as_deref(), Some(REASON_SIGNATURE));
}

#[tokio::test]
async fn truncated_file_is_unreadable() {
    let h = Harness::new().await;
    let app = h.app(None);

    let short = app.ingestor.ingest(b"%P", "short.pdf").await.unwrap().record;
    let short = app.validator.validate(&short.id).await.unwrap();
    assert_eq!(short.is_valid, Some(false));
    assert_eq!(short.invalid_reason.as_deref(), Some(REASON_UNREADABLE));
}

// ─── Extract ────────────────────────────────────────────────────────

#[tokio::test]
async fn fenced_response_becomes_receipt() {
    let h = Harness::new().await;
    let client = ScriptedClient::replying(
        "```json\n{\"merchant_name\":\"Acme\",\"date\":\"2024-01-01T00:00:00.000Z\",\"total_amount\":12.5}\n```",
    );
    let app = h.app(Some(client.clone()));

    let file = app.ingestor.ingest(PDF, "acme.pdf").await.unwrap().record;
    let receipt = app.extractor.extract(&file.id).await.unwrap();

    let expected: DateTime<Utc> = "2024-01-01T00:00:00Z".parse().unwrap();
    assert_eq!(receipt.merchant_name.as_deref(), Some("Acme"));
    assert_eq!(receipt.purchased_at, Some(expected));
    assert_eq!(receipt.total_amount, Some(12.5));
    assert_eq!(receipt.file_path, file.file_path);
    assert_eq!(receipt.receipt_file_id, file.id);

    let file = h.records.find_file_by_id(&file.id).await.unwrap().unwrap();
    assert!(file.is_processed);

    let stored = app.receipts.get(&receipt.id).await.unwrap();
    assert_eq!(stored, receipt);

    assert_eq!(client.calls(), 1);
    let (instruction, bytes, mime) = client.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(instruction, EXTRACTION_INSTRUCTION);
    assert_eq!(bytes, PDF);
    assert_eq!(mime, PDF_MIME);
}

#[tokio::test]
async fn null_fields_pass_through() {
    let h = Harness::new().await;
    let client =
        ScriptedClient::replying(r#"{"merchant_name":"Corner Shop","date":null,"total_amount":null}"#);
    let app = h.app(Some(client));

    let file = app.ingestor.ingest(PDF, "corner.pdf").await.unwrap().record;
    let receipt = app.extractor.extract(&file.id).await.unwrap();

    assert_eq!(receipt.merchant_name.as_deref(), Some("Corner Shop"));
    assert_eq!(receipt.purchased_at, None);
    assert_eq!(receipt.total_amount, None);
}

#[tokio::test]
async fn unparseable_response_changes_nothing() {
    let h = Harness::new().await;
    let client = ScriptedClient::replying("```\nI could not read this receipt, sorry.\n```");
    let app = h.app(Some(client.clone()));

    let file = app.ingestor.ingest(PDF, "blurry.pdf").await.unwrap().record;
    let err = app.extractor.extract(&file.id).await.unwrap_err();

    assert!(matches!(err, ReceiptError::Extraction(_)));
    assert_eq!(client.calls(), 1);
    let file = h.records.find_file_by_id(&file.id).await.unwrap().unwrap();
    assert!(!file.is_processed);
    assert!(app.receipts.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn provider_failure_is_reported_once() {
    let h = Harness::new().await;
    let client = ScriptedClient::failing("connection reset");
    let app = h.app(Some(client.clone()));

    let file = app.ingestor.ingest(PDF, "r.pdf").await.unwrap().record;
    let err = app.extractor.extract(&file.id).await.unwrap_err();

    assert!(matches!(err, ReceiptError::Extraction(ref m) if m.contains("connection reset")));
    assert_eq!(client.calls(), 1, "no retry");
    assert!(!h.records.find_file_by_id(&file.id).await.unwrap().unwrap().is_processed);
}

#[tokio::test]
async fn failed_extraction_can_be_retried_by_caller() {
    let h = Harness::new().await;
    let file = h.app(None).ingestor.ingest(PDF, "r.pdf").await.unwrap().record;

    let broken = h.app(Some(ScriptedClient::replying("not json")));
    assert!(broken.extractor.extract(&file.id).await.is_err());

    let working = h.app(Some(ScriptedClient::replying(r#"{"merchant_name":"Acme"}"#)));
    let receipt = working.extractor.extract(&file.id).await.unwrap();
    assert_eq!(receipt.merchant_name.as_deref(), Some("Acme"));
}

#[tokio::test]
async fn reextraction_is_rejected_without_provider_call() {
    let h = Harness::new().await;
    let client = ScriptedClient::replying(r#"{"merchant_name":"Acme","total_amount":3}"#);
    let app = h.app(Some(client.clone()));

    let file = app.ingestor.ingest(PDF, "r.pdf").await.unwrap().record;
    app.extractor.extract(&file.id).await.unwrap();
    let err = app.extractor.extract(&file.id).await.unwrap_err();

    assert!(matches!(err, ReceiptError::AlreadyProcessed(_)));
    assert_eq!(client.calls(), 1);
    assert_eq!(app.receipts.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn file_marked_invalid_is_still_extracted() {
    let h = Harness::new().await;
    let client = ScriptedClient::replying(r#"{"merchant_name":"Acme","total_amount":4.5}"#);
    let app = h.app(Some(client.clone()));

    let file = app.ingestor.ingest(b"GIF89a receipt", "fake.pdf").await.unwrap().record;
    let file = app.validator.validate(&file.id).await.unwrap();
    assert_eq!(file.invalid_reason.as_deref(), Some(REASON_SIGNATURE));

    let receipt = app.extractor.extract(&file.id).await.unwrap();
    assert_eq!(receipt.merchant_name.as_deref(), Some("Acme"));
    assert_eq!(receipt.receipt_file_id, file.id);
    assert_eq!(client.calls(), 1);
    assert!(h.records.find_file_by_id(&file.id).await.unwrap().unwrap().is_processed);
}

#[tokio::test]
async fn returned_receipt_matches_stored_row() {
    let h = Harness::new().await;
    let client = ScriptedClient::replying(
        r#"{"merchant_name":"Acme","date":"2024-01-01T00:00:00.123456Z","total_amount":1}"#,
    );
    let app = h.app(Some(client));

    let file = app.ingestor.ingest(PDF, "r.pdf").await.unwrap().record;
    let receipt = app.extractor.extract(&file.id).await.unwrap();

    let expected: DateTime<Utc> = "2024-01-01T00:00:00.123Z".parse().unwrap();
    assert_eq!(receipt.purchased_at, Some(expected));
    assert_eq!(app.receipts.get(&receipt.id).await.unwrap(), receipt);
}

#[tokio::test]
async fn missing_credential_is_a_configuration_error() {
    let h = Harness::new().await;
    let app = h.app(None);

    let file = app.ingestor.ingest(PDF, "r.pdf").await.unwrap().record;
    let err = app.extractor.extract(&file.id).await.unwrap_err();

    assert!(matches!(err, ReceiptError::Configuration(_)));
    assert!(!h.records.find_file_by_id(&file.id).await.unwrap().unwrap().is_processed);
}

#[tokio::test]
async fn missing_blob_fails_extraction_with_storage_error() {
    let h = Harness::new().await;
    let client = ScriptedClient::replying(r#"{"merchant_name":"Acme"}"#);
    let app = h.app(Some(client.clone()));

    let file = app.ingestor.ingest(PDF, "r.pdf").await.unwrap().record;
    h.content.delete(&file.file_path).await.unwrap();
    let err = app.extractor.extract(&file.id).await.unwrap_err();

    assert!(matches!(err, ReceiptError::Storage(_)));
    assert_eq!(client.calls(), 0);
}

// ─── Unknown identifiers ────────────────────────────────────────────

#[tokio::test]
async fn unknown_ids_are_not_found_and_write_nothing() {
    let h = Harness::new().await;
    let client = ScriptedClient::replying(r#"{"merchant_name":"Acme"}"#);
    let app = h.app(Some(client.clone()));

    let err = app.validator.validate("unknown-id").await.unwrap_err();
    assert!(matches!(err, ReceiptError::NotFound(_)));

    let err = app.extractor.extract("unknown-id").await.unwrap_err();
    assert!(matches!(err, ReceiptError::NotFound(_)));

    let err = app.receipts.get("unknown-id").await.unwrap_err();
    assert!(matches!(err, ReceiptError::NotFound(_)));

    assert_eq!(client.calls(), 0);
    assert_eq!(h.records.count_files().await.unwrap(), 0);
    assert!(app.receipts.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn receipts_list_newest_first() {
    let h = Harness::new().await;
    let app = h.app(Some(ScriptedClient::replying(r#"{"merchant_name":"Acme"}"#)));

    let a = app.ingestor.ingest(b"%PDF a", "a.pdf").await.unwrap().record;
    let b = app.ingestor.ingest(b"%PDF b", "b.pdf").await.unwrap().record;
    let ra = app.extractor.extract(&a.id).await.unwrap();
    let rb = app.extractor.extract(&b.id).await.unwrap();

    let listed = app.receipts.list().await.unwrap();
    let ids: Vec<&str> = listed.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec![rb.id.as_str(), ra.id.as_str()]);
}

#[tokio::test]
async fn receipts_with_equal_timestamps_list_latest_insert_first() {
    let h = Harness::new().await;
    let app = h.app(None);

    let mut inserted = Vec::new();
    for (i, body) in [&b"%PDF x"[..], &b"%PDF y"[..], &b"%PDF z"[..]].iter().enumerate() {
        let file = app
            .ingestor
            .ingest(body, &format!("{}.pdf", i))
            .await
            .unwrap()
            .record;
        // Ids chosen so that id order disagrees with insertion order.
        let receipt = Receipt {
            id: format!("receipt-{}", 9 - i),
            merchant_name: None,
            total_amount: None,
            purchased_at: None,
            file_path: file.file_path.clone(),
            receipt_file_id: file.id.clone(),
            created_at: 1_700_000_000_000,
        };
        inserted.push(h.records.record_extraction(&receipt).await.unwrap().id);
    }

    let listed: Vec<String> = app
        .receipts
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    inserted.reverse();
    assert_eq!(listed, inserted);
}
