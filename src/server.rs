//! HTTP transport for the receipt pipeline.
//!
//! A thin layer: handlers pull bytes or an id out of the request, call the
//! matching [`ReceiptApp`] operation, and serialize the result.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload` | Multipart upload (field `file`, `application/pdf` only) |
//! | `POST` | `/validate` | `{ "id": "..." }` → updated receipt file |
//! | `POST` | `/process` | `{ "id": "..." }` → extracted receipt |
//! | `GET`  | `/receipts` | All receipts, newest first |
//! | `GET`  | `/receipts/{id}` | One receipt |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "not found: receipt file 42" } }
//! ```
//!
//! Error codes: `bad_request` (400), `configuration` (400), `not_found` (404),
//! `conflict` (409), `payload_too_large` (413), `storage` (500),
//! `extraction_failed` (500), `internal` (500).

use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::app::ReceiptApp;
use crate::config::Config;
use crate::error::{ReceiptError, StoreError};
use crate::extract::PDF_MIME;
use crate::models::{IngestResult, Receipt, ReceiptFile};

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
struct AppState {
    app: Arc<ReceiptApp>,
}

/// Starts the HTTP server on `[server].bind`.
///
/// Opens the database (applying the schema), the content store, and the
/// extraction client once, then serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let app = Arc::new(ReceiptApp::from_config(config).await?);
    let router = router(app, config.storage.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "receipt server listening");
    println!("Receipt server listening on http://{}", config.server.bind);

    axum::serve(listener, router).await?;
    Ok(())
}

/// Build the router over an assembled [`ReceiptApp`].
pub fn router(app: Arc<ReceiptApp>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload", post(handle_upload))
        .route("/validate", post(handle_validate))
        .route("/process", post(handle_process))
        .route("/receipts", get(handle_list_receipts))
        .route("/receipts/{id}", get(handle_get_receipt))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(max_upload_bytes + MULTIPART_OVERHEAD))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { app })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<ReceiptError> for AppError {
    fn from(err: ReceiptError) -> Self {
        let (status, code) = match &err {
            ReceiptError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ReceiptError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ReceiptError::AlreadyProcessed(_) => (StatusCode::CONFLICT, "conflict"),
            ReceiptError::Configuration(_) => (StatusCode::BAD_REQUEST, "configuration"),
            ReceiptError::Extraction(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "extraction_failed")
            }
            ReceiptError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
            ReceiptError::Store(StoreError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
            ReceiptError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }

        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError {
        status: err.status(),
        code: if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            "payload_too_large"
        } else {
            "bad_request"
        },
        message: err.body_text(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /upload ============

/// Reads the `file` part, enforcing the PDF media type before anything
/// reaches the pipeline.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestResult>, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        if field.content_type() != Some(PDF_MIME) {
            return Err(bad_request("Only PDF files are allowed!"));
        }

        let file_name = field
            .file_name()
            .filter(|n| !n.is_empty())
            .unwrap_or("upload.pdf")
            .to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;

        let result = state.app.ingestor.ingest(&bytes, &file_name).await?;
        return Ok(Json(result));
    }

    Err(bad_request("File is required"))
}

// ============ POST /validate, POST /process ============

#[derive(Deserialize)]
struct IdRequest {
    id: String,
}

fn require_id(body: Result<Json<IdRequest>, JsonRejection>) -> Result<String, AppError> {
    let Json(req) = body.map_err(|e| bad_request(e.body_text()))?;
    let id = req.id.trim().to_string();
    if id.is_empty() {
        return Err(bad_request("id must not be empty"));
    }
    Ok(id)
}

async fn handle_validate(
    State(state): State<AppState>,
    body: Result<Json<IdRequest>, JsonRejection>,
) -> Result<Json<ReceiptFile>, AppError> {
    let id = require_id(body)?;
    Ok(Json(state.app.validator.validate(&id).await?))
}

async fn handle_process(
    State(state): State<AppState>,
    body: Result<Json<IdRequest>, JsonRejection>,
) -> Result<Json<Receipt>, AppError> {
    let id = require_id(body)?;
    Ok(Json(state.app.extractor.extract(&id).await?))
}

// ============ GET /receipts ============

async fn handle_list_receipts(
    State(state): State<AppState>,
) -> Result<Json<Vec<Receipt>>, AppError> {
    Ok(Json(state.app.receipts.list().await?))
}

async fn handle_get_receipt(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Receipt>, AppError> {
    Ok(Json(state.app.receipts.get(&id).await?))
}
