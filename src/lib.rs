//! # Receipt Harness
//!
//! Content-addressed receipt ingestion, validation, and AI-assisted
//! extraction.
//!
//! Every upload is hashed; identical bytes are stored once. A stored file
//! can then be validated (magic-byte check) and processed (an external
//! model turns the PDF into merchant, date, and total), producing a
//! [`Receipt`](models::Receipt) row.
//!
//! ## Architecture
//!
//! ```text
//!  upload ──▶ ┌──────────┐    ┌───────────────┐
//!             │  Ingest  │──▶ │ Content Store │  (bytes, by handle)
//!             └────┬─────┘    └───────▲───────┘
//!                  │                  │
//!                  ▼                  │
//!           ┌──────────────┐   ┌──────┴─────┐   ┌────────────┐
//!           │ Record Store │◀──│  Validate  │   │  Extract   │──▶ Gemini
//!           │   (SQLite)   │◀──┴────────────┴───┤            │
//!           └──────────────┘                    └────────────┘
//! ```
//!
//! The three operations are invoked independently by file id; none of them
//! triggers the next.
//!
//! ## Lifecycle of a receipt file
//!
//! | After | `is_valid` | `invalid_reason` | `is_processed` |
//! |-------|-----------|------------------|----------------|
//! | ingest | `true` | `null` | `false` |
//! | validate (PDF) | `true` | `null` | unchanged |
//! | validate (other) | `false` | reason | unchanged |
//! | extract (success) | unchanged | unchanged | `true` |
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`hash`] | Content digests |
//! | [`content_store`] | Byte storage |
//! | [`record_store`] | Receipt file and receipt persistence |
//! | [`extraction`] | Extraction provider client |
//! | [`ingest`] | Upload with deduplication |
//! | [`validate`] | Signature validation |
//! | [`extract`] | Structured-data extraction |
//! | [`receipts`] | Receipt queries |
//! | [`app`] | Operation wiring |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod app;
pub mod config;
pub mod content_store;
pub mod db;
pub mod error;
pub mod extract;
pub mod extraction;
pub mod hash;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod receipts;
pub mod record_store;
pub mod server;
pub mod validate;
