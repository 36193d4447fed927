//! # Receipt Harness CLI (`rcpt`)
//!
//! ## Usage
//!
//! ```bash
//! rcpt --config ./config/rcpt.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rcpt init` | Create the SQLite database and run schema migrations |
//! | `rcpt upload <file>` | Store a receipt PDF (deduplicated by content) |
//! | `rcpt validate <id>` | Check the stored file's PDF signature |
//! | `rcpt process <id>` | Extract merchant, date, and total via the model |
//! | `rcpt receipts list` | List extracted receipts |
//! | `rcpt receipts get <id>` | Show one extracted receipt |
//! | `rcpt serve` | Start the HTTP server |
//!
//! Results are printed to stdout as JSON. Logs go to stderr; set
//! `RUST_LOG` (e.g. `RUST_LOG=receipt_harness=debug`) to change verbosity.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use receipt_harness::app::ReceiptApp;
use receipt_harness::config::{self, Config};
use receipt_harness::{migrate, server};

/// Receipt Harness CLI — content-addressed receipt ingestion, validation,
/// and AI-assisted extraction.
#[derive(Parser)]
#[command(name = "rcpt", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rcpt.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent — running it multiple times is safe.
    Init,

    /// Upload a receipt file.
    ///
    /// Identical content is stored once; a repeat upload returns the
    /// existing record with `"duplicate": true`.
    Upload {
        /// Path to the PDF to upload.
        path: PathBuf,

        /// Override the recorded file name (defaults to the path's file name).
        #[arg(long)]
        name: Option<String>,
    },

    /// Validate a stored receipt file's PDF signature.
    Validate {
        /// Receipt file id.
        id: String,
    },

    /// Extract structured data from a stored receipt file.
    Process {
        /// Receipt file id.
        id: String,
    },

    /// Inspect extracted receipts.
    Receipts {
        #[command(subcommand)]
        action: ReceiptsAction,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum ReceiptsAction {
    /// List all receipts, newest first.
    List,
    /// Show one receipt by id.
    Get { id: String },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn upload_name(path: &Path, name: Option<String>) -> String {
    name.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload.pdf".to_string())
    })
}

async fn open_app(cfg: &Config) -> Result<ReceiptApp> {
    ReceiptApp::from_config(cfg).await
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Upload { path, name } => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let app = open_app(&cfg).await?;
            let result = app.ingestor.ingest(&bytes, &upload_name(&path, name)).await?;
            print_json(&result)?;
        }
        Commands::Validate { id } => {
            let app = open_app(&cfg).await?;
            print_json(&app.validator.validate(&id).await?)?;
        }
        Commands::Process { id } => {
            let app = open_app(&cfg).await?;
            print_json(&app.extractor.extract(&id).await?)?;
        }
        Commands::Receipts { action } => {
            let app = open_app(&cfg).await?;
            match action {
                ReceiptsAction::List => print_json(&app.receipts.list().await?)?,
                ReceiptsAction::Get { id } => print_json(&app.receipts.get(&id).await?)?,
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
