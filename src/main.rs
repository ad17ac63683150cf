//! # Fleet Corpus CLI (`fleet`)
//!
//! Initialises the document store, ingests inventory batches, answers corpus
//! queries, and runs the HTTP upload/query server.
//!
//! ## Usage
//!
//! ```bash
//! fleet --config ./config/fleet.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fleet init` | Create the SQLite database and run schema migrations |
//! | `fleet ingest <file>` | Ingest one delimited batch and print its status |
//! | `fleet query brand <term>` | Count, average price and odometer by designation |
//! | `fleet query segment <term>` | Distinct vehicles by category |
//! | `fleet query location <term>` | Count and total price by city |
//! | `fleet stats` | Corpus overview |
//! | `fleet serve` | Start the HTTP server |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::error;
use tracing_subscriber::EnvFilter;

use fleet_corpus::config::{load_config, Config};
use fleet_corpus::error::StoreError;
use fleet_corpus::ingest::{generate_request_id, IngestRequest, IngestStatus, Ingestor};
use fleet_corpus::mapper::MAPPER_VERSION;
use fleet_corpus::query::CorpusQueryEngine;
use fleet_corpus::store::{DocumentStore, SqliteStore};
use fleet_corpus::{db, migrate, server, stats};

/// Fleet Corpus: vehicle inventory batches stored as versioned XML
/// documents, with corpus-wide analytical queries.
#[derive(Parser)]
#[command(name = "fleet", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/fleet.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest one delimited inventory file.
    ///
    /// Runs the full pipeline in the foreground and prints the final
    /// status. Exits non-zero unless the batch was stored.
    Ingest {
        /// Path to the batch file (header row first).
        file: PathBuf,

        /// Request id recorded in the document provenance.
        #[arg(long)]
        request_id: Option<String>,

        /// Version tag stored with the row.
        #[arg(long, default_value = MAPPER_VERSION)]
        mapper_version: String,

        /// Webhook to notify with the final status.
        #[arg(long)]
        webhook_url: Option<String>,
    },

    /// Run a corpus query and print the result as JSON.
    Query {
        #[command(subcommand)]
        kind: QueryKind,
    },

    /// Show corpus statistics.
    Stats,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum QueryKind {
    /// Distinct vehicles whose designation contains the term.
    Brand { term: String },
    /// Distinct vehicles whose category contains the term.
    Segment { term: String },
    /// Distinct vehicles whose city contains the term.
    Location { term: String },
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&config).await?;
            println!("Database initialized at {}", config.db.path.display());
        }
        Commands::Ingest {
            file,
            request_id,
            mapper_version,
            webhook_url,
        } => {
            run_ingest(&config, file, request_id, mapper_version, webhook_url).await?;
        }
        Commands::Query { kind } => {
            run_query(&config, kind).await?;
        }
        Commands::Stats => {
            stats::run_stats(&config).await?;
        }
        Commands::Serve => {
            server::run_server(&config).await?;
        }
    }

    Ok(())
}

async fn open_store(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    let pool = db::connect(config).await?;
    Ok(Arc::new(SqliteStore::new(pool)))
}

async fn run_ingest(
    config: &Config,
    file: PathBuf,
    request_id: Option<String>,
    mapper_version: String,
    webhook_url: Option<String>,
) -> Result<()> {
    let payload = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());

    let store = open_store(config).await?;
    let ingestor = if webhook_url.is_none() && config.webhook.default_url.is_none() {
        Ingestor::offline(config, store)
    } else {
        Ingestor::from_config(config, store)?
    };
    let request = IngestRequest {
        request_id: request_id.unwrap_or_else(generate_request_id),
        file_name,
        mapper_version,
        webhook_url,
        payload,
    };

    let outcome = ingestor.run_and_notify(&request).await;
    println!("Request: {}", outcome.request_id);
    println!("Status:  {}", outcome.status);
    if let Some(row_id) = outcome.row_id {
        println!("Row:     {}", row_id);
        println!("Records: {}", outcome.records);
    }

    if outcome.status != IngestStatus::Success {
        anyhow::bail!(
            "ingest of {} failed: {}",
            outcome.file_name,
            outcome.error.unwrap_or_else(|| outcome.status.to_string())
        );
    }
    Ok(())
}

#[derive(Serialize, Default)]
struct SegmentCount {
    count: i64,
}

/// Print the result; on a store failure print the zero-valued result and fail.
fn print_result<T: Serialize + Default>(result: Result<T, StoreError>) -> Result<()> {
    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&T::default())?);
            Err(anyhow::Error::new(e).context("query failed: store unavailable"))
        }
    }
}

async fn run_query(config: &Config, kind: QueryKind) -> Result<()> {
    let engine = CorpusQueryEngine::new(open_store(config).await?);
    match kind {
        QueryKind::Brand { term } => print_result(engine.brand_stats(&term).await),
        QueryKind::Segment { term } => print_result(
            engine
                .segment_count(&term)
                .await
                .map(|count| SegmentCount { count }),
        ),
        QueryKind::Location { term } => print_result(engine.location_stats(&term).await),
    }
}
