//! # Record Locator CLI (`rloc`)
//!
//! ## Usage
//!
//! ```bash
//! rloc --config ./config/rloc.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rloc serve` | Start the HTTP server |
//! | `rloc search "<query>"` | Run one search and print the JSON result |
//! | `rloc classify "<query>"` | Show how a query is classified (no config needed) |
//! | `rloc upload <dir>` | Upload a folder of scans to the bucket |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use record_locator::{classify, config, search::Searcher, server, storage::S3Store, upload};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Record Locator: find scanned student records by code or national ID.
#[derive(Parser)]
#[command(name = "rloc", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rloc.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind` and serves `GET /search` and `GET /health`
    /// until interrupted.
    Serve,

    /// Run a single search and print the result as JSON.
    Search {
        /// Student code or eight-digit national ID.
        query: String,
    },

    /// Show the classification and partitions for a query.
    Classify {
        query: String,
    },

    /// Upload every file under a directory to the bucket.
    ///
    /// Keys are the paths relative to the directory, so a folder laid out
    /// as `<namespace>/<year>/<file>` lands where searches expect it.
    Upload {
        /// Directory to upload.
        dir: PathBuf,

        /// Key prefix prepended to every uploaded key.
        #[arg(long)]
        prefix: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Classify { query } = &cli.command {
        let classified = classify::classify(query);
        let partitions = match classified.kind {
            record_locator::models::QueryKind::NationalId => Vec::new(),
            record_locator::models::QueryKind::Code => {
                classify::partitions_for(classified.partition_hint)
            }
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "query": classified,
                "partitions": partitions,
            }))?
        );
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Search { query } => {
            let searcher = Searcher::from_config(&cfg)?;
            let result = searcher.search(&query).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Upload { dir, prefix } => {
            let store = S3Store::from_env(&cfg.storage)?;
            let report = upload::upload_dir(&store, &dir, prefix.as_deref(), &cfg.upload).await?;
            println!(
                "uploaded: {}, failed: {}, skipped: {}",
                report.uploaded, report.failed, report.skipped
            );
            if report.failed > 0 {
                anyhow::bail!("{} file(s) failed to upload", report.failed);
            }
        }
        Commands::Classify { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
