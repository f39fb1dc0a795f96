//! # Collection Harness CLI (`chx`)
//!
//! ## Usage
//!
//! ```bash
//! chx --config ./config/chx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `chx sync` | Page remote collections into the record store |
//! | `chx enrich` | Annotate eligible records |
//! | `chx status` | Show watermarks and enrichment counters |
//! | `chx get <id>` | Print one record as JSON |
//! | `chx export <collection>` | Print recent records as JSON Lines |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use collection_harness::enrich::{self, EnrichOptions};
use collection_harness::ingest::{self, SyncMode, SyncOptions};
use collection_harness::progress::ProgressMode;
use collection_harness::{config, export, get, logging, status};

/// Collection Harness CLI — incremental ingestion and enrichment of
/// paginated remote collections.
#[derive(Parser)]
#[command(
    name = "chx",
    about = "Collection Harness — incremental ingestion and enrichment of remote collections",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/chx.toml")]
    config: PathBuf,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch collections page by page and merge items into the store.
    ///
    /// Watermarks are committed after every collection, including ones
    /// that fail partway, so the next run picks up where this one stopped.
    Sync {
        /// `incremental` stops at known newest items, `backfill` pages
        /// down to older ones, `full` ignores watermarks.
        #[arg(long, value_enum, default_value = "incremental")]
        mode: SyncMode,

        /// Only sync this collection slug.
        #[arg(long)]
        collection: Option<String>,

        /// Download media for synced records into the store.
        #[arg(long)]
        download_media: bool,
    },

    /// Annotate records that have media and no enrichment yet.
    Enrich {
        /// Re-annotate records that already have an enrichment (including failures).
        #[arg(long)]
        force: bool,

        /// List what would be annotated without calling the service.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of records to annotate in this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Only annotate records belonging to this collection.
        #[arg(long)]
        collection: Option<String>,
    },

    /// Show per-collection watermarks and enrichment counters.
    Status,

    /// Print a record by id.
    Get {
        id: i64,
    },

    /// Print records of a collection posted in the last N hours as JSON Lines.
    Export {
        collection: String,

        #[arg(long, default_value_t = 24)]
        hours: i64,

        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config(&cli.config)?;
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Sync {
            mode,
            collection,
            download_media,
        } => {
            let opts = SyncOptions {
                mode,
                collection,
                download_media,
            };
            ingest::run_sync(&cfg, &opts, progress).await?;
        }
        Commands::Enrich {
            force,
            dry_run,
            limit,
            collection,
        } => {
            let opts = EnrichOptions {
                force,
                dry_run,
                limit,
                collection,
            };
            enrich::run_enrich(&cfg, &opts, progress).await?;
        }
        Commands::Status => {
            status::run_status(&cfg)?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, id)?;
        }
        Commands::Export {
            collection,
            hours,
            output,
        } => {
            export::run_export(&cfg, &collection, hours, output.as_deref())?;
        }
    }

    Ok(())
}
