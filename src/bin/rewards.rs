use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use rewards_warehouse::cli::audit::{self, AuditConfig};
use rewards_warehouse::cli::ingest::{self, IngestConfig};
use rewards_warehouse::pipeline::Entity;
use rewards_warehouse::util::env;
use rewards_warehouse::util::logging::{init_tracing, DEFAULT_FILTER};

#[derive(Parser, Debug)]
#[command(name = "rewards", version, about = "Receipt rewards export loader")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Normalize an export and insert it into the warehouse (insert-if-absent)
    Ingest {
        #[arg(value_enum)]
        entity: Entity,
        /// Input file (single entity only; defaults to USERS_JSON/BRANDS_JSON/RECEIPTS_JSON)
        #[arg(long)]
        file: Option<PathBuf>,
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
        /// Load into an in-memory store; nothing is written to the database
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Print the run summary as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Report data-quality issues in an export without loading it
    Audit {
        #[arg(value_enum)]
        entity: Entity,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env::init_env();
    init_tracing(DEFAULT_FILTER)?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Ingest {
            entity,
            file,
            db_url,
            dry_run,
            json,
        } => {
            let summary = ingest::run(IngestConfig {
                entity,
                file,
                database_url: db_url,
                dry_run,
                json,
            })
            .await?;
            let failed = summary.failed_tables();
            if !failed.is_empty() {
                let names: Vec<&str> = failed.iter().map(|t| t.name()).collect();
                bail!("load failed for: {}", names.join(", "));
            }
        }
        Commands::Audit { entity, file, json } => {
            audit::run(AuditConfig { entity, file, json })?;
        }
    }
    Ok(())
}
