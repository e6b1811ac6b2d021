use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Result;
use tracing::info;

use crate::database_ops::bulk::LoadStatus;
use crate::database_ops::db::Db;
use crate::database_ops::memory::MemoryStore;
use crate::pipeline::{self, Entity, PipelineConfig, RunSummary};
use crate::util::env as env_util;

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub entity: Entity,
    /// Input file for a single-entity run (overrides `USERS_JSON` etc).
    pub file: Option<PathBuf>,
    /// Optional override for the Postgres connection string.
    pub database_url: Option<String>,
    /// Load into an in-memory store instead of Postgres.
    pub dry_run: bool,
    pub json: bool,
}

pub async fn run(cfg: IngestConfig) -> Result<RunSummary> {
    env_util::init_env();
    let mut pipeline_cfg = PipelineConfig::from_env();
    if let Some(file) = cfg.file.clone() {
        pipeline_cfg = pipeline_cfg.with_file(cfg.entity, file);
    }

    let summary = if cfg.dry_run {
        info!(entity = %cfg.entity, "dry run: loading into memory");
        let store = MemoryStore::new();
        pipeline::run(&store, &pipeline_cfg, cfg.entity).await?
    } else {
        let db_url = match cfg.database_url.clone() {
            Some(url) => url,
            None => env_util::db_url()?,
        };
        info!(url = %env_util::redact_postgres_url(&db_url), "connecting");
        let db = Db::connect(&db_url, pipeline_cfg.max_connections)
            .await?
            .with_chunk_rows(pipeline_cfg.chunk_rows);
        let result = pipeline::run(&db, &pipeline_cfg, cfg.entity).await;
        db.close().await;
        result?
    };

    if cfg.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", render(&summary));
    }
    Ok(summary)
}

pub fn render(summary: &RunSummary) -> String {
    let mut out = String::new();
    writeln!(out, "INGEST SUMMARY ({}):", summary.entity).ok();
    for stage in &summary.stages {
        let status = match &stage.load.status {
            LoadStatus::Inserted => "ok".to_string(),
            LoadStatus::Empty => "empty".to_string(),
            LoadStatus::Failed { error } => format!("FAILED: {error}"),
            LoadStatus::NotAttempted { reason } => format!("not attempted: {reason}"),
        };
        writeln!(out, "{}: {status}", stage.table).ok();
        writeln!(
            out,
            "  documents: {} (skipped lines: {}, skipped records: {})",
            stage.documents,
            stage.skipped_lines,
            stage.skipped_records.len()
        )
        .ok();
        writeln!(
            out,
            "  rows: {} (generated ids: {}, unresolved references: {}{})",
            stage.rows,
            stage.generated_ids,
            stage.unresolved_references,
            if stage.sentinel_seeded {
                ", +1 sentinel"
            } else {
                ""
            }
        )
        .ok();
        writeln!(
            out,
            "  inserted: {} ignored: {}",
            stage.load.inserted, stage.load.ignored
        )
        .ok();
    }
    out
}
