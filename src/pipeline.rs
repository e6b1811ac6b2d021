//! Run orchestration: load -> key snapshots -> normalize -> bulk upsert.
//!
//! Stages run strictly in sequence. An unreadable input file ends the run; a
//! store failure only ends its own stage.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::audit::tables::{audit_brands, audit_receipts, audit_users};
use crate::audit::AuditReport;
use crate::database_ops::bulk::{upsert_batch, LoadOutcome};
use crate::database_ops::db::DEFAULT_CHUNK_ROWS;
use crate::database_ops::store::{TableRow, WarehouseStore};
use crate::normalization::brands::normalize_brands;
use crate::normalization::document::load_file;
use crate::normalization::receipts::normalize_receipts;
use crate::normalization::records::{BrandRow, Table, UserRow};
use crate::normalization::users::normalize_users;
use crate::normalization::{NormalizeOutcome, SkipRecord};
use crate::util::env::{env_flag, env_opt, env_parse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Users,
    Brands,
    Receipts,
    All,
}

impl Entity {
    fn includes(self, other: Entity) -> bool {
        self == Entity::All || self == other
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Users => "users",
            Entity::Brands => "brands",
            Entity::Receipts => "receipts",
            Entity::All => "all",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineConfig {
    pub users_path: PathBuf,
    pub brands_path: PathBuf,
    pub receipts_path: PathBuf,
    pub chunk_rows: usize,
    /// Append the "unknown" user/brand rows keyed by the sentinel identifier.
    pub seed_sentinel_rows: bool,
    pub max_connections: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            users_path: PathBuf::from("users.json"),
            brands_path: PathBuf::from("brands.json"),
            receipts_path: PathBuf::from("receipts.json"),
            chunk_rows: DEFAULT_CHUNK_ROWS,
            seed_sentinel_rows: true,
            max_connections: 1,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            users_path: env_opt("USERS_JSON").map_or(defaults.users_path, PathBuf::from),
            brands_path: env_opt("BRANDS_JSON").map_or(defaults.brands_path, PathBuf::from),
            receipts_path: env_opt("RECEIPTS_JSON").map_or(defaults.receipts_path, PathBuf::from),
            chunk_rows: env_parse("UPSERT_CHUNK_ROWS", defaults.chunk_rows).max(1),
            seed_sentinel_rows: env_flag("SEED_SENTINEL_ROWS", defaults.seed_sentinel_rows),
            max_connections: env_parse("DB_MAX_CONNS", defaults.max_connections).max(1),
        }
    }

    /// Point a single-entity run at an explicit file.
    pub fn with_file(mut self, entity: Entity, file: PathBuf) -> Self {
        match entity {
            Entity::Users => self.users_path = file,
            Entity::Brands => self.brands_path = file,
            Entity::Receipts => self.receipts_path = file,
            Entity::All => warn!("--file ignored for `all`; using per-entity paths"),
        }
        self
    }
}

/// What one table's stage did, from parsing to insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub table: Table,
    /// Source documents (receipt item list entries for the items stage).
    pub documents: usize,
    pub skipped_lines: usize,
    pub rows: usize,
    pub skipped_records: Vec<SkipRecord>,
    pub generated_ids: usize,
    pub unresolved_references: usize,
    pub sentinel_seeded: bool,
    pub load: LoadOutcome,
}

impl StageReport {
    fn new<T>(
        documents: usize,
        skipped_lines: usize,
        outcome: &NormalizeOutcome<T>,
        sentinel_seeded: bool,
        load: LoadOutcome,
    ) -> Self {
        Self {
            table: outcome.table,
            documents,
            skipped_lines,
            rows: outcome.rows.len(),
            skipped_records: outcome.skipped.clone(),
            generated_ids: outcome.generated_ids,
            unresolved_references: outcome.unresolved_references,
            sentinel_seeded,
            load,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub entity: Entity,
    pub stages: Vec<StageReport>,
}

impl RunSummary {
    pub fn failed_tables(&self) -> Vec<Table> {
        self.stages
            .iter()
            .filter(|s| s.load.is_failed())
            .map(|s| s.table)
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.failed_tables().is_empty()
    }
}

fn with_sentinel<R: TableRow>(outcome: &NormalizeOutcome<R>, sentinel: R, seed: bool) -> Vec<R> {
    let mut rows = outcome.rows.clone();
    if seed {
        // Source rows come first, so a real row with the sentinel key wins.
        rows.push(sentinel);
    }
    rows
}

#[instrument(skip_all)]
pub async fn run_users<S: WarehouseStore>(store: &S, cfg: &PipelineConfig) -> Result<StageReport> {
    let source = load_file(&cfg.users_path)?;
    let outcome = normalize_users(&source.documents);
    let rows = with_sentinel(&outcome, UserRow::unknown(), cfg.seed_sentinel_rows);
    let load = upsert_batch(store, &rows).await;
    Ok(StageReport::new(
        source.documents.len(),
        source.skipped_lines.len(),
        &outcome,
        cfg.seed_sentinel_rows,
        load,
    ))
}

#[instrument(skip_all)]
pub async fn run_brands<S: WarehouseStore>(
    store: &S,
    cfg: &PipelineConfig,
) -> Result<StageReport> {
    let source = load_file(&cfg.brands_path)?;
    let outcome = normalize_brands(&source.documents);
    let rows = with_sentinel(&outcome, BrandRow::unknown(), cfg.seed_sentinel_rows);
    let load = upsert_batch(store, &rows).await;
    Ok(StageReport::new(
        source.documents.len(),
        source.skipped_lines.len(),
        &outcome,
        cfg.seed_sentinel_rows,
        load,
    ))
}

/// Keys present before the receipts stage writes anything.
struct KeySnapshot {
    users: HashSet<Uuid>,
    brands: HashSet<Uuid>,
    receipts: HashSet<Uuid>,
}

async fn key_snapshot<S: WarehouseStore>(store: &S) -> Result<KeySnapshot> {
    let users = store.fetch_key_set(Table::Users).await?;
    let brands = store.fetch_key_set(Table::Brands).await?;
    let receipts = store.fetch_key_set(Table::Receipts).await?;
    info!(
        users = users.len(),
        brands = brands.len(),
        receipts = receipts.len(),
        "key snapshot taken"
    );
    Ok(KeySnapshot {
        users,
        brands,
        receipts,
    })
}

/// Receipts, then their items. Returns two stage reports.
#[instrument(skip_all)]
pub async fn run_receipts<S: WarehouseStore>(
    store: &S,
    cfg: &PipelineConfig,
) -> Result<Vec<StageReport>> {
    let source = load_file(&cfg.receipts_path)?;
    let documents = source.documents.len();
    let skipped_lines = source.skipped_lines.len();

    let keys = match key_snapshot(store).await {
        Ok(keys) => keys,
        Err(e) => {
            error!(error = ?e, "key snapshot failed; receipts not loaded");
            let reason = format!("key snapshot failed: {e:#}");
            return Ok(vec![
                StageReport::new(
                    documents,
                    skipped_lines,
                    &NormalizeOutcome::<()>::new(Table::Receipts),
                    false,
                    LoadOutcome::failed(Table::Receipts, documents, reason.clone()),
                ),
                StageReport::new(
                    0,
                    0,
                    &NormalizeOutcome::<()>::new(Table::ReceiptItems),
                    false,
                    LoadOutcome::not_attempted(Table::ReceiptItems, 0, reason),
                ),
            ]);
        }
    };

    let batch = normalize_receipts(
        &source.documents,
        &keys.users,
        &keys.brands,
        &keys.receipts,
    );
    let receipts_load = upsert_batch(store, &batch.receipts.rows).await;
    let items_load = if receipts_load.is_failed() {
        warn!("receipts load failed; skipping receipt items");
        LoadOutcome::not_attempted(
            Table::ReceiptItems,
            batch.items.rows.len(),
            "receipts load failed",
        )
    } else {
        upsert_batch(store, &batch.items.rows).await
    };

    Ok(vec![
        StageReport::new(documents, skipped_lines, &batch.receipts, false, receipts_load),
        StageReport::new(batch.item_entries, 0, &batch.items, false, items_load),
    ])
}

/// Run one entity (or all of them, dimensions first).
pub async fn run<S: WarehouseStore>(
    store: &S,
    cfg: &PipelineConfig,
    entity: Entity,
) -> Result<RunSummary> {
    info!(%entity, "pipeline run starting");
    let mut stages = Vec::new();
    if entity.includes(Entity::Users) {
        stages.push(run_users(store, cfg).await?);
    }
    if entity.includes(Entity::Brands) {
        stages.push(run_brands(store, cfg).await?);
    }
    if entity.includes(Entity::Receipts) {
        stages.extend(run_receipts(store, cfg).await?);
    }
    let summary = RunSummary { entity, stages };
    if summary.is_success() {
        info!(%entity, stages = summary.stages.len(), "pipeline run finished");
    } else {
        warn!(%entity, failed = ?summary.failed_tables(), "pipeline run finished with failures");
    }
    Ok(summary)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditSummary {
    pub entity: Entity,
    pub reports: Vec<AuditReport>,
}

/// Read-only quality audit over the raw exports. Never touches the store.
pub fn audit(cfg: &PipelineConfig, entity: Entity) -> Result<AuditSummary> {
    let mut reports = Vec::new();
    if entity.includes(Entity::Users) {
        reports.push(audit_users(&load_file(&cfg.users_path)?.documents));
    }
    if entity.includes(Entity::Brands) {
        reports.push(audit_brands(&load_file(&cfg.brands_path)?.documents));
    }
    if entity.includes(Entity::Receipts) {
        let audited = audit_receipts(&load_file(&cfg.receipts_path)?.documents);
        reports.push(audited.receipts);
        reports.push(audited.items);
    }
    Ok(AuditSummary { entity, reports })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::bulk::LoadStatus;
    use crate::database_ops::memory::MemoryStore;
    use crate::normalization::identifier::SENTINEL_ID;
    use std::fs;
    use std::path::Path;

    struct Fixture {
        dir: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = std::env::temp_dir().join(format!("pipeline-{}", Uuid::new_v4()));
            fs::create_dir_all(&dir).unwrap();
            Self { dir }
        }

        fn write(&self, name: &str, body: &str) -> PathBuf {
            let path = self.dir.join(name);
            fs::write(&path, body).unwrap();
            path
        }

        fn config(&self, users: &str, brands: &str, receipts: &str) -> PipelineConfig {
            PipelineConfig {
                users_path: self.write("users.json", users),
                brands_path: self.write("brands.json", brands),
                receipts_path: self.write("receipts.json", receipts),
                ..PipelineConfig::default()
            }
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }

    const USER_ID: &str = "8d0a3f7e-2b1c-4c55-9a0e-1f2f6b1c7a01";
    const BRAND_ID: &str = "4b4f6c3e-9d0a-4b8e-8f57-0c1d2e3f4a5b";

    fn users_ndjson() -> String {
        format!(
            "{{\"_id\": {{\"$oid\": \"{USER_ID}\"}}, \"state\": \"wi\", \"active\": true}}\n\
             {{\"_id\": {{\"$oid\": \"5ff1e194b6a9d73a3a9f1052\"}}, \"role\": \"consumer\"}}\n\
             not json\n"
        )
    }

    fn brands_json() -> String {
        format!("[{{\"_id\": {{\"$oid\": \"{BRAND_ID}\"}}, \"name\": \"Acme\"}}, {{\"barcode\": 511}}]")
    }

    fn receipts_ndjson() -> String {
        format!(
            "{{\"userId\": \"{USER_ID}\", \"totalSpent\": \"10.00\", \"rewardsReceiptItemList\": \
             [{{\"partnerItemId\": \"{BRAND_ID}\", \"finalPrice\": \"10.00\"}}, {{\"barcode\": \"9\"}}]}}\n\
             {{\"userId\": \"somebody-else\"}}\n"
        )
    }

    #[tokio::test]
    async fn all_entities_load_in_dependency_order() {
        let fx = Fixture::new();
        let cfg = fx.config(&users_ndjson(), &brands_json(), &receipts_ndjson());
        let store = MemoryStore::new();

        let summary = run(&store, &cfg, Entity::All).await.unwrap();
        assert!(summary.is_success());
        let tables: Vec<Table> = summary.stages.iter().map(|s| s.table).collect();
        assert_eq!(tables, Table::ALL.to_vec());

        let users = &summary.stages[0];
        assert_eq!(users.documents, 2);
        assert_eq!(users.skipped_lines, 1);
        assert_eq!(users.generated_ids, 1);
        assert!(users.sentinel_seeded);
        // two users + the sentinel row
        assert_eq!(users.load.inserted, 3);
        assert_eq!(store.row_count(Table::Users), 3);
        assert_eq!(store.row_count(Table::Brands), 3);

        let receipts = &summary.stages[2];
        assert_eq!(receipts.rows, 2);
        assert_eq!(receipts.unresolved_references, 1);
        let items = &summary.stages[3];
        assert_eq!(items.rows, 2);
        assert_eq!(items.unresolved_references, 1);

        let user_id = Uuid::parse_str(USER_ID).unwrap();
        let stored_user = store.row(Table::Users, user_id).unwrap();
        assert_eq!(stored_user["state"], "WI");
    }

    #[tokio::test]
    async fn rerun_inserts_nothing_new_for_dimensions() {
        let fx = Fixture::new();
        let cfg = fx.config(&format!("{{\"_id\": {{\"$oid\": \"{USER_ID}\"}}}}\n"), "[]", "");
        let store = MemoryStore::new();

        let first = run(&store, &cfg, Entity::Users).await.unwrap();
        assert_eq!(first.stages[0].load.inserted, 2);
        let second = run(&store, &cfg, Entity::Users).await.unwrap();
        assert_eq!(second.stages[0].load.inserted, 0);
        assert_eq!(second.stages[0].load.ignored, 2);
        assert_eq!(store.row_count(Table::Users), 2);
    }

    #[tokio::test]
    async fn foreign_keys_use_snapshot_or_sentinel() {
        let fx = Fixture::new();
        let cfg = fx.config("", "", &receipts_ndjson());
        let user_id = Uuid::parse_str(USER_ID).unwrap();
        let store = MemoryStore::new().with_keys(Table::Users, [user_id]);

        let summary = run(&store, &cfg, Entity::Receipts).await.unwrap();
        assert_eq!(summary.stages.len(), 2);
        assert_eq!(summary.stages[0].unresolved_references, 1);
        // No brands in the snapshot: both items point at the sentinel.
        assert_eq!(summary.stages[1].unresolved_references, 2);

        for stage in &summary.stages {
            assert_eq!(stage.load.status, LoadStatus::Inserted);
        }
        assert_eq!(store.row_count(Table::Receipts), 2);
        assert_eq!(store.row_count(Table::ReceiptItems), 2);
        assert!(summary.stages[0].skipped_records.is_empty());
    }

    #[tokio::test]
    async fn failed_receipts_skip_items_and_spare_other_tables() {
        let fx = Fixture::new();
        let cfg = fx.config(&users_ndjson(), &brands_json(), &receipts_ndjson());
        let store = MemoryStore::new().failing_writes(Table::Receipts);

        let summary = run(&store, &cfg, Entity::All).await.unwrap();
        assert!(!summary.is_success());
        assert_eq!(summary.failed_tables(), vec![Table::Receipts]);
        assert_eq!(store.row_count(Table::Users), 3);
        assert_eq!(store.row_count(Table::Brands), 3);
        assert_eq!(store.row_count(Table::ReceiptItems), 0);
        assert!(matches!(
            summary.stages[3].load.status,
            LoadStatus::NotAttempted { .. }
        ));
    }

    #[tokio::test]
    async fn key_snapshot_failure_fails_receipts_stage_only() {
        let fx = Fixture::new();
        let cfg = fx.config("", "", &receipts_ndjson());
        let store = MemoryStore::new().failing(Table::Brands);

        let summary = run(&store, &cfg, Entity::Receipts).await.unwrap();
        assert_eq!(summary.failed_tables(), vec![Table::Receipts]);
        assert_eq!(store.row_count(Table::Receipts), 0);
    }

    #[tokio::test]
    async fn items_follow_the_receipt_row_that_was_kept() {
        const RECEIPT_ID: &str = "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11";
        let receipts = format!(
            "{{\"_id\": {{\"$oid\": \"{RECEIPT_ID}\"}}, \"rewardsReceiptItemList\": [{{\"barcode\": \"1\"}}]}}\n\
             {{\"_id\": {{\"$oid\": \"{RECEIPT_ID}\"}}, \"rewardsReceiptItemList\": [{{\"barcode\": \"2\"}}, {{\"barcode\": \"3\"}}]}}\n"
        );
        let fx = Fixture::new();
        let cfg = fx.config("", "", &receipts);
        let store = MemoryStore::new();

        let first = run(&store, &cfg, Entity::Receipts).await.unwrap();
        assert_eq!(store.row_count(Table::Receipts), 1);
        assert_eq!(store.row_count(Table::ReceiptItems), 1);
        assert_eq!(first.stages[0].load.ignored, 1);
        assert_eq!(first.stages[1].documents, 3);
        assert_eq!(first.stages[1].skipped_records.len(), 1);

        let second = run(&store, &cfg, Entity::Receipts).await.unwrap();
        assert!(second.is_success());
        assert_eq!(store.row_count(Table::Receipts), 1);
        assert_eq!(store.row_count(Table::ReceiptItems), 1);
        assert_eq!(second.stages[1].rows, 0);
        assert_eq!(second.stages[1].skipped_records.len(), 2);
        assert_eq!(second.stages[1].load.status, LoadStatus::Empty);
    }

    #[tokio::test]
    async fn missing_input_file_is_fatal() {
        let cfg = PipelineConfig {
            users_path: Path::new("/no/such/dir/users.json").to_path_buf(),
            ..PipelineConfig::default()
        };
        let store = MemoryStore::new();
        let err = run(&store, &cfg, Entity::Users).await.unwrap_err();
        assert!(format!("{err:#}").contains("users.json"));
    }

    #[tokio::test]
    async fn sentinel_rows_can_be_disabled() {
        let fx = Fixture::new();
        let mut cfg = fx.config("", &brands_json(), "");
        cfg.seed_sentinel_rows = false;
        let store = MemoryStore::new();
        let summary = run(&store, &cfg, Entity::Brands).await.unwrap();
        assert!(!summary.stages[0].sentinel_seeded);
        assert_eq!(store.row_count(Table::Brands), 2);
        assert!(store.row(Table::Brands, SENTINEL_ID).is_none());
    }

    #[test]
    fn audit_reports_every_table_for_all() {
        let fx = Fixture::new();
        let cfg = fx.config(&users_ndjson(), &brands_json(), &receipts_ndjson());
        let summary = audit(&cfg, Entity::All).unwrap();
        let tables: Vec<Table> = summary.reports.iter().map(|r| r.table).collect();
        assert_eq!(tables, Table::ALL.to_vec());
        assert_eq!(summary.reports[0].records, 2);
        assert_eq!(summary.reports[0].domain_violations["state"], 1);
        assert_eq!(summary.reports[3].records, 2);
    }

    #[test]
    fn file_override_targets_one_entity() {
        let cfg = PipelineConfig::default().with_file(Entity::Brands, PathBuf::from("b.ndjson"));
        assert_eq!(cfg.brands_path, PathBuf::from("b.ndjson"));
        assert_eq!(cfg.users_path, PathBuf::from("users.json"));
    }
}
