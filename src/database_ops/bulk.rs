//! Batched insert-if-absent with per-table failure containment.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{error, info, warn};

use super::store::{TableRow, WarehouseStore};
use crate::normalization::records::Table;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadStatus {
    Inserted,
    /// Nothing to write.
    Empty,
    /// The batch was rolled back.
    Failed { error: String },
    /// Not attempted because an upstream stage failed.
    NotAttempted { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadOutcome {
    pub table: Table,
    /// Rows handed to the loader, before in-batch key collapsing.
    pub attempted: usize,
    pub inserted: u64,
    /// Rows dropped by key conflicts (in the batch or with existing rows).
    pub ignored: u64,
    #[serde(flatten)]
    pub status: LoadStatus,
}

impl LoadOutcome {
    pub fn failed(table: Table, attempted: usize, error: impl Into<String>) -> Self {
        Self {
            table,
            attempted,
            inserted: 0,
            ignored: 0,
            status: LoadStatus::Failed {
                error: error.into(),
            },
        }
    }

    pub fn not_attempted(table: Table, attempted: usize, reason: impl Into<String>) -> Self {
        Self {
            table,
            attempted,
            inserted: 0,
            ignored: 0,
            status: LoadStatus::NotAttempted {
                reason: reason.into(),
            },
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, LoadStatus::Failed { .. })
    }
}

/// Keep the first row per primary key.
fn collapse_duplicate_keys<R: TableRow>(rows: &[R]) -> Vec<R> {
    let mut seen = HashSet::with_capacity(rows.len());
    rows.iter()
        .filter(|row| seen.insert(row.primary_key()))
        .cloned()
        .collect()
}

/// Write one table's batch. Store errors are reported in the outcome, never
/// propagated: one table failing leaves the other stages running.
pub async fn upsert_batch<S, R>(store: &S, rows: &[R]) -> LoadOutcome
where
    S: WarehouseStore,
    R: TableRow,
{
    let table = R::TABLE;
    let attempted = rows.len();
    if rows.is_empty() {
        warn!(%table, "no rows to upsert; skipping");
        return LoadOutcome {
            table,
            attempted,
            inserted: 0,
            ignored: 0,
            status: LoadStatus::Empty,
        };
    }

    let unique = collapse_duplicate_keys(rows);
    if unique.len() < attempted {
        warn!(
            %table,
            duplicates = attempted - unique.len(),
            "duplicate primary keys in batch; keeping first occurrence"
        );
    }

    match store.upsert_batch(&unique).await {
        Ok(inserted) => {
            let ignored = (attempted as u64).saturating_sub(inserted);
            info!(%table, attempted, inserted, ignored, "upserted batch");
            LoadOutcome {
                table,
                attempted,
                inserted,
                ignored,
                status: LoadStatus::Inserted,
            }
        }
        Err(e) => {
            error!(%table, attempted, error = ?e, "batch upsert failed; rolled back");
            LoadOutcome::failed(table, attempted, format!("{e:#}"))
        }
    }
}
