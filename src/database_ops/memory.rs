//! In-process store with the same insert-ignore contract as Postgres.
//!
//! Used by `--dry-run` and by the pipeline tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::store::{TableRow, WarehouseStore};
use crate::normalization::records::Table;

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<Table, BTreeMap<Uuid, Value>>>,
    failing: HashSet<Table>,
    failing_writes: HashSet<Table>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-existing keys (rows loaded by an earlier run).
    pub fn with_keys(self, table: Table, keys: impl IntoIterator<Item = Uuid>) -> Self {
        {
            let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
            let rows = tables.entry(table).or_default();
            for key in keys {
                rows.entry(key).or_insert(Value::Null);
            }
        }
        self
    }

    /// Every operation on `table` fails.
    pub fn failing(mut self, table: Table) -> Self {
        self.failing.insert(table);
        self
    }

    /// Reads of `table` succeed; inserts into it fail.
    pub fn failing_writes(mut self, table: Table) -> Self {
        self.failing_writes.insert(table);
        self
    }

    pub fn row_count(&self, table: Table) -> usize {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables.get(&table).map_or(0, BTreeMap::len)
    }

    pub fn row(&self, table: Table, key: Uuid) -> Option<Value> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables.get(&table).and_then(|rows| rows.get(&key)).cloned()
    }

    fn check(&self, table: Table) -> Result<()> {
        if self.failing.contains(&table) {
            return Err(anyhow!("{table} is unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl WarehouseStore for MemoryStore {
    async fn fetch_key_set(&self, table: Table) -> Result<HashSet<Uuid>> {
        self.check(table)?;
        let tables = self
            .tables
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(tables
            .get(&table)
            .map(|rows| rows.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn upsert_batch<R: TableRow>(&self, rows: &[R]) -> Result<u64> {
        let table = R::TABLE;
        self.check(table)?;
        if self.failing_writes.contains(&table) {
            return Err(anyhow!("{table} rejected the insert"));
        }
        // Stage everything first so a failure leaves the table untouched.
        let staged = rows
            .iter()
            .map(|row| Ok((row.primary_key(), serde_json::to_value(row)?)))
            .collect::<Result<Vec<(Uuid, Value)>>>()
            .with_context(|| format!("serialize {table} rows"))?;

        let mut tables = self
            .tables
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        let target = tables.entry(table).or_default();
        let mut inserted = 0u64;
        for (key, value) in staged {
            if let std::collections::btree_map::Entry::Vacant(slot) = target.entry(key) {
                slot.insert(value);
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
