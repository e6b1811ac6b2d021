use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool, Postgres, QueryBuilder,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::store::{TableRow, WarehouseStore};
use crate::normalization::records::Table;

/// Postgres caps a single statement at 65535 bind parameters.
pub const MAX_BIND_PARAMS: usize = 65_535;
pub const DEFAULT_CHUNK_ROWS: usize = 1_000;

#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
    chunk_rows: usize,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let mut connect_options =
            PgConnectOptions::from_str(database_url).context("parse database url")?;

        if database_url.contains("sslmode=require") && !database_url.contains("sslmode=disable") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }
        // PgBouncer txn mode safe
        connect_options = connect_options.statement_cache_capacity(0);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await
            .context("connect to warehouse")?;
        info!("connected to db");
        Ok(Self {
            pool,
            chunk_rows: DEFAULT_CHUNK_ROWS,
        })
    }

    /// Rows per INSERT statement; clamped to the bind-parameter limit per table.
    pub fn with_chunk_rows(mut self, chunk_rows: usize) -> Self {
        self.chunk_rows = chunk_rows.max(1);
        self
    }

    pub fn chunk_rows_for(&self, table: Table) -> usize {
        self.chunk_rows
            .min(MAX_BIND_PARAMS / table.columns().len())
            .max(1)
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("db pool closed");
    }
}

fn insert_prefix(table: Table) -> String {
    format!(
        "INSERT INTO {} ({}) ",
        table.name(),
        table.columns().join(", ")
    )
}

#[async_trait]
impl WarehouseStore for Db {
    #[instrument(skip(self))]
    async fn fetch_key_set(&self, table: Table) -> Result<HashSet<Uuid>> {
        let sql = format!("SELECT {} FROM {}", table.primary_key(), table.name());
        let keys: Vec<Uuid> = sqlx::query_scalar::<_, Uuid>(&sql)
            .persistent(false)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("fetch key set of {table}"))?;
        debug!(%table, keys = keys.len(), "fetched key set");
        Ok(keys.into_iter().collect())
    }

    #[instrument(skip(self, rows), fields(table = %R::TABLE, row_count = rows.len()))]
    async fn upsert_batch<R: TableRow>(&self, rows: &[R]) -> Result<u64> {
        let table = R::TABLE;
        let per_statement = self.chunk_rows_for(table);
        let mut tx = self
            .pool
            .begin()
            .await
            .with_context(|| format!("begin transaction for {table}"))?;

        let mut inserted = 0u64;
        for chunk in rows.chunks(per_statement) {
            let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(insert_prefix(table));
            qb.push_values(chunk, |mut b, row| row.push_binds(&mut b));
            qb.push(format!(" ON CONFLICT ({}) DO NOTHING", table.primary_key()));
            let done = qb
                .build()
                .persistent(false)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("insert into {table}"))?;
            inserted += done.rows_affected();
        }

        // Dropping `tx` on any error above rolls the whole batch back.
        tx.commit()
            .await
            .with_context(|| format!("commit {table} batch"))?;
        Ok(inserted)
    }
}
