use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use sqlx::query_builder::Separated;
use sqlx::Postgres;
use uuid::Uuid;

use crate::normalization::records::{BrandRow, ReceiptItemRow, ReceiptRow, Table, UserRow};

/// A warehouse row that knows its table and how to bind itself, column for
/// column, in [`Table::columns`] order.
pub trait TableRow: Serialize + Clone + Send + Sync + 'static {
    const TABLE: Table;

    fn primary_key(&self) -> Uuid;

    fn push_binds(&self, b: &mut Separated<'_, '_, Postgres, &'static str>);
}

/// The two store operations the pipeline needs.
#[async_trait]
pub trait WarehouseStore: Send + Sync {
    /// Full snapshot of one table's primary keys.
    async fn fetch_key_set(&self, table: Table) -> Result<HashSet<Uuid>>;

    /// Insert rows, ignoring primary-key conflicts. All or nothing; returns
    /// the number of rows actually inserted.
    async fn upsert_batch<R: TableRow>(&self, rows: &[R]) -> Result<u64>;
}

impl TableRow for UserRow {
    const TABLE: Table = Table::Users;

    fn primary_key(&self) -> Uuid {
        self.user_id
    }

    fn push_binds(&self, b: &mut Separated<'_, '_, Postgres, &'static str>) {
        b.push_bind(self.user_id)
            .push_bind(self.state.clone())
            .push_bind(self.account_created_date)
            .push_bind(self.last_login_date)
            .push_bind(self.role.clone())
            .push_bind(self.is_active);
    }
}

impl TableRow for BrandRow {
    const TABLE: Table = Table::Brands;

    fn primary_key(&self) -> Uuid {
        self.brand_id
    }

    fn push_binds(&self, b: &mut Separated<'_, '_, Postgres, &'static str>) {
        b.push_bind(self.brand_id)
            .push_bind(self.title.clone())
            .push_bind(self.category.clone())
            .push_bind(self.category_code.clone())
            .push_bind(self.barcode.clone())
            .push_bind(self.is_top_brand);
    }
}

impl TableRow for ReceiptRow {
    const TABLE: Table = Table::Receipts;

    fn primary_key(&self) -> Uuid {
        self.receipt_id
    }

    fn push_binds(&self, b: &mut Separated<'_, '_, Postgres, &'static str>) {
        b.push_bind(self.receipt_id)
            .push_bind(self.user_id)
            .push_bind(self.purchase_timestamp)
            .push_bind(self.scanned_date)
            .push_bind(self.processing_finished_date)
            .push_bind(self.status.clone())
            .push_bind(self.total_amount_spent)
            .push_bind(self.items_purchased_count)
            .push_bind(self.reward_points_earned)
            .push_bind(self.extra_bonus_points)
            .push_bind(self.points_awarded_timestamp);
    }
}

impl TableRow for ReceiptItemRow {
    const TABLE: Table = Table::ReceiptItems;

    fn primary_key(&self) -> Uuid {
        self.receipt_item_id
    }

    fn push_binds(&self, b: &mut Separated<'_, '_, Postgres, &'static str>) {
        b.push_bind(self.receipt_item_id)
            .push_bind(self.receipt_id)
            .push_bind(self.brand_id)
            .push_bind(self.barcode.clone())
            .push_bind(self.quantity)
            .push_bind(self.price);
    }
}
