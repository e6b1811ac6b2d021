use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::identifier::SENTINEL_ID;

pub const DEFAULT_ROLE: &str = "consumer";
pub const UNKNOWN_BRAND_TITLE: &str = "Unknown Brand";
pub const UNKNOWN_STATUS: &str = "UNKNOWN";

/// Warehouse tables written by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Users,
    Brands,
    Receipts,
    ReceiptItems,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Users,
        Table::Brands,
        Table::Receipts,
        Table::ReceiptItems,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Users => "dim_users",
            Table::Brands => "dim_brands",
            Table::Receipts => "fact_receipts",
            Table::ReceiptItems => "fact_receipt_items",
        }
    }

    pub fn primary_key(self) -> &'static str {
        self.columns()[0]
    }

    /// Insert column order; the primary key comes first.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Table::Users => &[
                "user_id",
                "user_state",
                "account_created_date",
                "last_login_date",
                "user_role",
                "is_active",
            ],
            Table::Brands => &[
                "brand_id",
                "brand_title",
                "brand_category",
                "brand_category_code",
                "brand_barcode",
                "is_top_brand",
            ],
            Table::Receipts => &[
                "receipt_id",
                "receipt_user_id",
                "purchase_timestamp",
                "scanned_date",
                "processing_finished_date",
                "receipt_status",
                "total_amount_spent",
                "items_purchased_count",
                "reward_points_earned",
                "extra_bonus_points",
                "points_awarded_timestamp",
            ],
            Table::ReceiptItems => &[
                "receipt_item_id",
                "item_receipt_id",
                "item_brand_id",
                "item_barcode",
                "item_quantity",
                "item_price",
            ],
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRow {
    pub user_id: Uuid,
    pub state: Option<String>,
    pub account_created_date: Option<DateTime<Utc>>,
    pub last_login_date: Option<DateTime<Utc>>,
    pub role: String,
    pub is_active: bool,
}

impl UserRow {
    /// Placeholder dimension row keyed by the sentinel identifier.
    pub fn unknown() -> Self {
        Self {
            user_id: SENTINEL_ID,
            state: None,
            account_created_date: None,
            last_login_date: None,
            role: DEFAULT_ROLE.to_string(),
            is_active: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrandRow {
    pub brand_id: Uuid,
    pub title: String,
    pub category: Option<String>,
    pub category_code: Option<String>,
    pub barcode: Option<String>,
    pub is_top_brand: bool,
}

impl BrandRow {
    /// Placeholder dimension row keyed by the sentinel identifier.
    pub fn unknown() -> Self {
        Self {
            brand_id: SENTINEL_ID,
            title: UNKNOWN_BRAND_TITLE.to_string(),
            category: None,
            category_code: None,
            barcode: None,
            is_top_brand: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptRow {
    pub receipt_id: Uuid,
    pub user_id: Uuid,
    pub purchase_timestamp: Option<DateTime<Utc>>,
    pub scanned_date: Option<DateTime<Utc>>,
    pub processing_finished_date: Option<DateTime<Utc>>,
    pub points_awarded_timestamp: Option<DateTime<Utc>>,
    pub status: String,
    pub total_amount_spent: f64,
    pub items_purchased_count: i64,
    pub reward_points_earned: i64,
    pub extra_bonus_points: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptItemRow {
    pub receipt_item_id: Uuid,
    pub receipt_id: Uuid,
    pub brand_id: Uuid,
    pub barcode: Option<String>,
    pub quantity: i64,
    pub price: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_key_is_first_column() {
        assert_eq!(Table::Users.primary_key(), "user_id");
        assert_eq!(Table::Brands.primary_key(), "brand_id");
        assert_eq!(Table::Receipts.primary_key(), "receipt_id");
        assert_eq!(Table::ReceiptItems.primary_key(), "receipt_item_id");
        assert_eq!(Table::Receipts.columns().len(), 11);
    }
}
