//! Receipt + receipt item normalization.
//!
//! One source receipt produces exactly one receipt row and zero or more item
//! rows that share the receipt's key. Item rows never get their own source key.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::extract::{
    decimal, decimal_or, field, first_field, integer, integer_or, reference_candidate, text,
    timestamp,
};
use super::identifier::SENTINEL_ID;
use super::records::{ReceiptItemRow, ReceiptRow, Table, UNKNOWN_STATUS};
use super::reference::ReferenceResolver;
use super::{as_document, json_kind, primary_key, NormalizeOutcome, SkipReason};

pub const ITEM_LIST_KEY: &str = "rewardsReceiptItemList";
/// Item price keys in preference order.
pub const ITEM_PRICE_KEYS: [&str; 2] = ["finalPrice", "itemPrice"];

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedReceipt {
    pub receipt: ReceiptRow,
    pub items: Vec<ReceiptItemRow>,
    /// Item list entries that were not objects.
    pub skipped_items: Vec<SkipReason>,
    pub generated_id: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptBatch {
    pub receipts: NormalizeOutcome<ReceiptRow>,
    pub items: NormalizeOutcome<ReceiptItemRow>,
    /// Item list entries seen across all receipts, including dropped ones.
    pub item_entries: usize,
}

fn non_negative_decimal(value: Option<&Value>, default: f64) -> f64 {
    decimal(value).filter(|v| *v >= 0.0).unwrap_or(default)
}

fn non_negative_integer(value: Option<&Value>, default: i64) -> i64 {
    integer(value).filter(|v| *v >= 0).unwrap_or(default)
}

pub fn normalize_receipt_item(
    receipt_id: Uuid,
    item: &Map<String, Value>,
    brands: &mut ReferenceResolver<'_>,
) -> ReceiptItemRow {
    let receipt_item_id = Uuid::new_v4();
    let owner = format!("receipt item {receipt_item_id} (receipt {receipt_id})");
    ReceiptItemRow {
        receipt_item_id,
        receipt_id,
        brand_id: brands.resolve(&owner, reference_candidate(field(item, "partnerItemId"))),
        barcode: text(field(item, "barcode")),
        quantity: integer_or(field(item, "quantityPurchased"), 1),
        price: decimal_or(first_field(item, &ITEM_PRICE_KEYS), 0.0),
    }
}

fn receipt_row(
    receipt_id: Uuid,
    doc: &Map<String, Value>,
    users: &mut ReferenceResolver<'_>,
) -> ReceiptRow {
    let owner = format!("receipt {receipt_id}");
    ReceiptRow {
        receipt_id,
        user_id: users.resolve(&owner, reference_candidate(field(doc, "userId"))),
        purchase_timestamp: timestamp(field(doc, "purchaseDate")),
        scanned_date: timestamp(field(doc, "dateScanned")),
        processing_finished_date: timestamp(field(doc, "finishedDate")),
        points_awarded_timestamp: timestamp(field(doc, "pointsAwardedDate")),
        status: text(field(doc, "rewardsReceiptStatus"))
            .unwrap_or_else(|| UNKNOWN_STATUS.to_string()),
        total_amount_spent: non_negative_decimal(field(doc, "totalSpent"), 0.0),
        items_purchased_count: non_negative_integer(field(doc, "purchasedItemCount"), 0),
        reward_points_earned: integer_or(field(doc, "pointsEarned"), 0),
        extra_bonus_points: integer_or(field(doc, "bonusPointsEarned"), 0),
    }
}

/// Entries of the item list. A missing or non-list value means "no items", not an error.
fn item_entries(doc: &Map<String, Value>) -> &[Value] {
    match field(doc, ITEM_LIST_KEY) {
        Some(Value::Array(list)) => list,
        _ => &[],
    }
}

fn receipt_items(
    receipt_id: Uuid,
    doc: &Map<String, Value>,
    brands: &mut ReferenceResolver<'_>,
) -> (Vec<ReceiptItemRow>, Vec<SkipReason>) {
    let mut items = Vec::new();
    let mut skipped = Vec::new();
    for (index, entry) in item_entries(doc).iter().enumerate() {
        match entry {
            Value::Object(item) => items.push(normalize_receipt_item(receipt_id, item, brands)),
            other => skipped.push(SkipReason::ItemNotAnObject {
                receipt_id,
                index,
                found: json_kind(other),
            }),
        }
    }
    (items, skipped)
}

pub fn normalize_receipt(
    value: &Value,
    users: &mut ReferenceResolver<'_>,
    brands: &mut ReferenceResolver<'_>,
) -> Result<NormalizedReceipt, SkipReason> {
    let doc = as_document(value)?;
    let (receipt_id, generated_id) = primary_key(Table::Receipts, doc);
    let receipt = receipt_row(receipt_id, doc, users);
    let (items, skipped_items) = receipt_items(receipt_id, doc, brands);
    Ok(NormalizedReceipt {
        receipt,
        items,
        skipped_items,
        generated_id,
    })
}

/// Normalize a receipts export against the key snapshots taken at run start.
///
/// Items follow their receipt row: when the receipt key repeats an earlier
/// document's, or is already in `existing_receipts`, the receipt row loses the
/// insert and its items are dropped.
pub fn normalize_receipts(
    docs: &[Value],
    valid_users: &HashSet<Uuid>,
    valid_brands: &HashSet<Uuid>,
    existing_receipts: &HashSet<Uuid>,
) -> ReceiptBatch {
    let mut users = ReferenceResolver::new(Table::Users, valid_users, SENTINEL_ID);
    let mut brands = ReferenceResolver::new(Table::Brands, valid_brands, SENTINEL_ID);
    let mut receipts = NormalizeOutcome::new(Table::Receipts);
    let mut items = NormalizeOutcome::new(Table::ReceiptItems);
    let mut item_entry_count = 0;
    let mut seen = HashSet::new();

    for (idx, value) in docs.iter().enumerate() {
        let doc = match as_document(value) {
            Ok(doc) => doc,
            Err(reason) => {
                receipts.skip(idx, reason);
                continue;
            }
        };
        let (receipt_id, generated_id) = primary_key(Table::Receipts, doc);
        if generated_id {
            receipts.generated_ids += 1;
        }
        receipts.rows.push(receipt_row(receipt_id, doc, &mut users));

        let entries = item_entries(doc).len();
        item_entry_count += entries;
        let dropped = if !seen.insert(receipt_id) {
            Some(SkipReason::DuplicateReceipt {
                receipt_id,
                items: entries,
            })
        } else if existing_receipts.contains(&receipt_id) {
            Some(SkipReason::ReceiptAlreadyLoaded {
                receipt_id,
                items: entries,
            })
        } else {
            None
        };
        if let Some(reason) = dropped {
            if entries > 0 {
                items.skip(idx, reason);
            }
            continue;
        }

        let (rows, skipped) = receipt_items(receipt_id, doc, &mut brands);
        items.generated_ids += rows.len();
        items.rows.extend(rows);
        for reason in skipped {
            items.skip(idx, reason);
        }
    }

    receipts.unresolved_references = users.unresolved();
    items.unresolved_references = brands.unresolved();
    ReceiptBatch {
        receipts,
        items,
        item_entries: item_entry_count,
    }
}
