use serde::Serialize;
use serde_json::Value;
use tracing::info;

use super::fields::{Domain, ExpectedType, FieldSpec, Source};
use super::{AuditReport, Auditor};
use crate::normalization::receipts::{ITEM_LIST_KEY, ITEM_PRICE_KEYS};
use crate::normalization::records::Table;

pub static USER_FIELDS: [FieldSpec; 7] = [
    FieldSpec::new("user_id", Source::Key("_id"), ExpectedType::ObjectId),
    FieldSpec::new("state", Source::Key("state"), ExpectedType::String).with_domain(Domain::UsState),
    FieldSpec::new("created_date", Source::Key("createdDate"), ExpectedType::Timestamp),
    FieldSpec::new("last_login", Source::Key("lastLogin"), ExpectedType::Timestamp),
    FieldSpec::new("role", Source::Key("role"), ExpectedType::String).with_domain(Domain::Role),
    FieldSpec::new("active", Source::Key("active"), ExpectedType::Boolean),
    FieldSpec::new("sign_up_source", Source::Key("signUpSource"), ExpectedType::Text),
];

pub static BRAND_FIELDS: [FieldSpec; 8] = [
    FieldSpec::new("brand_id", Source::Key("_id"), ExpectedType::ObjectId),
    FieldSpec::new("name", Source::Key("name"), ExpectedType::Text),
    FieldSpec::new("category", Source::Key("category"), ExpectedType::Text),
    FieldSpec::new("category_code", Source::Key("categoryCode"), ExpectedType::Text),
    FieldSpec::new("barcode", Source::Key("barcode"), ExpectedType::Text),
    FieldSpec::new("brand_code", Source::Key("brandCode"), ExpectedType::Text),
    FieldSpec::new("top_brand", Source::Key("topBrand"), ExpectedType::Boolean),
    FieldSpec::new("cpg_id", Source::Key("cpg"), ExpectedType::ObjectId),
];

pub static RECEIPT_FIELDS: [FieldSpec; 11] = [
    FieldSpec::new("receipt_id", Source::Key("_id"), ExpectedType::ObjectId),
    FieldSpec::new("user_id", Source::Key("userId"), ExpectedType::Reference),
    FieldSpec::new("purchase_date", Source::Key("purchaseDate"), ExpectedType::Timestamp),
    FieldSpec::new("date_scanned", Source::Key("dateScanned"), ExpectedType::Timestamp),
    FieldSpec::new("finished_date", Source::Key("finishedDate"), ExpectedType::Timestamp),
    FieldSpec::new(
        "points_awarded_date",
        Source::Key("pointsAwardedDate"),
        ExpectedType::Timestamp,
    ),
    FieldSpec::new(
        "rewards_receipt_status",
        Source::Key("rewardsReceiptStatus"),
        ExpectedType::Text,
    )
    .with_domain(Domain::ReceiptStatus),
    FieldSpec::new(
        "total_spent",
        Source::Key("totalSpent"),
        ExpectedType::NonNegativeDecimal,
    ),
    FieldSpec::new(
        "purchased_item_count",
        Source::Key("purchasedItemCount"),
        ExpectedType::NonNegativeInteger,
    ),
    FieldSpec::new("points_earned", Source::Key("pointsEarned"), ExpectedType::Integer),
    FieldSpec::new(
        "bonus_points_earned",
        Source::Key("bonusPointsEarned"),
        ExpectedType::Integer,
    ),
];

pub static RECEIPT_ITEM_FIELDS: [FieldSpec; 6] = [
    FieldSpec::new("receipt_id", Source::Parent("_id"), ExpectedType::ObjectId),
    FieldSpec::new("brand_id", Source::Key("partnerItemId"), ExpectedType::Reference),
    FieldSpec::new("barcode", Source::Key("barcode"), ExpectedType::Text),
    FieldSpec::new("brand_code", Source::Key("brandCode"), ExpectedType::Text),
    FieldSpec::new("quantity", Source::Key("quantityPurchased"), ExpectedType::Integer),
    FieldSpec::new("price", Source::FirstOf(&ITEM_PRICE_KEYS), ExpectedType::Decimal),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptAudit {
    pub receipts: AuditReport,
    pub items: AuditReport,
}

fn audit_flat(table: Table, fields: &'static [FieldSpec], docs: &[Value]) -> AuditReport {
    let mut auditor = Auditor::new(table, fields);
    for doc in docs {
        match doc.as_object() {
            Some(map) => auditor.observe(map, None),
            None => auditor.observe_malformed(),
        }
    }
    let report = auditor.finish();
    info!(
        %table,
        records = report.records,
        issues = report.total_issues(),
        "audit complete"
    );
    report
}

pub fn audit_users(docs: &[Value]) -> AuditReport {
    audit_flat(Table::Users, &USER_FIELDS, docs)
}

pub fn audit_brands(docs: &[Value]) -> AuditReport {
    audit_flat(Table::Brands, &BRAND_FIELDS, docs)
}

/// Audit receipts and, separately, every entry of their item lists.
pub fn audit_receipts(docs: &[Value]) -> ReceiptAudit {
    let receipts = audit_flat(Table::Receipts, &RECEIPT_FIELDS, docs);
    let mut items = Auditor::new(Table::ReceiptItems, &RECEIPT_ITEM_FIELDS);
    for parent in docs.iter().filter_map(Value::as_object) {
        let Some(Value::Array(list)) = parent.get(ITEM_LIST_KEY) else {
            continue;
        };
        for entry in list {
            match entry.as_object() {
                Some(item) => items.observe(item, Some(parent)),
                None => items.observe_malformed(),
            }
        }
    }
    let items = items.finish();
    info!(
        table = %Table::ReceiptItems,
        records = items.records,
        issues = items.total_issues(),
        "audit complete"
    );
    ReceiptAudit { receipts, items }
}
