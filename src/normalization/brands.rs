use serde_json::Value;

use super::extract::{boolean_or, field, text};
use super::records::{BrandRow, Table, UNKNOWN_BRAND_TITLE};
use super::{as_document, primary_key, NormalizeOutcome, Normalized, SkipReason};

pub fn normalize_brand(value: &Value) -> Result<Normalized<BrandRow>, SkipReason> {
    let doc = as_document(value)?;
    let (brand_id, generated_id) = primary_key(Table::Brands, doc);

    let row = BrandRow {
        brand_id,
        title: text(field(doc, "name")).unwrap_or_else(|| UNKNOWN_BRAND_TITLE.to_string()),
        category: text(field(doc, "category")),
        category_code: text(field(doc, "categoryCode")),
        barcode: text(field(doc, "barcode")),
        is_top_brand: boolean_or(field(doc, "topBrand"), false),
    };
    Ok(Normalized { row, generated_id })
}

pub fn normalize_brands(docs: &[Value]) -> NormalizeOutcome<BrandRow> {
    let mut out = NormalizeOutcome::new(Table::Brands);
    for (idx, doc) in docs.iter().enumerate() {
        match normalize_brand(doc) {
            Ok(n) => out.push(n),
            Err(reason) => out.skip(idx, reason),
        }
    }
    out
}
