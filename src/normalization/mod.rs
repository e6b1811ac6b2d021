//! Document -> relational row normalization.
//!
//! Each entity normalizer is a pure function over one raw document. Batch
//! helpers fold per-document results into a [`NormalizeOutcome`] so callers can
//! assert on counts instead of log text.

pub mod brands;
pub mod document;
pub mod extract;
pub mod identifier;
pub mod receipts;
pub mod records;
pub mod reference;
pub mod users;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use identifier::{validate_identifier, Identifier, OnInvalid};
use records::Table;

/// Why a document (or a nested receipt item) produced no row.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    #[error("document is {found}, expected an object")]
    NotAnObject { found: &'static str },
    #[error("item {index} of receipt {receipt_id} is {found}, expected an object")]
    ItemNotAnObject {
        receipt_id: Uuid,
        index: usize,
        found: &'static str,
    },
    #[error("receipt {receipt_id} repeats an earlier document's key; its {items} items were dropped")]
    DuplicateReceipt { receipt_id: Uuid, items: usize },
    #[error("receipt {receipt_id} is already stored; its {items} items were dropped")]
    ReceiptAlreadyLoaded { receipt_id: Uuid, items: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkipRecord {
    pub table: Table,
    /// Position of the source document in the loaded batch.
    pub document: usize,
    pub reason: SkipReason,
}

/// A row plus whether its primary key had to be minted.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
    pub row: T,
    pub generated_id: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizeOutcome<T> {
    pub table: Table,
    pub rows: Vec<T>,
    pub skipped: Vec<SkipRecord>,
    pub generated_ids: usize,
    pub unresolved_references: usize,
}

impl<T> NormalizeOutcome<T> {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            rows: Vec::new(),
            skipped: Vec::new(),
            generated_ids: 0,
            unresolved_references: 0,
        }
    }

    pub fn push(&mut self, normalized: Normalized<T>) {
        if normalized.generated_id {
            self.generated_ids += 1;
        }
        self.rows.push(normalized.row);
    }

    pub fn skip(&mut self, document: usize, reason: SkipReason) {
        warn!(table = %self.table, document, reason = %reason, "skipping record");
        self.skipped.push(SkipRecord {
            table: self.table,
            document,
            reason,
        });
    }
}

pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

pub(crate) fn as_document(value: &Value) -> Result<&Map<String, Value>, SkipReason> {
    value.as_object().ok_or(SkipReason::NotAnObject {
        found: json_kind(value),
    })
}

/// Primary key for a dimension/fact row: the canonical form of the wrapped source
/// identifier, or a freshly minted one.
pub(crate) fn primary_key(table: Table, doc: &Map<String, Value>) -> (Uuid, bool) {
    let candidate = extract::wrapped_identifier(extract::field(doc, "_id"));
    let identifier = validate_identifier(candidate, OnInvalid::Generate);
    let generated = !matches!(identifier, Identifier::Valid(_));
    let id = identifier.key().unwrap_or_else(Uuid::new_v4);
    if generated {
        debug!(%table, source = candidate.unwrap_or("<absent>"), %id, "missing or invalid _id; generated key");
    }
    (id, generated)
}
