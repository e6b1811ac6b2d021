//! Typed field extraction over raw `serde_json::Value` documents.
//!
//! Every extractor is total: absent keys, nulls and unexpected shapes come back
//! as `None` (or the caller's default), never as an error.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Wrapper key carrying an exported object identifier (`{"$oid": "..."}`).
pub const OID_KEY: &str = "$oid";
/// Wrapper key carrying an epoch-millisecond timestamp (`{"$date": 1609687531000}`).
pub const DATE_KEY: &str = "$date";
/// Wrapper key of a database reference (`{"$ref": "Cogs", "$id": {"$oid": "..."}}`).
pub const REF_ID_KEY: &str = "$id";

/// Look up a non-null value in a document, ignoring explicit `null`s.
pub fn field<'a>(doc: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    match doc.get(key) {
        None | Some(Value::Null) => None,
        Some(v) => Some(v),
    }
}

/// First non-null value among candidate keys, in order.
pub fn first_field<'a>(doc: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| field(doc, k))
}

/// Raw identifier inside an `{"$oid": ..}` wrapper, or inside a reference
/// wrapper `{"$id": {"$oid": ..}}`.
pub fn wrapped_identifier(value: Option<&Value>) -> Option<&str> {
    match value? {
        Value::Object(map) => match (map.get(OID_KEY), map.get(REF_ID_KEY)) {
            (Some(Value::String(s)), _) => Some(s.as_str()),
            (_, Some(inner @ Value::Object(_))) => wrapped_identifier(Some(inner)),
            _ => None,
        },
        _ => None,
    }
}

/// Foreign-key candidate: a plain string, falling back to a wrapped identifier.
pub fn reference_candidate(value: Option<&Value>) -> Option<&str> {
    match value? {
        Value::String(s) => Some(s.as_str()),
        other => wrapped_identifier(Some(other)),
    }
}

/// Timestamp from a `{"$date": <epoch millis>}` wrapper. Any other shape is absent.
pub fn timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let millis = match value? {
        Value::Object(map) => map.get(DATE_KEY)?.as_i64()?,
        _ => return None,
    };
    DateTime::from_timestamp_millis(millis)
}

/// Trimmed text. Numbers and booleans are rendered (barcodes are often exported as
/// numbers); blank strings, lists and objects are absent.
pub fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Finite float from a JSON number or a numeric string.
pub fn decimal(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    parsed.is_finite().then_some(parsed)
}

/// Integer, parsed through a float and truncated toward zero (`"3.0"` -> 3, `2.9` -> 2).
pub fn integer(value: Option<&Value>) -> Option<i64> {
    if let Some(Value::Number(n)) = value {
        if let Some(i) = n.as_i64() {
            return Some(i);
        }
    }
    let f = decimal(value)?.trunc();
    // i64::MAX is not exactly representable; the exclusive upper bound keeps the cast lossless.
    if f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Boolean from a truthy/falsy-looking scalar; `None` for anything unrecognised.
pub fn boolean(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "on" | "1" => Some(true),
            "false" | "f" | "no" | "n" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub fn decimal_or(value: Option<&Value>, default: f64) -> f64 {
    decimal(value).unwrap_or(default)
}

pub fn integer_or(value: Option<&Value>, default: i64) -> i64 {
    integer(value).unwrap_or(default)
}

pub fn boolean_or(value: Option<&Value>, default: bool) -> bool {
    boolean(value).unwrap_or(default)
}
