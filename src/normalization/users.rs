use serde_json::Value;

use super::extract::{boolean_or, field, timestamp};
use super::records::{Table, UserRow, DEFAULT_ROLE};
use super::{as_document, primary_key, NormalizeOutcome, Normalized, SkipReason};

/// Two-letter state code: strings only, trimmed, first two characters, upper-cased.
/// Upper-casing goes beyond the source loader, which kept the raw case.
pub fn state_code(value: Option<&Value>) -> Option<String> {
    let raw = value?.as_str()?.trim();
    let code: String = raw.chars().take(2).collect::<String>().to_ascii_uppercase();
    if code.is_empty() {
        None
    } else {
        Some(code)
    }
}

pub fn normalize_user(value: &Value) -> Result<Normalized<UserRow>, SkipReason> {
    let doc = as_document(value)?;
    let (user_id, generated_id) = primary_key(Table::Users, doc);

    let row = UserRow {
        user_id,
        state: state_code(field(doc, "state")),
        account_created_date: timestamp(field(doc, "createdDate")),
        last_login_date: timestamp(field(doc, "lastLogin")),
        role: field(doc, "role")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_ROLE)
            .to_string(),
        is_active: boolean_or(field(doc, "active"), true),
    };
    Ok(Normalized { row, generated_id })
}

pub fn normalize_users(docs: &[Value]) -> NormalizeOutcome<UserRow> {
    let mut out = NormalizeOutcome::new(Table::Users);
    for (idx, doc) in docs.iter().enumerate() {
        match normalize_user(doc) {
            Ok(n) => out.push(n),
            Err(reason) => out.skip(idx, reason),
        }
    }
    out
}
