use serde_json::{Map, Value};

use crate::normalization::extract::{
    boolean, decimal, first_field, integer, reference_candidate, timestamp, wrapped_identifier,
};
use crate::normalization::identifier::{validate_identifier, Identifier, OnInvalid};

/// Where an audited field is read from.
#[derive(Debug, Clone, Copy)]
pub enum Source {
    Key(&'static str),
    /// First non-null of several keys.
    FirstOf(&'static [&'static str]),
    /// A key of the owning document (receipt items -> receipt).
    Parent(&'static str),
}

/// Expected shape of a raw source value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedType {
    /// Any scalar; numbers and booleans are stringified.
    Text,
    /// Strings only (state codes, roles).
    String,
    Decimal,
    /// Negative values fall back to 0.
    NonNegativeDecimal,
    /// Integral number within `i64`; fractional values would be truncated.
    Integer,
    NonNegativeInteger,
    Boolean,
    /// `{"$date": <epoch millis>}`
    Timestamp,
    /// `{"$oid": ..}` or `{"$id": {"$oid": ..}}`
    ObjectId,
    /// Plain string or `{"$oid": ..}`
    Reference,
}

impl ExpectedType {
    /// Whether the normalizer can use `value` without falling back to a default.
    pub fn accepts(self, value: &Value) -> bool {
        let v = Some(value);
        match self {
            ExpectedType::Text => matches!(
                value,
                Value::String(_) | Value::Number(_) | Value::Bool(_)
            ),
            ExpectedType::String => value.is_string(),
            ExpectedType::Decimal => decimal(v).is_some(),
            ExpectedType::NonNegativeDecimal => decimal(v).is_some_and(|f| f >= 0.0),
            ExpectedType::Integer => whole_number(value).is_some(),
            ExpectedType::NonNegativeInteger => whole_number(value).is_some_and(|i| i >= 0),
            ExpectedType::Boolean => boolean(v).is_some(),
            ExpectedType::Timestamp => timestamp(v).is_some(),
            ExpectedType::ObjectId => wrapped_identifier(v).is_some(),
            ExpectedType::Reference => reference_candidate(v).is_some(),
        }
    }

    pub fn is_identifier(self) -> bool {
        matches!(self, ExpectedType::ObjectId | ExpectedType::Reference)
    }

    /// Reject-mode identifier check: `true` when the value does not carry a
    /// canonical identifier.
    pub fn invalid_identifier(self, value: &Value) -> bool {
        let candidate = match self {
            ExpectedType::ObjectId => wrapped_identifier(Some(value)),
            ExpectedType::Reference => reference_candidate(Some(value)),
            _ => return false,
        };
        validate_identifier(candidate, OnInvalid::Reject) == Identifier::Invalid
    }
}

fn whole_number(value: &Value) -> Option<i64> {
    let v = Some(value);
    let i = integer(v)?;
    decimal(v).is_some_and(|f| f.fract() == 0.0).then_some(i)
}

const US_STATES: [&str; 51] = [
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN",
    "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH",
    "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT",
    "VT", "VA", "WA", "WV", "WI", "WY",
];

const ROLES: [&str; 1] = ["consumer"];

const RECEIPT_STATUSES: [&str; 6] = [
    "FINISHED",
    "SUBMITTED",
    "REJECTED",
    "PENDING",
    "FLAGGED",
    "ACCEPTED",
];

/// Fixed value sets for domain checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    UsState,
    Role,
    ReceiptStatus,
}

impl Domain {
    pub fn contains(self, value: &Value) -> bool {
        let Some(raw) = value.as_str() else {
            return false;
        };
        let raw = raw.trim();
        match self {
            Domain::UsState => US_STATES.contains(&raw),
            Domain::Role => ROLES.iter().any(|r| r.eq_ignore_ascii_case(raw)),
            Domain::ReceiptStatus => RECEIPT_STATUSES.iter().any(|s| s.eq_ignore_ascii_case(raw)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub source: Source,
    pub expected: ExpectedType,
    pub domain: Option<Domain>,
}

impl FieldSpec {
    pub const fn new(name: &'static str, source: Source, expected: ExpectedType) -> Self {
        Self {
            name,
            source,
            expected,
            domain: None,
        }
    }

    pub const fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = Some(domain);
        self
    }

    /// Raw, non-defaulted value. Nulls and blank strings count as absent.
    pub fn project<'a>(
        &self,
        doc: &'a Map<String, Value>,
        parent: Option<&'a Map<String, Value>>,
    ) -> Option<&'a Value> {
        let raw = match self.source {
            Source::Key(key) => doc.get(key),
            Source::FirstOf(keys) => first_field(doc, keys),
            Source::Parent(key) => parent.and_then(|p| p.get(key)),
        }?;
        match raw {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            other => Some(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integer_rejects_fractional_values() {
        assert!(ExpectedType::Integer.accepts(&json!("750.0")));
        assert!(ExpectedType::Integer.accepts(&json!(5)));
        assert!(!ExpectedType::Integer.accepts(&json!(3.5)));
        assert!(!ExpectedType::Integer.accepts(&json!("three")));
        assert!(!ExpectedType::Integer.accepts(&json!("1e30")));
        assert!(ExpectedType::Integer.accepts(&json!(-3)));
    }

    #[test]
    fn non_negative_types_reject_values_replaced_by_zero() {
        assert!(!ExpectedType::NonNegativeDecimal.accepts(&json!("-4.0")));
        assert!(ExpectedType::NonNegativeDecimal.accepts(&json!("0")));
        assert!(!ExpectedType::NonNegativeInteger.accepts(&json!(-2)));
        assert!(ExpectedType::NonNegativeInteger.accepts(&json!("7.0")));
        assert!(!ExpectedType::NonNegativeInteger.accepts(&json!(1.5)));
    }

    #[test]
    fn string_type_rejects_numbers_that_text_accepts() {
        assert!(ExpectedType::Text.accepts(&json!(12)));
        assert!(!ExpectedType::String.accepts(&json!(12)));
        assert!(!ExpectedType::String.accepts(&json!(true)));
        assert!(ExpectedType::String.accepts(&json!("WI")));
    }

    #[test]
    fn timestamp_and_identifier_shapes() {
        assert!(ExpectedType::Timestamp.accepts(&json!({"$date": 1})));
        assert!(!ExpectedType::Timestamp.accepts(&json!({"$date": "x"})));
        assert!(ExpectedType::ObjectId.accepts(&json!({"$oid": "abc"})));
        assert!(ExpectedType::ObjectId.invalid_identifier(&json!({"$oid": "abc"})));
        assert!(!ExpectedType::Reference
            .invalid_identifier(&json!("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11")));
        assert!(!ExpectedType::Text.invalid_identifier(&json!("abc")));
    }

    #[test]
    fn domains_are_exact_for_states_and_case_insensitive_for_roles() {
        assert!(Domain::UsState.contains(&json!("WI")));
        assert!(!Domain::UsState.contains(&json!("wi")));
        assert!(!Domain::UsState.contains(&json!("Wisconsin")));
        assert!(Domain::Role.contains(&json!("Consumer")));
        assert!(!Domain::Role.contains(&json!("fetch-staff")));
        assert!(Domain::ReceiptStatus.contains(&json!("finished")));
        assert!(!Domain::Role.contains(&json!(7)));
    }

    #[test]
    fn projection_treats_blank_as_absent() {
        let doc = json!({"name": "  ", "barcode": null, "state": "WI"});
        let doc = doc.as_object().unwrap();
        let name = FieldSpec::new("name", Source::Key("name"), ExpectedType::Text);
        let barcode = FieldSpec::new("barcode", Source::Key("barcode"), ExpectedType::Text);
        let state = FieldSpec::new("state", Source::Key("state"), ExpectedType::Text);
        assert!(name.project(doc, None).is_none());
        assert!(barcode.project(doc, None).is_none());
        assert_eq!(state.project(doc, None), Some(&json!("WI")));
    }
}
