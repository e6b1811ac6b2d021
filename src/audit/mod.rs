//! Read-only data-quality audit over raw export documents.
//!
//! The audit looks at a strict projection of each document: absent values stay
//! absent instead of being defaulted, and identifiers are validated in reject
//! mode, so the counts describe the source rather than the repaired rows the
//! loader writes.

pub mod fields;
pub mod tables;

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::normalization::records::Table;
use fields::FieldSpec;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub table: Table,
    /// Documents (or receipt items) audited.
    pub records: usize,
    /// Documents that were not objects and could not be projected.
    pub malformed_records: usize,
    pub missing_values: BTreeMap<&'static str, usize>,
    pub duplicate_records: usize,
    pub type_mismatches: BTreeMap<&'static str, usize>,
    pub domain_violations: BTreeMap<&'static str, usize>,
    pub invalid_identifiers: BTreeMap<&'static str, usize>,
}

impl AuditReport {
    /// Total of every per-field issue tally plus duplicates and malformed records.
    pub fn total_issues(&self) -> usize {
        self.missing_values.values().sum::<usize>()
            + self.type_mismatches.values().sum::<usize>()
            + self.domain_violations.values().sum::<usize>()
            + self.invalid_identifiers.values().sum::<usize>()
            + self.duplicate_records
            + self.malformed_records
    }
}

/// Accumulates one table's report, one projected record at a time.
pub struct Auditor {
    fields: &'static [FieldSpec],
    report: AuditReport,
    seen: HashSet<String>,
}

impl Auditor {
    pub fn new(table: Table, fields: &'static [FieldSpec]) -> Self {
        let mut report = AuditReport {
            table,
            records: 0,
            malformed_records: 0,
            missing_values: BTreeMap::new(),
            duplicate_records: 0,
            type_mismatches: BTreeMap::new(),
            domain_violations: BTreeMap::new(),
            invalid_identifiers: BTreeMap::new(),
        };
        for f in fields {
            report.missing_values.insert(f.name, 0);
            report.type_mismatches.insert(f.name, 0);
            if f.domain.is_some() {
                report.domain_violations.insert(f.name, 0);
            }
            if f.expected.is_identifier() {
                report.invalid_identifiers.insert(f.name, 0);
            }
        }
        Self {
            fields,
            report,
            seen: HashSet::new(),
        }
    }

    pub fn observe_malformed(&mut self) {
        self.report.records += 1;
        self.report.malformed_records += 1;
    }

    pub fn observe(&mut self, doc: &Map<String, Value>, parent: Option<&Map<String, Value>>) {
        self.report.records += 1;
        let fields = self.fields;
        let projected: Vec<Option<&Value>> =
            fields.iter().map(|f| f.project(doc, parent)).collect();

        for (field, value) in fields.iter().zip(projected.iter().copied()) {
            let Some(value) = value else {
                bump(&mut self.report.missing_values, field.name);
                continue;
            };
            if !field.expected.accepts(value) {
                bump(&mut self.report.type_mismatches, field.name);
            }
            if field.domain.is_some_and(|d| !d.contains(value)) {
                bump(&mut self.report.domain_violations, field.name);
            }
            if field.expected.invalid_identifier(value) {
                bump(&mut self.report.invalid_identifiers, field.name);
            }
        }

        // Exact duplicate = identical projection to an earlier record.
        let key = serde_json::to_string(&projected).unwrap_or_default();
        if !self.seen.insert(key) {
            self.report.duplicate_records += 1;
        }
    }

    pub fn finish(self) -> AuditReport {
        self.report
    }
}

fn bump(map: &mut BTreeMap<&'static str, usize>, field: &'static str) {
    *map.entry(field).or_insert(0) += 1;
}
