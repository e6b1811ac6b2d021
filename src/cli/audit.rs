use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Result;

use crate::audit::AuditReport;
use crate::pipeline::{self, AuditSummary, Entity, PipelineConfig};
use crate::util::env as env_util;

#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub entity: Entity,
    pub file: Option<PathBuf>,
    pub json: bool,
}

pub fn run(cfg: AuditConfig) -> Result<AuditSummary> {
    env_util::init_env();
    let mut pipeline_cfg = PipelineConfig::from_env();
    if let Some(file) = cfg.file.clone() {
        pipeline_cfg = pipeline_cfg.with_file(cfg.entity, file);
    }
    let summary = pipeline::audit(&pipeline_cfg, cfg.entity)?;
    if cfg.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", render(&summary));
    }
    Ok(summary)
}

fn write_tally(out: &mut String, label: &str, tally: &BTreeMap<&'static str, usize>) {
    let hits: Vec<String> = tally
        .iter()
        .filter(|(_, n)| **n > 0)
        .map(|(field, n)| format!("{field}={n}"))
        .collect();
    if hits.is_empty() {
        writeln!(out, "  {label}: none").ok();
    } else {
        writeln!(out, "  {label}: {}", hits.join(", ")).ok();
    }
}

fn render_report(out: &mut String, report: &AuditReport) {
    writeln!(
        out,
        "{}: {} records (malformed: {}, exact duplicates: {})",
        report.table, report.records, report.malformed_records, report.duplicate_records
    )
    .ok();
    write_tally(out, "missing values", &report.missing_values);
    write_tally(out, "type mismatches", &report.type_mismatches);
    write_tally(out, "domain violations", &report.domain_violations);
    write_tally(out, "invalid identifiers", &report.invalid_identifiers);
}

pub fn render(summary: &AuditSummary) -> String {
    let mut out = String::new();
    writeln!(out, "DATA QUALITY AUDIT ({}):", summary.entity).ok();
    for report in &summary.reports {
        render_report(&mut out, report);
    }
    out
}
