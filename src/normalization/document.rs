//! Export file loading: one JSON array, or newline-delimited JSON objects.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    JsonArray,
    Ndjson,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedLine {
    /// 1-based line number in the source.
    pub line: usize,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    pub format: SourceFormat,
    pub documents: Vec<Value>,
    pub skipped_lines: Vec<SkippedLine>,
}

/// Detect the format from the first non-whitespace character (`[` = array).
pub fn detect_format(text: &str) -> SourceFormat {
    match text
        .trim_start_matches('\u{feff}')
        .chars()
        .find(|c| !c.is_whitespace())
    {
        Some('[') => SourceFormat::JsonArray,
        _ => SourceFormat::Ndjson,
    }
}

/// Parse an export held in memory.
///
/// A malformed NDJSON line is logged and skipped; an array-form export that
/// fails to parse is an error for the whole source.
pub fn parse_documents(text: &str) -> Result<LoadReport> {
    let text = text.trim_start_matches('\u{feff}');
    let format = detect_format(text);
    let mut documents = Vec::new();
    let mut skipped_lines = Vec::new();

    match format {
        SourceFormat::JsonArray => {
            documents = serde_json::from_str::<Vec<Value>>(text)
                .context("parse JSON array export")?;
        }
        SourceFormat::Ndjson => {
            for (idx, line) in text.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(line) {
                    Ok(doc) => documents.push(doc),
                    Err(e) => {
                        warn!(line = idx + 1, error = %e, "skipping malformed NDJSON line");
                        skipped_lines.push(SkippedLine {
                            line: idx + 1,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }
    }

    Ok(LoadReport {
        format,
        documents,
        skipped_lines,
    })
}

/// Read and parse an export file. An unreadable or absent file is fatal.
pub fn load_file(path: &Path) -> Result<LoadReport> {
    let raw = fs::read(path).with_context(|| format!("read export {}", path.display()))?;
    let text = String::from_utf8_lossy(&raw);
    let report = parse_documents(&text).with_context(|| format!("load {}", path.display()))?;
    info!(
        path = %path.display(),
        format = ?report.format,
        documents = report.documents.len(),
        skipped_lines = report.skipped_lines.len(),
        "loaded export"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn array_form_is_detected_after_whitespace() {
        let report = parse_documents("\n  [{\"a\": 1}, {\"a\": 2}]").unwrap();
        assert_eq!(report.format, SourceFormat::JsonArray);
        assert_eq!(report.documents, vec![json!({"a": 1}), json!({"a": 2})]);
        assert!(report.skipped_lines.is_empty());
    }

    #[test]
    fn ndjson_skips_malformed_and_blank_lines() {
        let text = "{\"a\": 1}\n\n{broken\n  {\"a\": 3}  \n";
        let report = parse_documents(text).unwrap();
        assert_eq!(report.format, SourceFormat::Ndjson);
        assert_eq!(report.documents, vec![json!({"a": 1}), json!({"a": 3})]);
        assert_eq!(report.skipped_lines.len(), 1);
        assert_eq!(report.skipped_lines[0].line, 3);
    }

    #[test]
    fn byte_order_mark_is_ignored() {
        let report = parse_documents("\u{feff}[{\"a\": 1}]").unwrap();
        assert_eq!(report.format, SourceFormat::JsonArray);
        assert_eq!(report.documents.len(), 1);
    }

    #[test]
    fn broken_array_is_an_error() {
        assert!(parse_documents("[{\"a\": 1},").is_err());
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = load_file(Path::new("/definitely/not/here/users.json")).unwrap_err();
        assert!(err.to_string().contains("read export"));
    }

    #[test]
    fn load_file_reads_ndjson_from_disk() {
        let path = std::env::temp_dir().join(format!("loader-{}.json", uuid::Uuid::new_v4()));
        fs::write(&path, "{\"_id\": {\"$oid\": \"x\"}}\nnot json\n").unwrap();
        let report = load_file(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.skipped_lines.len(), 1);
    }
}
