pub mod csv;
pub mod pdf;
pub mod xlsx;

use crate::db::RowSet;
use crate::llm::models::ReportKind;
use regex::Regex;
use serde_json::Value;
use std::error::Error;
use std::fmt;
use std::sync::LazyLock;

pub const NO_DATA_MESSAGE: &str = "No data found for this query.";

const MAX_FILENAME_LEN: usize = 50;

/// A rendered downloadable report: bytes plus the metadata the HTTP
/// layer needs to serve it as an attachment. Never persisted to disk.
#[derive(Debug, Clone)]
pub struct ReportArtifact {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    pub filename: String,
}

#[derive(Debug)]
pub enum ReportError {
    Render(String),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::Render(msg) => write!(f, "report rendering error: {}", msg),
        }
    }
}

impl Error for ReportError {}

/// Dispatches to the renderer for the requested kind. All three are
/// stateless and deterministic for a given RowSet and title.
pub fn render(kind: ReportKind, rows: &RowSet, title: &str) -> Result<ReportArtifact, ReportError> {
    match kind {
        ReportKind::Csv => csv::render(rows, title),
        ReportKind::Pdf => pdf::render(rows, title),
        ReportKind::Xlsx => xlsx::render(rows, title),
    }
}

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\-.]").unwrap());

/// Reduces a report title to a filename-safe stem: spaces become
/// underscores, anything outside `[\w\-.]` is stripped, and the result
/// is truncated to a bounded length.
pub fn safe_filename(title: &str, extension: &str) -> String {
    let replaced = title.replace(' ', "_");
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(&replaced, "");
    let stem: String = cleaned.chars().take(MAX_FILENAME_LEN).collect();
    let stem = if stem.is_empty() {
        "report".to_string()
    } else {
        stem
    };
    format!("{}.{}", stem, extension)
}

/// Scalar-to-text used by the CSV and PDF renderers. SQL NULL renders as
/// an empty field.
pub(crate) fn format_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filenames_are_sanitized_and_bounded() {
        assert_eq!(safe_filename("Monthly sales", "csv"), "Monthly_sales.csv");
        assert_eq!(safe_filename("a/b\\c: d?", "pdf"), "abc_d.pdf");
        assert_eq!(safe_filename("", "xlsx"), "report.xlsx");

        let long = "x".repeat(120);
        let name = safe_filename(&long, "csv");
        assert_eq!(name.len(), MAX_FILENAME_LEN + ".csv".len());
    }

    #[test]
    fn cells_format_scalars_naturally() {
        assert_eq!(format_cell(&Value::Null), "");
        assert_eq!(format_cell(&json!("x")), "x");
        assert_eq!(format_cell(&json!(1)), "1");
        assert_eq!(format_cell(&json!(2.5)), "2.5");
        assert_eq!(format_cell(&json!(true)), "true");
    }
}
