//! Per-row and per-batch mapping reports.

use crate::error::MappingError;
use crate::metadata::CodexMetadata;
use crate::validation::{Severity, ValidationIssue};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::fmt::Write as _;

/// A column whose strategy returned an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldFailure {
    pub field: String,
    #[serde(serialize_with = "serialize_display")]
    pub error: MappingError,
}

fn serialize_display<S: Serializer>(error: &MappingError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// What happened while mapping one book.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowReport {
    pub uuid: String,
    pub isbn: String,
    pub title: String,
    pub failures: Vec<FieldFailure>,
    /// Headers with no registered strategy.
    pub unmapped: Vec<String>,
    /// Headers whose strategy rejected the input.
    pub skipped: Vec<String>,
    /// Headers that ended up empty for any reason.
    pub empty: Vec<String>,
    pub issues: Vec<ValidationIssue>,
}

impl RowReport {
    pub fn for_book(metadata: &CodexMetadata) -> Self {
        Self {
            uuid: metadata.uuid.clone(),
            isbn: metadata.isbn13.clone(),
            title: metadata.title.clone(),
            ..Self::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.failures.is_empty() || self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    /// Columns left empty although their strategy ran without error.
    pub fn intentionally_empty(&self) -> impl Iterator<Item = &str> {
        self.empty.iter().map(String::as_str).filter(move |h| {
            !self.failures.iter().any(|f| f.field == *h)
                && !self.unmapped.iter().any(|u| u == h)
                && !self.skipped.iter().any(|s| s == h)
        })
    }
}

/// Column-level counters across a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnStats {
    pub filled: usize,
    pub failed: usize,
}

/// Summary of one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub books_total: usize,
    pub books_mapped: usize,
    /// Books skipped because the checkpoint already holds them.
    pub books_resumed: usize,
    pub columns: IndexMap<String, ColumnStats>,
    pub rows: Vec<RowReport>,
    pub output_path: Option<String>,
}

impl BatchReport {
    pub fn new(headers: &[String]) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            books_total: 0,
            books_mapped: 0,
            books_resumed: 0,
            columns: headers.iter().map(|h| (h.clone(), ColumnStats::default())).collect(),
            rows: Vec::new(),
            output_path: None,
        }
    }

    /// Fold one mapped row into the column counters.
    pub fn record(&mut self, values: &IndexMap<String, String>, report: RowReport) {
        self.books_mapped += 1;
        for (header, value) in values {
            let stats = self.columns.entry(header.clone()).or_default();
            if !value.is_empty() {
                stats.filled += 1;
            }
        }
        for failure in &report.failures {
            self.columns.entry(failure.field.clone()).or_default().failed += 1;
        }
        self.rows.push(report);
    }

    pub fn record_resumed(&mut self) {
        self.books_resumed += 1;
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Share of mapped rows with a non-empty value in `header`.
    pub fn fill_rate(&self, header: &str) -> f64 {
        match self.columns.get(header) {
            Some(stats) if self.books_mapped > 0 => stats.filled as f64 / self.books_mapped as f64,
            _ => 0.0,
        }
    }

    pub fn rows_with_errors(&self) -> usize {
        self.rows.iter().filter(|r| r.has_errors()).count()
    }

    /// Plain-text summary for logs and the operator console.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Batch: {} books, {} mapped, {} resumed from checkpoint, {} with errors",
            self.books_total,
            self.books_mapped,
            self.books_resumed,
            self.rows_with_errors()
        );
        if let Some(path) = &self.output_path {
            let _ = writeln!(out, "Output: {}", path);
        }

        let mut low_fill: Vec<(&String, f64)> = self
            .columns
            .keys()
            .map(|h| (h, self.fill_rate(h)))
            .filter(|(_, rate)| *rate < 1.0)
            .collect();
        low_fill.sort_by(|a, b| a.1.total_cmp(&b.1));
        if self.books_mapped > 0 && !low_fill.is_empty() {
            let _ = writeln!(out, "Columns below full fill: {}", low_fill.len());
        }

        for (header, stats) in self.columns.iter().filter(|(_, s)| s.failed > 0) {
            let _ = writeln!(out, "  {}: {} failures", header, stats.failed);
        }
        for row in self.rows.iter().filter(|r| r.has_errors()) {
            let label = if row.isbn.is_empty() { &row.uuid } else { &row.isbn };
            for failure in &row.failures {
                let _ = writeln!(out, "  [{}] {}: {}", label, failure.field, failure.error);
            }
            for issue in row.issues.iter().filter(|i| i.severity == Severity::Error) {
                let _ = writeln!(out, "  [{}] {}: {}", label, issue.field, issue.message);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_fill_rate_and_failures() {
        let headers = vec!["Title".to_string(), "Series Name".to_string()];
        let mut batch = BatchReport::new(&headers);
        batch.books_total = 2;

        let mut failing = RowReport::for_book(&CodexMetadata::new("B", "X"));
        failing.isbn = "9780306406157".into();
        failing.failures.push(FieldFailure {
            field: "Series Name".into(),
            error: MappingError::MissingInput("series".into()),
        });
        batch.record(&values(&[("Title", "A"), ("Series Name", "")]), RowReport::default());
        batch.record(&values(&[("Title", "B"), ("Series Name", "")]), failing);
        batch.finish();

        assert_eq!(batch.fill_rate("Title"), 1.0);
        assert_eq!(batch.fill_rate("Series Name"), 0.0);
        assert_eq!(batch.columns["Series Name"].failed, 1);
        assert_eq!(batch.rows_with_errors(), 1);
        let text = batch.to_text();
        assert!(text.contains("[9780306406157] Series Name: missing input: series"));
    }

    #[test]
    fn test_intentionally_empty_excludes_failures() {
        let mut report = RowReport::default();
        report.empty = vec!["Reserved 1".into(), "Broken".into()];
        report.failures.push(FieldFailure {
            field: "Broken".into(),
            error: MappingError::Computation("x".into()),
        });
        assert_eq!(report.intentionally_empty().collect::<Vec<_>>(), vec!["Reserved 1"]);
    }

    #[test]
    fn test_failure_serializes_message() {
        let failure = FieldFailure {
            field: "Pub Date".into(),
            error: MappingError::MissingInput("publication date".into()),
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["error"], "missing input: publication date");
    }
}
