// src/ingest/report.rs

use chrono::NaiveDate;
use serde::Serialize;
use std::{fmt, path::PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Fetch failed after the client's retries.
    Transport,
    /// Payload looked valid but did not match the source's layout.
    Parse,
    /// Local artifact cache could not be read or written.
    Cache,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transport => f.write_str("transport"),
            FailureKind::Parse => f.write_str("parse"),
            FailureKind::Cache => f.write_str("cache"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateFailure {
    pub date: NaiveDate,
    pub kind: FailureKind,
    pub message: String,
}

/// What one source run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub source: String,
    pub last_date_before: Option<NaiveDate>,
    pub dates_attempted: usize,
    /// Dates whose payload parsed into at least one record.
    pub dates_succeeded: usize,
    /// No data, error page, markup or 404; not failures.
    pub dates_empty: usize,
    pub records_parsed: usize,
    /// Parsed records dated at or before the previous last date, or on a
    /// non-business day.
    pub records_stale: usize,
    pub records_appended: usize,
    pub duplicates_dropped: usize,
    pub failures: Vec<DateFailure>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Self::default()
        }
    }

    pub fn fail(&mut self, date: NaiveDate, kind: FailureKind, message: impl Into<String>) {
        self.failures.push(DateFailure {
            date,
            kind,
            message: message.into(),
        });
    }

    /// Merge done and every attempted date accounted for without error.
    pub fn succeeded(&self) -> bool {
        !self.cancelled && self.failures.is_empty()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.succeeded() { '✓' } else { '✗' };
        if self.cancelled {
            return write!(f, "{} {}: cancelled, dataset untouched", mark, self.source);
        }
        if self.dates_attempted == 0 {
            return write!(f, "{} {}: up to date", mark, self.source);
        }
        write!(
            f,
            "{} {}: {}/{} dates with data, {} empty, {} records appended, {} duplicates dropped",
            mark,
            self.source,
            self.dates_succeeded,
            self.dates_attempted,
            self.dates_empty,
            self.records_appended,
            self.duplicates_dropped
        )?;
        for failure in &self.failures {
            write!(f, "\n    {} {}: {}", failure.date, failure.kind, failure.message)?;
        }
        Ok(())
    }
}

/// Per-source state as shown by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStatus {
    pub source: String,
    pub dataset: PathBuf,
    pub last_date: Option<NaiveDate>,
    pub rows: usize,
    /// Cached downloads not merged yet.
    pub pending: usize,
    /// Downloads set aside after a parse failure.
    pub rejected: usize,
    pub error: Option<String>,
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(err) = &self.error {
            return write!(f, "{:<24} error: {}", self.source, err);
        }
        let last = self
            .last_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        write!(f, "{:<24} {:<12} {:>8} rows", self.source, last, self.rows)?;
        if self.pending > 0 {
            write!(f, ", {} pending", self.pending)?;
        }
        if self.rejected > 0 {
            write!(f, ", {} rejected", self.rejected)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_make_the_run_unsuccessful() {
        let mut report = RunReport::new("idka");
        report.dates_attempted = 2;
        report.dates_succeeded = 1;
        assert!(report.succeeded());
        assert!(report.to_string().starts_with("✓ idka: 1/2"));

        report.fail(
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            FailureKind::Parse,
            "column \"Índices\" missing",
        );
        assert!(!report.succeeded());
        let text = report.to_string();
        assert!(text.starts_with("✗ idka"));
        assert!(text.contains("2024-03-04 parse: column"));
    }

    #[test]
    fn report_serialises_to_json() {
        let mut report = RunReport::new("debentures");
        report.fail(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(), FailureKind::Transport, "HTTP 503");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["failures"][0]["kind"], "transport");
        assert_eq!(json["failures"][0]["date"], "2024-03-04");
    }
}
