// src/dataset/mod.rs

pub mod lock;

pub use lock::DatasetLock;

use chrono::NaiveDate;
use csv::{ReaderBuilder, Terminator, WriterBuilder};
use serde::Serialize;
use std::{
    collections::HashSet,
    fs,
    io::{self, BufWriter, Write},
    ops::RangeBounds,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{
    process::{decode_text, Encoding},
    schema::{Field, ReferenceRecord, Schema},
};

pub const DELIMITER: u8 = b';';

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: header {found:?} does not match {expected:?}", path.display())]
    SchemaMismatch {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("{} line {line}: {reason}", path.display())]
    Corrupt {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    #[error("record has {found} fields, dataset expects {expected}")]
    RecordShape { expected: usize, found: usize },

    #[error("{} is locked by another run (remove {} if stale)", path.display(), lock.display())]
    Locked { path: PathBuf, lock: PathBuf },

    #[error("writing {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A persisted row, cells kept exactly as read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub reference_date: NaiveDate,
    pub cells: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AppendOutcome {
    /// New rows written.
    pub appended: usize,
    /// Rows dropped because their natural key was already present.
    pub duplicates: usize,
    /// Whether the file was replaced at all.
    pub rewritten: bool,
}

/// One semicolon-delimited, date-ordered dataset file.
///
/// The store is the only writer of its file. It does not lock on its own;
/// callers hold a [`DatasetLock`] around read-modify-write cycles.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    path: PathBuf,
    schema: Schema,
}

impl DatasetStore {
    pub fn new(path: impl Into<PathBuf>, schema: Schema) -> Self {
        Self {
            path: path.into(),
            schema,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn lock(&self) -> Result<DatasetLock, DatasetError> {
        DatasetLock::acquire(&self.path)
    }

    /// Greatest stored reference date; `None` for a missing, empty or
    /// header-only file.
    pub fn last_date(&self) -> Result<Option<NaiveDate>, DatasetError> {
        Ok(self.read_rows()?.iter().map(|r| r.reference_date).max())
    }

    /// Merge `records` in, first write wins on natural-key clashes, then
    /// rewrite the file sorted by reference date.
    ///
    /// Nothing is written when the merge would not change the file.
    #[instrument(level = "debug", skip(self, records), fields(path = %self.path.display(), batch = records.len()))]
    pub fn append(&self, records: &[ReferenceRecord]) -> Result<AppendOutcome, DatasetError> {
        let width = self.schema.width();
        if let Some(bad) = records.iter().find(|r| r.fields.len() + 1 != width) {
            return Err(DatasetError::RecordShape {
                expected: width - 1,
                found: bad.fields.len(),
            });
        }

        let existing = self.read_rows()?;
        let mut seen = HashSet::with_capacity(existing.len() + records.len());
        let mut rows = Vec::with_capacity(existing.len() + records.len());
        let mut outcome = AppendOutcome::default();

        for row in existing {
            if seen.insert(self.schema.key_of(row.reference_date, &row.cells)) {
                rows.push(row);
            } else {
                outcome.duplicates += 1;
            }
        }
        let legacy_duplicates = outcome.duplicates;
        if legacy_duplicates > 0 {
            warn!(path = %self.path.display(), count = legacy_duplicates, "dataset held duplicate keys; collapsing");
        }
        let sorted = rows.windows(2).all(|w| w[0].reference_date <= w[1].reference_date);

        for rec in records {
            let cells = rec.to_row();
            if seen.insert(self.schema.key_of(rec.reference_date, &cells)) {
                rows.push(StoredRow {
                    reference_date: rec.reference_date,
                    cells,
                });
                outcome.appended += 1;
            } else {
                outcome.duplicates += 1;
            }
        }

        if outcome.appended == 0 && legacy_duplicates == 0 && sorted {
            debug!(duplicates = outcome.duplicates, "nothing new; dataset untouched");
            return Ok(outcome);
        }

        rows.sort_by_key(|r| r.reference_date);
        let header = self.schema.header();
        write_atomic(&self.path, |w| {
            let mut wtr = WriterBuilder::new()
                .delimiter(DELIMITER)
                .terminator(Terminator::Any(b'\n'))
                .from_writer(w);
            wtr.write_record(&header)?;
            for row in &rows {
                wtr.write_record(&row.cells)?;
            }
            wtr.flush()
        })?;
        outcome.rewritten = true;
        info!(
            path = %self.path.display(),
            appended = outcome.appended,
            duplicates = outcome.duplicates,
            total = rows.len(),
            "dataset merged"
        );
        Ok(outcome)
    }

    /// Typed records whose reference date falls in `range`.
    pub fn read(&self, range: impl RangeBounds<NaiveDate>) -> Result<Vec<ReferenceRecord>, DatasetError> {
        let kinds: Vec<_> = self.schema.columns[1..].iter().map(|c| c.kind).collect();
        let mut out = Vec::new();
        for (idx, row) in self.read_rows()?.into_iter().enumerate() {
            if !range.contains(&row.reference_date) {
                continue;
            }
            let fields = row.cells[1..]
                .iter()
                .zip(&kinds)
                .map(|(cell, kind)| Field::parse_canonical(cell, *kind))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|reason| DatasetError::Corrupt {
                    path: self.path.clone(),
                    line: idx as u64 + 2,
                    reason,
                })?;
            out.push(ReferenceRecord::new(row.reference_date, fields));
        }
        Ok(out)
    }

    /// Every data row as stored. UTF-8 or legacy Latin-1 bytes are accepted.
    pub fn read_rows(&self) -> Result<Vec<StoredRow>, DatasetError> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(DatasetError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let text = decode_text(&bytes, Encoding::Detect);
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let corrupt = |line: u64, reason: String| DatasetError::Corrupt {
            path: self.path.clone(),
            line,
            reason,
        };
        let mut rdr = ReaderBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());
        let mut records = rdr.records();

        let header: Vec<String> = match records.next() {
            Some(rec) => rec
                .map_err(|e| corrupt(1, e.to_string()))?
                .iter()
                .map(|h| h.trim().to_string())
                .collect(),
            None => return Ok(Vec::new()),
        };
        let expected: Vec<String> = self.schema.header().iter().map(|h| h.to_string()).collect();
        if header != expected {
            return Err(DatasetError::SchemaMismatch {
                path: self.path.clone(),
                expected,
                found: header,
            });
        }

        let mut rows = Vec::new();
        for rec in records {
            let rec = rec.map_err(|e| corrupt(e.position().map_or(0, |p| p.line()), e.to_string()))?;
            let line = rec.position().map_or(0, |p| p.line());
            if rec.len() != expected.len() {
                return Err(corrupt(
                    line,
                    format!("{} fields, expected {}", rec.len(), expected.len()),
                ));
            }
            let cells: Vec<String> = rec.iter().map(str::to_string).collect();
            let reference_date = parse_stored_date(&cells[0])
                .ok_or_else(|| corrupt(line, format!("bad reference date {:?}", cells[0])))?;
            rows.push(StoredRow {
                reference_date,
                cells,
            });
        }
        Ok(rows)
    }
}

/// ISO date, optionally followed by a time part.
fn parse_stored_date(cell: &str) -> Option<NaiveDate> {
    let cell = cell.trim();
    let date_part = cell.split_whitespace().next()?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Replace `path` with whatever `write` produces, or leave it untouched.
///
/// Content goes to a temporary file in the same directory which is synced
/// and then renamed over `path`.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<(), DatasetError>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let failed = |source: io::Error| DatasetError::Write {
        path: path.to_path_buf(),
        source,
    };
    fs::create_dir_all(&dir).map_err(failed)?;
    let mut tmp = NamedTempFile::new_in(&dir).map_err(failed)?;
    {
        let mut buf = BufWriter::new(tmp.as_file_mut());
        write(&mut buf).map_err(failed)?;
        buf.flush().map_err(failed)?;
    }
    tmp.as_file().sync_all().map_err(failed)?;
    tmp.persist(path).map_err(|e| failed(e.error))?;
    Ok(())
}
