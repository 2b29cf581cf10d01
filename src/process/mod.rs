// src/process/mod.rs
pub mod date_parser;
pub mod number;
pub mod raw_table;
pub mod utils;

pub use raw_table::{HeaderAt, RawRow, RawTable, TableLayout};
pub use utils::{decode_text, first_line, Encoding};

use chrono::NaiveDate;
use thiserror::Error;

use crate::schema::{ColumnKind, Field, ReferenceRecord, Schema};

/// A payload that looked valid but does not have the expected structure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected header {expected:?} not found (first line: {first_line:?})")]
    MissingHeader { expected: String, first_line: String },

    #[error("column {column:?} missing (first line: {first_line:?})")]
    MissingColumn { column: String, first_line: String },

    #[error("line {line}, column {column:?}: bad value {value:?}: {reason}")]
    BadValue {
        column: String,
        line: usize,
        value: String,
        reason: String,
    },

    #[error("no reference date found (first line: {first_line:?})")]
    MissingReferenceDate { first_line: String },

    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// How dates are written inside a source's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateStyle {
    /// `dd/mm/yyyy`
    Br,
    /// `yyyymmdd`
    Compact,
}

/// Where each row's reference date comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowDate {
    /// Same date for every row, e.g. taken from the file's title line.
    Fixed(NaiveDate),
    /// A source-native column holding the date.
    Column(&'static str),
}

/// Convert one source cell to a canonical field.
pub fn convert_cell(raw: &str, kind: ColumnKind, style: DateStyle) -> Result<Field, String> {
    let cleaned = utils::clean_str(raw);
    match kind {
        ColumnKind::Text => Ok(if number::is_null_token(&cleaned) {
            Field::Null
        } else {
            Field::Text(cleaned)
        }),
        ColumnKind::Decimal => Ok(number::parse_br_decimal(&cleaned)?
            .map(Field::Decimal)
            .unwrap_or(Field::Null)),
        ColumnKind::Date => {
            if number::is_null_token(&cleaned) {
                return Ok(Field::Null);
            }
            parse_date(&cleaned, style)
                .map(Field::Date)
                .ok_or_else(|| format!("{cleaned:?} is not a date"))
        }
    }
}

fn parse_date(s: &str, style: DateStyle) -> Option<NaiveDate> {
    match style {
        DateStyle::Br => date_parser::parse_br_date(s),
        DateStyle::Compact => date_parser::parse_compact_date(s),
    }
}

/// Map the rows of `table` onto `schema`.
///
/// `mapping` pairs source-native column names with canonical names and must
/// cover every schema column after the reference date.
pub fn map_rows(
    table: &RawTable,
    schema: &Schema,
    mapping: &[(&str, &str)],
    style: DateStyle,
    row_date: RowDate,
    first_line: &str,
) -> Result<Vec<ReferenceRecord>, ParseError> {
    let missing = |column: &str| ParseError::MissingColumn {
        column: column.to_string(),
        first_line: first_line.to_string(),
    };

    let mut sources = Vec::with_capacity(schema.width().saturating_sub(1));
    for col in &schema.columns[1..] {
        let native = mapping
            .iter()
            .find(|(_, canonical)| *canonical == col.name)
            .map(|(native, _)| *native)
            .ok_or_else(|| missing(col.name))?;
        let idx = table.column(native).ok_or_else(|| missing(native))?;
        sources.push((idx, col));
    }
    let date_idx = match row_date {
        RowDate::Column(native) => Some(table.column(native).ok_or_else(|| missing(native))?),
        RowDate::Fixed(_) => None,
    };

    let mut records = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let cell = |i: usize| row.cells.get(i).map(String::as_str).unwrap_or("");
        let reference_date = match (row_date, date_idx) {
            (RowDate::Column(native), Some(i)) => {
                parse_date(cell(i), style).ok_or_else(|| ParseError::BadValue {
                    column: native.to_string(),
                    line: row.line,
                    value: cell(i).to_string(),
                    reason: "not a date".into(),
                })?
            }
            (RowDate::Fixed(d), _) => d,
            (RowDate::Column(native), None) => return Err(missing(native)),
        };
        let mut fields = Vec::with_capacity(sources.len());
        for (idx, col) in &sources {
            let value = cell(*idx);
            let field = convert_cell(value, col.kind, style).map_err(|reason| ParseError::BadValue {
                column: col.name.to_string(),
                line: row.line,
                value: value.to_string(),
                reason,
            })?;
            fields.push(field);
        }
        records.push(ReferenceRecord::new(reference_date, fields));
    }
    Ok(records)
}
