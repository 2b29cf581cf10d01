// src/schema/types.rs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::{fmt, str::FromStr};

/// How a canonical column is typed on disk.
#[derive(Debug, Serialize, PartialEq, Clone, Copy, Eq, Hash)]
pub enum ColumnKind {
    Date,
    Decimal,
    Text,
}

/// A single canonical column.
#[derive(Debug, Serialize, PartialEq, Clone, Copy, Eq, Hash)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

impl Column {
    pub const fn date(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Date }
    }

    pub const fn decimal(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Decimal }
    }

    pub const fn text(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Text }
    }
}

/// One cell of a canonical record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Field {
    Null,
    Text(String),
    Decimal(Decimal),
    Date(NaiveDate),
}

impl Field {
    /// Canonical on-disk text: ISO dates, normalised decimals with a `.` separator.
    pub fn render(&self) -> String {
        match self {
            Field::Null => String::new(),
            Field::Text(s) => s.clone(),
            Field::Decimal(d) => d.normalize().to_string(),
            Field::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }

    /// Parse a cell previously written by [`render`](Self::render).
    pub fn parse_canonical(raw: &str, kind: ColumnKind) -> Result<Field, String> {
        if raw.is_empty() {
            return Ok(Field::Null);
        }
        match kind {
            ColumnKind::Text => Ok(Field::Text(raw.to_string())),
            ColumnKind::Decimal => Decimal::from_str(raw)
                .map(Field::Decimal)
                .map_err(|e| format!("{raw:?} is not a decimal: {e}")),
            ColumnKind::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(Field::Date)
                .map_err(|e| format!("{raw:?} is not a date: {e}")),
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Field::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Field::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// One canonical output row. `fields` lines up with the schema's columns
/// after the reference-date column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceRecord {
    pub reference_date: NaiveDate,
    pub fields: Vec<Field>,
}

impl ReferenceRecord {
    pub fn new(reference_date: NaiveDate, fields: Vec<Field>) -> Self {
        Self { reference_date, fields }
    }

    /// Rendered cells, reference date first.
    pub fn to_row(&self) -> Vec<String> {
        let mut row = Vec::with_capacity(self.fields.len() + 1);
        row.push(self.reference_date.format("%Y-%m-%d").to_string());
        row.extend(self.fields.iter().map(Field::render));
        row
    }
}

/// Identity of a record inside one dataset: reference date plus the
/// rendered values of the schema's key columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey {
    pub reference_date: NaiveDate,
    pub parts: Vec<String>,
}
