pub mod types;

pub use types::{Column, ColumnKind, Field, NaturalKey, ReferenceRecord};

use chrono::NaiveDate;

/// Name of the first column of every dataset.
pub const DATE_COLUMN: &str = "dt_referencia";

/// Fixed column layout and natural key of one dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    /// `columns[0]` is always the reference date.
    pub columns: &'static [Column],
    /// Columns that, together with the reference date, identify a record.
    pub key: &'static [&'static str],
}

impl Schema {
    pub fn header(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Row positions of the key columns (reference date excluded).
    pub fn key_positions(&self) -> Vec<usize> {
        self.key.iter().filter_map(|k| self.position(k)).collect()
    }

    /// Natural key of a rendered row (reference date in cell 0).
    pub fn key_of(&self, reference_date: NaiveDate, row: &[String]) -> NaturalKey {
        NaturalKey {
            reference_date,
            parts: self
                .key_positions()
                .into_iter()
                .map(|i| row.get(i).cloned().unwrap_or_default())
                .collect(),
        }
    }

    /// Checks a schema is usable as a dataset layout.
    pub fn check(&self) -> Result<(), String> {
        match self.columns.first() {
            Some(c) if c.name == DATE_COLUMN && c.kind == ColumnKind::Date => {}
            _ => return Err(format!("first column must be date `{}`", DATE_COLUMN)),
        }
        for k in self.key {
            match self.position(k) {
                Some(0) | None => return Err(format!("key column `{}` not in schema", k)),
                Some(_) => {}
            }
        }
        let mut names = self.header();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.columns.len() {
            return Err("duplicate column names".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLS: &[Column] = &[
        Column::date(DATE_COLUMN),
        Column::text("no_indice"),
        Column::decimal("nu_indice"),
    ];

    #[test]
    fn key_uses_rendered_cells() {
        let schema = Schema { columns: COLS, key: &["no_indice"] };
        assert!(schema.check().is_ok());
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let row = vec!["2024-03-01".to_string(), "IMA-B".to_string(), "9000.1".to_string()];
        let key = schema.key_of(d, &row);
        assert_eq!(key.parts, vec!["IMA-B".to_string()]);
    }

    #[test]
    fn check_rejects_bad_layouts() {
        let no_date = Schema { columns: &COLS[1..], key: &[] };
        assert!(no_date.check().is_err());
        let bad_key = Schema { columns: COLS, key: &["missing"] };
        assert!(bad_key.check().is_err());
        let date_key = Schema { columns: COLS, key: &[DATE_COLUMN] };
        assert!(date_key.check().is_err());
    }
}
