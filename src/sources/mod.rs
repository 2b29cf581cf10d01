// src/sources/mod.rs
//! One adapter per published dataset.
//!
//! An adapter knows where its data lives, how to ask for one reference date,
//! how to tell a real export from a "no data" page, and how to turn the
//! export into canonical [`ReferenceRecord`]s. Everything else (dates,
//! caching, merging) is the orchestrator's business.

pub mod curve;
pub mod debentures;
pub mod idka;
pub mod ima;
pub mod indicators;
pub mod titulos;

use chrono::NaiveDate;
use serde::Serialize;

use crate::{
    fetch::SourceRequest,
    process::{decode_text, first_line, utils::fold_header, Encoding},
    schema::{ReferenceRecord, Schema},
};

pub use crate::process::ParseError;

/// How a source is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPlan {
    /// One request per missing business day.
    PerBusinessDay,
    /// A single page that always shows the latest values.
    Snapshot,
}

/// Verdict on a downloaded payload before parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Validity {
    Empty,
    NoData,
    ErrorPage,
    Markup,
    UnexpectedHeader,
    WellFormed,
}

const NO_DATA_MARKER: &str = "não há dados disponíveis";

/// True when the payload announces that the date has no data.
pub fn is_no_data(text: &str) -> bool {
    fold_header(first_line(text)).contains(&fold_header(NO_DATA_MARKER))
}

/// Screening shared by every flat-file source: the first non-empty line
/// must not be a no-data notice, an error message or markup, and the
/// source's own signature must be present.
pub fn classify_flat_file(text: &str, has_expected_header: impl Fn(&str) -> bool) -> Validity {
    let first = first_line(text);
    if first.is_empty() {
        Validity::Empty
    } else if is_no_data(text) {
        Validity::NoData
    } else if first.to_lowercase().contains("error") {
        Validity::ErrorPage
    } else if first.contains('<') {
        Validity::Markup
    } else if !has_expected_header(text) {
        Validity::UnexpectedHeader
    } else {
        Validity::WellFormed
    }
}

pub trait SourceAdapter: Send + Sync {
    /// Stable identifier, used on the command line and in cache file names.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// File name of the dataset under the bases directory.
    fn dataset_file(&self) -> &'static str;

    fn schema(&self) -> Schema;

    /// First date to fetch when the dataset is empty.
    fn fallback_epoch(&self) -> NaiveDate;

    fn fetch_plan(&self) -> FetchPlan {
        FetchPlan::PerBusinessDay
    }

    fn artifact_extension(&self) -> &'static str {
        "csv"
    }

    /// Exports are published in Latin-1, but re-encoded UTF-8 copies turn up too.
    fn encoding(&self) -> Encoding {
        Encoding::Detect
    }

    fn build_request(&self, date: NaiveDate) -> SourceRequest;

    /// Source-specific signature of a real export.
    fn has_expected_header(&self, text: &str) -> bool;

    fn classify(&self, bytes: &[u8]) -> Validity {
        let text = decode_text(bytes, self.encoding());
        classify_flat_file(&text, |t| self.has_expected_header(t))
    }

    fn is_valid_response(&self, bytes: &[u8]) -> bool {
        self.classify(bytes) == Validity::WellFormed
    }

    /// Turn a valid payload for `date` into canonical records.
    fn parse(&self, bytes: &[u8], date: NaiveDate) -> Result<Vec<ReferenceRecord>, ParseError>;
}

/// Every known source, in the order `run-all` processes them.
pub fn all() -> Vec<Box<dyn SourceAdapter>> {
    vec![
        Box::new(curve::CurveAdapter),
        Box::new(idka::IdkaAdapter),
        Box::new(ima::ImaQuadroResumoAdapter),
        Box::new(indicators::IndicatorsAdapter),
        Box::new(titulos::TitulosPublicosAdapter),
        Box::new(debentures::DebenturesAdapter),
    ]
}

pub fn by_name(name: &str) -> Option<Box<dyn SourceAdapter>> {
    all().into_iter().find(|a| a.name() == name)
}

pub fn names() -> Vec<&'static str> {
    all().iter().map(|a| a.name()).collect()
}

/// Literal calendar date; only called with valid constants.
pub(crate) fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
}

/// Encode test fixtures the way the exports arrive.
#[cfg(test)]
pub(crate) fn latin1(text: &str) -> Vec<u8> {
    text.chars().map(|c| c as u32 as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn registry_names_and_files_are_unique() {
        let adapters = all();
        let names: HashSet<_> = adapters.iter().map(|a| a.name()).collect();
        let files: HashSet<_> = adapters.iter().map(|a| a.dataset_file()).collect();
        assert_eq!(names.len(), adapters.len());
        assert_eq!(files.len(), adapters.len());
        assert!(by_name("idka").is_some());
        assert!(by_name("nope").is_none());
    }

    #[test]
    fn every_schema_is_well_formed() {
        for a in all() {
            a.schema().check().unwrap_or_else(|e| panic!("{}: {}", a.name(), e));
        }
    }

    #[test]
    fn flat_file_screening() {
        let always = |_: &str| true;
        assert_eq!(classify_flat_file("", always), Validity::Empty);
        assert_eq!(classify_flat_file("\n  \n", always), Validity::Empty);
        assert_eq!(
            classify_flat_file("Não há dados disponíveis para a data informada.", always),
            Validity::NoData
        );
        assert_eq!(classify_flat_file("Error 500 - Internal", always), Validity::ErrorPage);
        assert_eq!(
            classify_flat_file("<!DOCTYPE html><html>", always),
            Validity::Markup
        );
        assert_eq!(classify_flat_file("Data de Referência: 01/03/2024", |_| false), Validity::UnexpectedHeader);
        assert_eq!(classify_flat_file("Data de Referência: 01/03/2024", always), Validity::WellFormed);
    }

    #[test]
    fn no_data_marker_in_every_flat_source_parses_to_nothing() {
        let payload = b"N\xe3o h\xe1 dados dispon\xedveis para a data 04/03/2024\n";
        let date = ymd(2024, 3, 4);
        for a in all() {
            assert!(!a.is_valid_response(payload), "{}", a.name());
            assert!(a.parse(payload, date).unwrap().is_empty(), "{}", a.name());
        }
    }

    #[test]
    fn utf8_no_data_notice_is_recognised_too() {
        let payload = "Não há dados disponíveis para a data 04/03/2024\n".as_bytes();
        let date = ymd(2024, 3, 4);
        for a in all() {
            assert_eq!(a.classify(payload), Validity::NoData, "{}", a.name());
            assert!(a.parse(payload, date).unwrap().is_empty(), "{}", a.name());
        }
    }
}
