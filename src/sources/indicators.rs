// src/sources/indicators.rs
//! Market indicators page. A single HTML snapshot of the latest values;
//! the date stamped on every record is the page's last-update date.

use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use super::{is_no_data, ymd, FetchPlan, ParseError, SourceAdapter, Validity};
use crate::{
    fetch::SourceRequest,
    process::{
        date_parser::{find_br_date, parse_br_date},
        decode_text, first_line,
        number::parse_br_decimal,
    },
    schema::{Column, Field, ReferenceRecord, Schema, DATE_COLUMN},
};

const URL: &str = "https://www.anbima.com.br/informacoes/indicadores/";
const UPDATE_MARKER: &str = "Data e Hora da Última Atualização";

const COLUMNS: &[Column] = &[
    Column::date(DATE_COLUMN),
    Column::date("dt_indicador"),
    Column::text("no_indicador"),
    Column::text("ds_indicador"),
    Column::decimal("vr_indicador"),
];

/// Canonical name for a row label. Labels carry footnote digits glued to
/// the end (`DI-CETIP3`), and the IGP-M/IPCA rows are told apart by the
/// description cell.
pub fn indicator_name(label: &str, description: &str) -> Option<&'static str> {
    const BY_LABEL: &[(&str, &str)] = &[
        ("Estimativa SELIC", "selic_estimativa_anbima"),
        ("Taxa SELIC do BC2", "selic"),
        ("DI-CETIP3", "cdi"),
        ("Dolar Comercial Compra", "dolar_comercial_compra"),
        ("Dolar Comercial Venda", "dolar_comercial_venda"),
        ("Euro Compra", "euro_compra"),
        ("Euro Venda", "euro_venda"),
        ("TR2", "tr"),
        ("TBF2", "tbf"),
        ("FDS4", "fds"),
    ];
    const BY_LABEL_AND_DESCRIPTION: &[(&str, &str, &str)] = &[
        ("IGP-M (", "Número Índice", "igpm_numero_indice"),
        ("IGP-M (", "Var % no mês", "igpm_variacao_percentual_mes"),
        ("IGP-M1", "Projeção", "igpm_projecao_anbima"),
        ("IPCA (", "Número Índice", "ipca_numero_indice"),
        ("IPCA (", "Var % no mês", "ipca_variacao_percentual_mes"),
        ("IPCA1", "Projeção", "ipca_projecao_anbima"),
    ];
    BY_LABEL
        .iter()
        .find(|(l, _)| label.starts_with(l))
        .map(|(_, name)| *name)
        .or_else(|| {
            BY_LABEL_AND_DESCRIPTION
                .iter()
                .find(|(l, d, _)| label.starts_with(l) && description.starts_with(d))
                .map(|(_, _, name)| *name)
        })
}

fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::Malformed(format!("selector {css:?}: {e}")))
}

fn cell_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Innermost table carrying the last-update banner.
fn indicator_table<'a>(doc: &'a Html, tables: &Selector) -> Option<ElementRef<'a>> {
    doc.select(tables)
        .filter(|t| cell_text(*t).contains(UPDATE_MARKER))
        .last()
}

pub struct IndicatorsAdapter;

impl SourceAdapter for IndicatorsAdapter {
    fn name(&self) -> &'static str {
        "indicadores"
    }

    fn description(&self) -> &'static str {
        "Market indicators snapshot (SELIC, CDI, IGP-M, IPCA, FX)"
    }

    fn dataset_file(&self) -> &'static str {
        "indicadores_anbima.csv"
    }

    fn schema(&self) -> Schema {
        Schema {
            columns: COLUMNS,
            key: &["no_indicador"],
        }
    }

    fn fallback_epoch(&self) -> NaiveDate {
        ymd(2015, 1, 1)
    }

    fn fetch_plan(&self) -> FetchPlan {
        FetchPlan::Snapshot
    }

    fn artifact_extension(&self) -> &'static str {
        "html"
    }

    fn build_request(&self, _date: NaiveDate) -> SourceRequest {
        SourceRequest::get(URL)
    }

    fn has_expected_header(&self, text: &str) -> bool {
        let doc = Html::parse_document(text);
        match selector("table") {
            Ok(tables) => indicator_table(&doc, &tables).is_some(),
            Err(_) => false,
        }
    }

    fn classify(&self, bytes: &[u8]) -> Validity {
        let text = decode_text(bytes, self.encoding());
        if first_line(&text).is_empty() {
            Validity::Empty
        } else if is_no_data(&text) {
            Validity::NoData
        } else if self.has_expected_header(&text) {
            Validity::WellFormed
        } else {
            Validity::UnexpectedHeader
        }
    }

    fn parse(&self, bytes: &[u8], _date: NaiveDate) -> Result<Vec<ReferenceRecord>, ParseError> {
        let text = decode_text(bytes, self.encoding());
        if is_no_data(&text) {
            return Ok(Vec::new());
        }
        let doc = Html::parse_document(&text);
        let (tables, rows, cells) = (selector("table")?, selector("tr")?, selector("td, th")?);
        let table = indicator_table(&doc, &tables).ok_or_else(|| ParseError::MissingHeader {
            expected: UPDATE_MARKER.to_string(),
            first_line: first_line(&text).to_string(),
        })?;

        let banner = cell_text(table);
        let updated = banner
            .split_once(UPDATE_MARKER)
            .and_then(|(_, rest)| find_br_date(rest))
            .ok_or_else(|| ParseError::MissingReferenceDate {
                first_line: banner.chars().take(120).collect(),
            })?;

        let mut records = Vec::new();
        for (line, tr) in table.select(&rows).enumerate() {
            let row: Vec<String> = tr.select(&cells).map(cell_text).collect();
            let [label, description, value] = match row.as_slice() {
                [a, b, c, ..] if !a.is_empty() => [a, b, c],
                _ => continue,
            };
            if label.contains(UPDATE_MARKER) {
                continue;
            }
            let amount = match parse_br_decimal(value) {
                Ok(Some(v)) => v,
                Ok(None) | Err(_) => {
                    debug!(%label, %value, "skipping indicator without a value");
                    continue;
                }
            };
            let name = match indicator_name(label, description) {
                Some(n) => n.to_string(),
                None => {
                    warn!(%label, row = line + 1, "unmapped indicator label");
                    label.clone()
                }
            };
            let as_of = parse_br_date(description).unwrap_or(updated);
            records.push(ReferenceRecord::new(
                updated,
                vec![
                    Field::Date(as_of),
                    Field::Text(name),
                    Field::Text(description.clone()),
                    Field::Decimal(amount),
                ],
            ));
        }
        Ok(records)
    }
}
