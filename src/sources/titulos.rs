// src/sources/titulos.rs
//! Federal bonds on the secondary market: `ms{yymmdd}.txt`, `@`-separated,
//! every row stamped with its own `yyyymmdd` reference date.

use chrono::NaiveDate;

use super::{is_no_data, ymd, ParseError, SourceAdapter};
use crate::{
    fetch::SourceRequest,
    process::{
        decode_text, first_line, map_rows, utils::fold_header, DateStyle, HeaderAt, RawTable,
        RowDate, TableLayout,
    },
    schema::{Column, ReferenceRecord, Schema, DATE_COLUMN},
};

const URL_PREFIX: &str = "http://www.anbima.com.br/informacoes/merc-sec/arqs/ms";
const HEADER_START: &str = "Titulo";
const DATE_HEADER: &str = "Data Referencia";

const COLUMNS: &[Column] = &[
    Column::date(DATE_COLUMN),
    Column::text("titulo"),
    Column::text("cd_selic"),
    Column::date("dt_emissao"),
    Column::date("dt_vencimento"),
    Column::decimal("tx_compra"),
    Column::decimal("tx_venda"),
    Column::decimal("tx_indicativa"),
    Column::decimal("pu"),
    Column::decimal("desvio_padrao"),
    Column::decimal("intervalo_min_d0"),
    Column::decimal("intervalo_max_d0"),
    Column::decimal("intervalo_min_d1"),
    Column::decimal("intervalo_max_d1"),
    Column::text("criterio"),
];

const MAPPING: &[(&str, &str)] = &[
    ("Titulo", "titulo"),
    ("Codigo SELIC", "cd_selic"),
    ("Data Base/Emissao", "dt_emissao"),
    ("Data Vencimento", "dt_vencimento"),
    ("Tx. Compra", "tx_compra"),
    ("Tx. Venda", "tx_venda"),
    ("Tx. Indicativas", "tx_indicativa"),
    ("PU", "pu"),
    ("Desvio padrao", "desvio_padrao"),
    ("Interv. Ind. Inf. (D0)", "intervalo_min_d0"),
    ("Interv. Ind. Sup. (D0)", "intervalo_max_d0"),
    ("Interv. Ind. Inf. (D+1)", "intervalo_min_d1"),
    ("Interv. Ind. Sup. (D+1)", "intervalo_max_d1"),
    ("Criterio", "criterio"),
];

const LAYOUT: TableLayout = TableLayout {
    delimiter: b'@',
    header: HeaderAt::FirstCell(HEADER_START),
    footer_rows: 0,
    stop_at_blank: false,
};

/// `ms` files are named after the two-digit year.
pub fn file_url(date: NaiveDate) -> String {
    format!("{}{}.txt", URL_PREFIX, date.format("%y%m%d"))
}

pub struct TitulosPublicosAdapter;

impl SourceAdapter for TitulosPublicosAdapter {
    fn name(&self) -> &'static str {
        "titulos_publicos"
    }

    fn description(&self) -> &'static str {
        "Federal bonds secondary market reference rates"
    }

    fn dataset_file(&self) -> &'static str {
        "titulos_publicos_mercado_secundario.csv"
    }

    fn schema(&self) -> Schema {
        Schema {
            columns: COLUMNS,
            key: &["titulo", "dt_vencimento"],
        }
    }

    fn fallback_epoch(&self) -> NaiveDate {
        ymd(2010, 11, 17)
    }

    fn artifact_extension(&self) -> &'static str {
        "txt"
    }

    fn build_request(&self, date: NaiveDate) -> SourceRequest {
        SourceRequest::get(file_url(date))
    }

    fn has_expected_header(&self, text: &str) -> bool {
        let wanted = fold_header(HEADER_START);
        text.lines()
            .any(|l| l.split('@').next().is_some_and(|c| fold_header(c) == wanted) && l.contains('@'))
    }

    fn parse(&self, bytes: &[u8], _date: NaiveDate) -> Result<Vec<ReferenceRecord>, ParseError> {
        let text = decode_text(bytes, self.encoding());
        if is_no_data(&text) {
            return Ok(Vec::new());
        }
        let table = RawTable::extract(&text, &LAYOUT)?;
        map_rows(
            &table,
            &self.schema(),
            MAPPING,
            DateStyle::Compact,
            RowDate::Column(DATE_HEADER),
            first_line(&text),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{schema::Field, sources::latin1};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    const HEADER: &str = "Titulo@Data Referencia@Codigo SELIC@Data Base/Emissao@Data Vencimento@\
        Tx. Compra@Tx. Venda@Tx. Indicativas@PU@Desvio padrao@Interv. Ind. Inf. (D0)@\
        Interv. Ind. Sup. (D0)@Interv. Ind. Inf. (D+1)@Interv. Ind. Sup. (D+1)@Criterio";

    fn payload(rows: &[&str]) -> Vec<u8> {
        let mut text = format!(
            "ANBIMA - Associação Brasileira das Entidades dos Mercados Financeiro e de Capitais\n\n{HEADER}\n"
        );
        for r in rows {
            text.push_str(r);
            text.push('\n');
        }
        latin1(&text)
    }

    #[test]
    fn url_uses_two_digit_year() {
        assert_eq!(
            TitulosPublicosAdapter.build_request(ymd(2024, 3, 4)).to_string(),
            "http://www.anbima.com.br/informacoes/merc-sec/arqs/ms240304.txt"
        );
    }

    #[test]
    fn parses_compact_dates_and_rates() {
        let bytes = payload(&[
            "LTN@20240304@100000@20200102@20250101@10,2010@10,1850@10,1932@913,294318@0,0012@10,0601@10,3216@10,0755@10,3371@Calculado",
            "NTN-B@20240304@760199@20000715@20350515@5,8500@5,8300@5,8412@4.231,119722@--@5,7000@5,9900@5,7103@5,9821@Calculado",
        ]);
        assert!(TitulosPublicosAdapter.is_valid_response(&bytes));
        let recs = TitulosPublicosAdapter.parse(&bytes, ymd(2024, 3, 4)).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].reference_date, ymd(2024, 3, 4));
        assert_eq!(recs[0].fields[0], Field::Text("LTN".into()));
        assert_eq!(recs[0].fields[3], Field::Date(ymd(2025, 1, 1)));
        assert_eq!(recs[1].fields[7].as_decimal(), Decimal::from_str("4231.119722").ok());
        assert!(recs[1].fields[8].is_null());
        assert_eq!(
            recs[1].to_row()[..5],
            ["2024-03-04", "NTN-B", "760199", "2000-07-15", "2035-05-15"]
        );
    }

    #[test]
    fn same_bond_two_maturities_are_distinct_keys() {
        let bytes = payload(&[
            "LFT@20240304@210100@20000701@20250301@0,0100@0,0000@0,0050@14.510,2@0@0@0@0@0@Calculado",
            "LFT@20240304@210100@20000701@20290301@0,1500@0,1400@0,1450@14.300,1@0@0@0@0@0@Calculado",
        ]);
        let recs = TitulosPublicosAdapter.parse(&bytes, ymd(2024, 3, 4)).unwrap();
        let schema = TitulosPublicosAdapter.schema();
        let keys: Vec<_> = recs
            .iter()
            .map(|r| schema.key_of(r.reference_date, &r.to_row()))
            .collect();
        assert_ne!(keys[0], keys[1]);
    }

    #[test]
    fn missing_file_page_is_invalid() {
        assert!(!TitulosPublicosAdapter.is_valid_response(b"<html><head><title>404</title>"));
        assert!(!TitulosPublicosAdapter.is_valid_response(b"ANBIMA\n\nsem arquivo\n"));
    }
}
