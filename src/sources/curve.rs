// src/sources/curve.rs
//! Closing term structure (ETTJ). The export holds several blocks; only the
//! vertex table is stored:
//!
//! ```text
//! 12/03/2024
//! ;Beta 1;Beta 2;Beta 3;Beta 4;Lambda 1;Lambda 2
//! PREFIXADOS;0,1047;...
//!
//! Vertices;ETTJ IPCA;ETTJ PREF;Inflação Implícita
//! 252;5,8113;10,2342;4,1810
//! 1.008;5,7021;10,9833;5,0039
//!
//! PREFIXADOS (CIRCULAR 3.361)
//! ...
//! ```

use chrono::NaiveDate;

use super::{is_no_data, ymd, ParseError, SourceAdapter};
use crate::{
    fetch::SourceRequest,
    process::{
        date_parser::{find_br_date, format_br_date},
        decode_text, first_line,
        utils::fold_header,
        map_rows, DateStyle, HeaderAt, RawTable, RowDate, TableLayout,
    },
    schema::{Column, ReferenceRecord, Schema, DATE_COLUMN},
};

const URL: &str = "https://www.anbima.com.br/informacoes/est-termo/CZ-down.asp";
const VERTEX_HEADER: &str = "Vertices";

const COLUMNS: &[Column] = &[
    Column::date(DATE_COLUMN),
    Column::decimal("vertice_du"),
    Column::decimal("taxa_ipca"),
    Column::decimal("taxa_pre"),
    Column::decimal("inflacao_implicita"),
];

const MAPPING: &[(&str, &str)] = &[
    ("Vertices", "vertice_du"),
    ("ETTJ IPCA", "taxa_ipca"),
    ("ETTJ PREF", "taxa_pre"),
    ("Inflação Implícita", "inflacao_implicita"),
];

const LAYOUT: TableLayout = TableLayout {
    delimiter: b';',
    header: HeaderAt::FirstCell(VERTEX_HEADER),
    footer_rows: 0,
    stop_at_blank: true,
};

pub struct CurveAdapter;

impl SourceAdapter for CurveAdapter {
    fn name(&self) -> &'static str {
        "curva_juros_fechamento"
    }

    fn description(&self) -> &'static str {
        "Closing zero-coupon curves (ETTJ) by business-day vertex"
    }

    fn dataset_file(&self) -> &'static str {
        "curva_juros_fechamento.csv"
    }

    fn schema(&self) -> Schema {
        Schema {
            columns: COLUMNS,
            key: &["vertice_du"],
        }
    }

    fn fallback_epoch(&self) -> NaiveDate {
        ymd(2015, 1, 1)
    }

    fn build_request(&self, date: NaiveDate) -> SourceRequest {
        SourceRequest::get(URL)
            .param("escolha", "2")
            .param("Dt_Ref", format_br_date(date))
            .param("Dt_Ref_Ver", "20000101")
            .param("saida", "csv")
            .param("Idioma", "PT")
    }

    fn has_expected_header(&self, text: &str) -> bool {
        let vertices = fold_header(VERTEX_HEADER);
        find_br_date(first_line(text)).is_some()
            && text.lines().any(|l| {
                l.split(';')
                    .next()
                    .is_some_and(|c| fold_header(c) == vertices)
            })
    }

    fn parse(&self, bytes: &[u8], _date: NaiveDate) -> Result<Vec<ReferenceRecord>, ParseError> {
        let text = decode_text(bytes, self.encoding());
        if is_no_data(&text) {
            return Ok(Vec::new());
        }
        let first = first_line(&text);
        let reference = find_br_date(first).ok_or_else(|| ParseError::MissingReferenceDate {
            first_line: first.to_string(),
        })?;
        let table = RawTable::extract(&text, &LAYOUT)?;
        map_rows(
            &table,
            &self.schema(),
            MAPPING,
            DateStyle::Br,
            RowDate::Fixed(reference),
            first,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::latin1;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn payload() -> Vec<u8> {
        latin1(
            "12/03/2024\n\
             ;Beta 1;Beta 2;Beta 3;Beta 4;Lambda 1;Lambda 2\n\
             PREFIXADOS;0,1047;-0,0021;0,0412;0,0315;1,9812;0,2214\n\
             IPCA;0,0601;-0,0043;0,0102;0,0288;1,7713;0,3011\n\
             \n\
             Vertices;ETTJ IPCA;ETTJ PREF;Inflação Implícita\n\
             252;5,8113;10,2342;4,1810\n\
             504;5,7520;10,6120;4,5956\n\
             1.008;5,7021;10,9833;5,0039\n\
             \n\
             PREFIXADOS (CIRCULAR 3.361)\n\
             Vertices;Taxa\n\
             21;10,55\n",
        )
    }

    #[test]
    fn request_fixes_vertex_version() {
        let req = CurveAdapter.build_request(ymd(2024, 3, 12));
        assert_eq!(
            req.to_url().unwrap().as_str(),
            "https://www.anbima.com.br/informacoes/est-termo/CZ-down.asp?\
             escolha=2&Dt_Ref=12%2F03%2F2024&Dt_Ref_Ver=20000101&saida=csv&Idioma=PT"
        );
    }

    #[test]
    fn reads_only_the_first_vertex_block() {
        let bytes = payload();
        assert!(CurveAdapter.is_valid_response(&bytes));
        let recs = CurveAdapter.parse(&bytes, ymd(2024, 3, 12)).unwrap();
        assert_eq!(recs.len(), 3);
        assert!(recs.iter().all(|r| r.reference_date == ymd(2024, 3, 12)));
        assert_eq!(recs[0].fields[0].as_decimal(), Some(Decimal::from(252)));
        assert_eq!(recs[2].fields[0].as_decimal(), Some(Decimal::from(1008)));
        assert_eq!(recs[2].fields[3].as_decimal(), Decimal::from_str("5.0039").ok());
    }

    #[test]
    fn parameters_only_file_is_rejected() {
        let bytes = latin1("12/03/2024\n;Beta 1\nPREFIXADOS;0,1\n");
        assert!(!CurveAdapter.is_valid_response(&bytes));
        let err = CurveAdapter.parse(&bytes, ymd(2024, 3, 12)).unwrap_err();
        assert!(matches!(err, ParseError::MissingHeader { .. }), "{err}");
    }
}
