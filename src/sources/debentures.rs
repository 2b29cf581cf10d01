// src/sources/debentures.rs
//! Debentures secondary market: `db{yymmdd}.txt`, `@`-separated. Rows carry
//! no reference date of their own; the file is for the requested date.

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

const URL_PREFIX: &str = "https://www.anbima.com.br/informacoes/merc-sec-debentures/arqs/db";
const HEADER_START: &str = "Código";

const COLUMNS: &[Column] = &[
    Column::date(DATE_COLUMN),
    Column::text("codigo"),
    Column::text("nome"),
    Column::date("dt_repac_vencimento"),
    Column::text("indice_correcao"),
    Column::decimal("tx_compra"),
    Column::decimal("tx_venda"),
    Column::decimal("tx_indicativa"),
    Column::decimal("desvio_padrao"),
    Column::decimal("intervalo_min"),
    Column::decimal("intervalo_max"),
    Column::decimal("pu"),
    Column::decimal("perc_pu_par"),
    Column::decimal("duration"),
    Column::text("perc_reune"),
    Column::text("referencia_ntnb"),
];

const MAPPING: &[(&str, &str)] = &[
    ("Código", "codigo"),
    ("Nome", "nome"),
    ("Repac./ Venc.", "dt_repac_vencimento"),
    ("Índice/ Correção", "indice_correcao"),
    ("Taxa de Compra", "tx_compra"),
    ("Taxa de Venda", "tx_venda"),
    ("Taxa Indicativa", "tx_indicativa"),
    ("Desvio Padrão", "desvio_padrao"),
    ("Intervalo Indicativo Minimo", "intervalo_min"),
    ("Intervalo Indicativo Máximo", "intervalo_max"),
    ("PU", "pu"),
    ("% PU Par", "perc_pu_par"),
    ("Duration", "duration"),
    ("% Reune", "perc_reune"),
    ("Referência NTN-B", "referencia_ntnb"),
];

const LAYOUT: TableLayout = TableLayout {
    delimiter: b'@',
    header: HeaderAt::FirstCell(HEADER_START),
    footer_rows: 0,
    stop_at_blank: false,
};

pub fn file_url(date: NaiveDate) -> String {
    format!("{}{}.txt", URL_PREFIX, date.format("%y%m%d"))
}

pub struct DebenturesAdapter;

impl SourceAdapter for DebenturesAdapter {
    fn name(&self) -> &'static str {
        "debentures"
    }

    fn description(&self) -> &'static str {
        "Debentures secondary market reference rates"
    }

    fn dataset_file(&self) -> &'static str {
        "debentures_base.csv"
    }

    fn schema(&self) -> Schema {
        Schema {
            columns: COLUMNS,
            key: &["codigo"],
        }
    }

    fn fallback_epoch(&self) -> NaiveDate {
        ymd(2015, 1, 1)
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
            .any(|l| l.contains('@') && l.split('@').next().is_some_and(|c| fold_header(c) == wanted))
    }

    fn parse(&self, bytes: &[u8], date: NaiveDate) -> Result<Vec<ReferenceRecord>, ParseError> {
        let text = decode_text(bytes, self.encoding());
        if is_no_data(&text) {
            return Ok(Vec::new());
        }
        let mut table = RawTable::extract(&text, &LAYOUT)?;
        // index group titles sit on their own line between blocks
        table.rows.retain(|r| r.cells.len() > 1);
        map_rows(
            &table,
            &self.schema(),
            MAPPING,
            DateStyle::Br,
            RowDate::Fixed(date),
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

    const HEADER: &str = "Código@Nome@Repac./  Venc.@Índice/ Correção@Taxa de Compra@Taxa de Venda@\
        Taxa Indicativa@Desvio Padrão@Intervalo Indicativo Minimo@Intervalo Indicativo Máximo@PU@\
        % PU Par@Duration@% Reune@Referência NTN-B";

    fn payload() -> Vec<u8> {
        latin1(&format!(
            "ANBIMA - Mercado Secundário de Debêntures\n\n{HEADER}\n\
             DI_PERCENTUAL\n\
             AALM12@ALLIANÇA SAÚDE@15/06/2026@107,5000% do DI@--@--@107,2211@0,1123@106,9000@107,6000@1.012,345678@100,12@523,00@--@--\n\
             IPCA_SPREAD\n\
             CMIG27@CEMIG DISTRIBUIÇÃO@15/02/2030@IPCA + 6,1000%@6,3000@6,2000@6,2512@0,0501@6,1000@6,4000@1.210,987654@98,44@1.720,00@N/D@15/08/2030\n"
        ))
    }

    #[test]
    fn url_uses_two_digit_year() {
        assert_eq!(
            file_url(ymd(2024, 3, 4)),
            "https://www.anbima.com.br/informacoes/merc-sec-debentures/arqs/db240304.txt"
        );
    }

    #[test]
    fn rows_take_the_requested_date() {
        let bytes = payload();
        assert!(DebenturesAdapter.is_valid_response(&bytes));
        let recs = DebenturesAdapter.parse(&bytes, ymd(2024, 3, 4)).unwrap();
        assert_eq!(recs.len(), 2);
        assert!(recs.iter().all(|r| r.reference_date == ymd(2024, 3, 4)));
        assert_eq!(recs[0].fields[0], Field::Text("AALM12".into()));
        assert_eq!(recs[0].fields[2], Field::Date(ymd(2026, 6, 15)));
        assert!(recs[0].fields[4].is_null());
        assert_eq!(recs[1].fields[10].as_decimal(), Decimal::from_str("1210.987654").ok());
        assert_eq!(recs[1].fields[12].as_decimal(), Decimal::from_str("1720").ok());
        assert!(recs[1].fields[13].is_null());
        assert_eq!(recs[1].fields[14], Field::Text("15/08/2030".into()));
    }

    #[test]
    fn body_without_header_is_rejected() {
        let bytes = latin1("ANBIMA - Mercado Secundário de Debêntures\n\nAALM12@X@--\n");
        assert!(!DebenturesAdapter.is_valid_response(&bytes));
        assert!(matches!(
            DebenturesAdapter.parse(&bytes, ymd(2024, 3, 4)),
            Err(ParseError::MissingHeader { .. })
        ));
    }
}
