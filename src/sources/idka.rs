// src/sources/idka.rs
//! IDkA: constant-duration index family, one CSV per reference date.
//!
//! ```text
//! IDkA - Data de Referência: 04/03/2024
//!
//! Indexador;Índices;Nº Índice;Retorno (% Dia);...
//! Prefixado;IDKA PRE 3M;5.612,123456;0,0423;...
//! ...
//! <three lines of notes>
//! ```

use chrono::NaiveDate;

use super::{is_no_data, ymd, ParseError, SourceAdapter};
use crate::{
    fetch::SourceRequest,
    process::{
        date_parser::{find_br_date, format_br_date},
        decode_text, first_line, map_rows, DateStyle, HeaderAt, RawTable, RowDate, TableLayout,
    },
    schema::{Column, ReferenceRecord, Schema, DATE_COLUMN},
};

const URL: &str = "http://www.anbima.com.br/informacoes/idka/IDkA-down.asp";
const SIGNATURE: &str = "Data de Referência:";

const COLUMNS: &[Column] = &[
    Column::date(DATE_COLUMN),
    Column::text("no_indexador"),
    Column::text("no_indice"),
    Column::decimal("nu_indice"),
    Column::decimal("ret_dia_perc"),
    Column::decimal("ret_mes_perc"),
    Column::decimal("ret_ano_perc"),
    Column::decimal("ret_12_meses_perc"),
    Column::decimal("vol_aa_perc"),
    Column::decimal("taxa_juros_aa_perc_compra_d1"),
    Column::decimal("taxa_juros_aa_perc_venda_d0"),
];

const MAPPING: &[(&str, &str)] = &[
    ("Indexador", "no_indexador"),
    ("Índices", "no_indice"),
    ("Nº Índice", "nu_indice"),
    ("Retorno (% Dia)", "ret_dia_perc"),
    ("Retorno (% Mês)", "ret_mes_perc"),
    ("Retorno (% Ano)", "ret_ano_perc"),
    ("Retorno (% 12 Meses)", "ret_12_meses_perc"),
    ("Volatilidade (% a.a.) *", "vol_aa_perc"),
    ("Taxa de Juros (% a.a.) [Compra (D-1)]", "taxa_juros_aa_perc_compra_d1"),
    ("Taxa de Juros (% a.a.) [Venda (D-0)]", "taxa_juros_aa_perc_venda_d0"),
];

const LAYOUT: TableLayout = TableLayout {
    delimiter: b';',
    header: HeaderAt::Line(2),
    footer_rows: 3,
    stop_at_blank: false,
};

pub struct IdkaAdapter;

impl SourceAdapter for IdkaAdapter {
    fn name(&self) -> &'static str {
        "idka"
    }

    fn description(&self) -> &'static str {
        "IDkA constant-duration indices"
    }

    fn dataset_file(&self) -> &'static str {
        "idka_base.csv"
    }

    fn schema(&self) -> Schema {
        Schema {
            columns: COLUMNS,
            key: &["no_indice"],
        }
    }

    fn fallback_epoch(&self) -> NaiveDate {
        ymd(2015, 1, 1)
    }

    fn build_request(&self, date: NaiveDate) -> SourceRequest {
        SourceRequest::get(URL)
            .param("DataIni", format_br_date(date))
            .param("Idioma", "PT")
            .param("escolha", "2")
            .param("saida", "csv")
    }

    fn has_expected_header(&self, text: &str) -> bool {
        first_line(text).contains(SIGNATURE)
    }

    fn parse(&self, bytes: &[u8], _date: NaiveDate) -> Result<Vec<ReferenceRecord>, ParseError> {
        let text = decode_text(bytes, self.encoding());
        if is_no_data(&text) {
            return Ok(Vec::new());
        }
        let first = first_line(&text);
        let reference = first
            .split_once(SIGNATURE)
            .and_then(|(_, rest)| find_br_date(rest))
            .ok_or_else(|| ParseError::MissingReferenceDate {
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
