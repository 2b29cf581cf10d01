// src/sources/ima.rs
//! IMA "quadro-resumo": daily summary of the IMA index family. Each row
//! carries its own reference date.

use chrono::NaiveDate;

use super::{is_no_data, ymd, ParseError, SourceAdapter};
use crate::{
    fetch::SourceRequest,
    process::{
        date_parser::format_br_date, decode_text, first_line, map_rows, DateStyle, HeaderAt,
        RawTable, RowDate, TableLayout,
    },
    schema::{Column, ReferenceRecord, Schema, DATE_COLUMN},
};

const URL: &str = "http://www.anbima.com.br/informacoes/ima/IMA-geral-down.asp";
const SIGNATURE: &str = "QUADRO-RESUMO";
const DATE_HEADER: &str = "Data de Referência";

const COLUMNS: &[Column] = &[
    Column::date(DATE_COLUMN),
    Column::text("no_indice"),
    Column::decimal("nu_indice"),
    Column::decimal("var_diaria_perc"),
    Column::decimal("var_mensal_perc"),
    Column::decimal("var_anual_perc"),
    Column::decimal("var_ult_12_meses_perc"),
    Column::decimal("var_ult_24_meses_perc"),
    Column::decimal("peso_perc"),
    Column::decimal("duration_du"),
    Column::decimal("carteira_mercado_reais_mil"),
    Column::decimal("nu_operacoes"),
    Column::decimal("qt_negociada_1000_tit"),
    Column::decimal("vr_negociado_reais_mil"),
    Column::decimal("pmr"),
    Column::decimal("convexidade"),
    Column::decimal("yield"),
    Column::decimal("redemption_yield"),
];

const MAPPING: &[(&str, &str)] = &[
    ("Índice", "no_indice"),
    ("Número Índice", "nu_indice"),
    ("Variação Diária (%)", "var_diaria_perc"),
    ("Variação Mensal (%)", "var_mensal_perc"),
    ("Variação Anual (%)", "var_anual_perc"),
    ("Variação Últimos 12 Meses (%)", "var_ult_12_meses_perc"),
    ("Variação Últimos 24 Meses (%)", "var_ult_24_meses_perc"),
    ("Peso (%)", "peso_perc"),
    ("Duration (d.u.)", "duration_du"),
    ("Carteira a Mercado (R$ mil)", "carteira_mercado_reais_mil"),
    ("Número de Operações *", "nu_operacoes"),
    ("Quant. Negociada (1.000 títulos) *", "qt_negociada_1000_tit"),
    ("Valor Negociado (R$ mil) *", "vr_negociado_reais_mil"),
    ("PMR", "pmr"),
    ("Convexidade", "convexidade"),
    ("Yield", "yield"),
    ("Redemption Yield", "redemption_yield"),
];

const LAYOUT: TableLayout = TableLayout {
    delimiter: b';',
    header: HeaderAt::Line(1),
    footer_rows: 0,
    stop_at_blank: false,
};

pub struct ImaQuadroResumoAdapter;

impl SourceAdapter for ImaQuadroResumoAdapter {
    fn name(&self) -> &'static str {
        "ima_quadro_resumo"
    }

    fn description(&self) -> &'static str {
        "IMA index family daily summary"
    }

    fn dataset_file(&self) -> &'static str {
        "ima_quadro_resumo_base.csv"
    }

    fn schema(&self) -> Schema {
        Schema {
            columns: COLUMNS,
            key: &["no_indice"],
        }
    }

    fn fallback_epoch(&self) -> NaiveDate {
        ymd(2010, 1, 1)
    }

    fn build_request(&self, date: NaiveDate) -> SourceRequest {
        let d = format_br_date(date);
        SourceRequest::get(URL)
            .param("Titulo_1", "quadro-resumo")
            .param("Consulta_1", "Ambos")
            .param("Dt_Ref", d.clone())
            .param("DataIni", d.clone())
            .param("DataFim", d)
            .param("Indice", "quadro-resumo")
            .param("Consulta", "Ambos")
            .param("saida", "csv")
            .param("Idioma", "PT")
    }

    fn has_expected_header(&self, text: &str) -> bool {
        first_line(text).contains(SIGNATURE)
    }

    fn parse(&self, bytes: &[u8], _date: NaiveDate) -> Result<Vec<ReferenceRecord>, ParseError> {
        let text = decode_text(bytes, self.encoding());
        if is_no_data(&text) {
            return Ok(Vec::new());
        }
        let mut table = RawTable::extract(&text, &LAYOUT)?;
        // single-cell lines are notes, not index rows
        table.rows.retain(|r| r.cells.len() > 1);
        map_rows(
            &table,
            &self.schema(),
            MAPPING,
            DateStyle::Br,
            RowDate::Column(DATE_HEADER),
            first_line(&text),
        )
    }
}
