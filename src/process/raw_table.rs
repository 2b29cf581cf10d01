use csv::ReaderBuilder;

use super::{
    utils::{first_line, fold_header, normalize_header},
    ParseError,
};

/// Where the header row of an export sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderAt {
    /// Fixed zero-based line offset from the top of the payload.
    Line(usize),
    /// First line whose first cell equals this text, ignoring case and accents.
    FirstCell(&'static str),
}

/// Fixed shape of a delimited export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLayout {
    pub delimiter: u8,
    pub header: HeaderAt,
    /// Trailing notes to drop, counted after trailing blank lines are removed.
    pub footer_rows: usize,
    /// Stop at the first blank line after the header instead of reading to the end.
    pub stop_at_blank: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// One-based line number in the payload, for error messages.
    pub line: usize,
    pub cells: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RawTable {
    /// Column names as the file claims them, normalised.
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    /// Cut the header and data rows out of `text` according to `layout`.
    pub fn extract(text: &str, layout: &TableLayout) -> Result<Self, ParseError> {
        let lines: Vec<&str> = text.lines().collect();
        let header_idx = match layout.header {
            HeaderAt::Line(n) => n,
            HeaderAt::FirstCell(label) => lines
                .iter()
                .position(|l| {
                    l.split(layout.delimiter as char)
                        .next()
                        .is_some_and(|c| fold_header(c) == fold_header(label))
                })
                .ok_or_else(|| ParseError::MissingHeader {
                    expected: label.to_string(),
                    first_line: first_line(text).to_string(),
                })?,
        };
        let header_line = lines
            .get(header_idx)
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| ParseError::MissingHeader {
                expected: format!("header on line {}", header_idx + 1),
                first_line: first_line(text).to_string(),
            })?;

        let mut end = lines.len();
        while end > header_idx + 1 && lines[end - 1].trim().is_empty() {
            end -= 1;
        }
        end = end.saturating_sub(layout.footer_rows).max(header_idx + 1);
        if layout.stop_at_blank {
            if let Some(gap) = lines[header_idx + 1..end]
                .iter()
                .position(|l| l.trim().is_empty())
            {
                end = header_idx + 1 + gap;
            }
        }

        let headers = split_record(header_line, layout.delimiter)
            .map_err(|e| ParseError::Malformed(format!("header line {}: {}", header_idx + 1, e)))?
            .iter()
            .map(|h| normalize_header(h))
            .collect();

        let mut rows = Vec::new();
        for (offset, line) in lines[header_idx + 1..end].iter().enumerate() {
            let line_no = header_idx + offset + 2;
            let cells = split_record(line, layout.delimiter)
                .map_err(|e| ParseError::Malformed(format!("line {}: {}", line_no, e)))?;
            if cells.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            rows.push(RawRow { line: line_no, cells });
        }
        Ok(Self { headers, rows })
    }

    /// Index of a source-native column, ignoring spacing, case and accents.
    pub fn column(&self, name: &str) -> Option<usize> {
        let wanted = fold_header(name);
        self.headers.iter().position(|h| fold_header(h) == wanted)
    }
}

fn split_record(line: &str, delimiter: u8) -> Result<Vec<String>, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(line.as_bytes());
    match rdr.records().next() {
        Some(rec) => Ok(rec?.iter().map(|c| c.trim().to_string()).collect()),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDKA_LIKE: &str = "IDkA - Data de Referência: 01/03/2024\n\
        \n\
        Indexador;Índices;Nº Índice\n\
        Prefixado;IDKA PRE 3M;1.234,56\n\
        \n\
        IPCA;IDKA IPCA 2A;9.876,54\n\
        nota 1\n\
        nota 2\n\
        nota 3\n\
        \n";

    #[test]
    fn fixed_offset_and_footer() {
        let layout = TableLayout {
            delimiter: b';',
            header: HeaderAt::Line(2),
            footer_rows: 3,
            stop_at_blank: false,
        };
        let t = RawTable::extract(IDKA_LIKE, &layout).unwrap();
        assert_eq!(t.headers, vec!["Indexador", "Índices", "Nº Índice"]);
        assert_eq!(t.rows.len(), 2);
        assert_eq!(t.rows[0].line, 4);
        assert_eq!(t.rows[1].cells[1], "IDKA IPCA 2A");
        assert_eq!(t.column(" Nº  Índice"), Some(2));
    }

    #[test]
    fn header_located_by_first_cell() {
        let text = "12/03/2024\n;Beta 1\nPREFIXADOS;0,1\n\nVertices;ETTJ IPCA\n126;5,1\n252;5,2\n\nPREFIXADOS (CIRCULAR)\n";
        let layout = TableLayout {
            delimiter: b';',
            header: HeaderAt::FirstCell("vertices"),
            footer_rows: 0,
            stop_at_blank: true,
        };
        let t = RawTable::extract(text, &layout).unwrap();
        assert_eq!(t.headers, vec!["Vertices", "ETTJ IPCA"]);
        assert_eq!(t.rows.len(), 2);
    }

    #[test]
    fn missing_header_reports_first_line() {
        let layout = TableLayout {
            delimiter: b'@',
            header: HeaderAt::FirstCell("Titulo"),
            footer_rows: 0,
            stop_at_blank: false,
        };
        match RawTable::extract("ANBIMA\nnada aqui\n", &layout) {
            Err(ParseError::MissingHeader { first_line, .. }) => assert_eq!(first_line, "ANBIMA"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn header_offset_past_end_is_missing() {
        let layout = TableLayout {
            delimiter: b';',
            header: HeaderAt::Line(5),
            footer_rows: 0,
            stop_at_blank: false,
        };
        assert!(matches!(
            RawTable::extract("a\nb\n", &layout),
            Err(ParseError::MissingHeader { .. })
        ));
    }
}
