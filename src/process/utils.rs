/// Character encoding of a payload or dataset file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Single-byte legacy encoding used by the published exports.
    Latin1,
    Utf8,
    /// UTF-8 if the bytes are valid UTF-8, Latin-1 otherwise.
    Detect,
}

/// Decode `bytes` to text. Latin-1 maps every byte straight to the code
/// point of the same value, so it never fails.
pub fn decode_text(bytes: &[u8], encoding: Encoding) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match encoding {
        Encoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        Encoding::Detect => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => bytes.iter().map(|&b| b as char).collect(),
        },
    }
}

/// Trim whitespace and strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Header cell as used for matching: cleaned, inner whitespace collapsed.
pub fn normalize_header(raw: &str) -> String {
    clean_str(raw).split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Comparison form of a header: normalised, lowercase, Portuguese accents folded.
pub fn fold_header(raw: &str) -> String {
    normalize_header(raw)
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' => 'a',
            'é' | 'ê' => 'e',
            'í' => 'i',
            'ó' | 'ô' | 'õ' => 'o',
            'ú' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

/// First line with any non-whitespace content, trimmed.
pub fn first_line(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_bytes_decode() {
        let raw = b"Data de Refer\xeancia: 01/03/2024";
        assert_eq!(decode_text(raw, Encoding::Latin1), "Data de Referência: 01/03/2024");
        assert_eq!(decode_text(raw, Encoding::Detect), "Data de Referência: 01/03/2024");
    }

    #[test]
    fn detect_keeps_utf8() {
        let raw = "\u{feff}Índice;Peso".as_bytes();
        assert_eq!(decode_text(raw, Encoding::Detect), "Índice;Peso");
    }

    #[test]
    fn headers_normalise() {
        assert_eq!(normalize_header("  \"Repac./  Venc.\" "), "Repac./ Venc.");
        assert_eq!(clean_str("  Nº Índice "), "Nº Índice");
        assert_eq!(fold_header("Vértices"), "vertices");
        assert_eq!(fold_header(" Código "), "codigo");
    }

    #[test]
    fn first_line_skips_blanks() {
        assert_eq!(first_line("\n  \n  QUADRO-RESUMO \nx"), "QUADRO-RESUMO");
        assert_eq!(first_line(""), "");
    }
}
