use rust_decimal::Decimal;
use std::str::FromStr;

use super::utils::clean_str;

/// Cells the exports use for "no value".
const NULL_TOKENS: &[&str] = &["", "-", "--", "---", "N/D", "n/d", "ND", "NA", "N/A"];

pub fn is_null_token(s: &str) -> bool {
    NULL_TOKENS.contains(&clean_str(s).as_str())
}

/// Parse a pt-BR formatted number (`1.234,56`, `-0,0123`, `1,5E-03`).
///
/// Returns `Ok(None)` for empty/placeholder cells. With no comma present,
/// dots are thousands separators only when every group after the first has
/// exactly three digits (`1.008` is 1008, `10.5` stays 10.5).
pub fn parse_br_decimal(raw: &str) -> Result<Option<Decimal>, String> {
    if is_null_token(raw) {
        return Ok(None);
    }
    let s = clean_str(raw);
    let s = s.strip_prefix('+').unwrap_or(&s);

    let canonical = if s.contains(',') {
        s.replace('.', "").replace(',', ".")
    } else if is_thousands_grouped(s) {
        s.replace('.', "")
    } else {
        s.to_string()
    };

    let parsed = if canonical.contains(['e', 'E']) {
        Decimal::from_scientific(&canonical)
    } else {
        Decimal::from_str(&canonical)
    };
    parsed
        .map(Some)
        .map_err(|e| format!("{raw:?} is not a number: {e}"))
}

fn is_thousands_grouped(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let mut groups = digits.split('.');
    let Some(head) = groups.next() else {
        return false;
    };
    let rest: Vec<&str> = groups.collect();
    !rest.is_empty()
        && (1..=3).contains(&head.len())
        && head.chars().all(|c| c.is_ascii_digit())
        && rest
            .iter()
            .all(|g| g.len() == 3 && g.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Option<Decimal> {
        Some(Decimal::from_str(s).unwrap())
    }

    #[test]
    fn comma_decimal_with_thousands() {
        assert_eq!(parse_br_decimal("1.234.567,89").unwrap(), dec("1234567.89"));
        assert_eq!(parse_br_decimal("-0,0123").unwrap(), dec("-0.0123"));
        assert_eq!(parse_br_decimal(" \"10,50\" ").unwrap(), dec("10.50"));
        assert_eq!(parse_br_decimal("+2,5").unwrap(), dec("2.5"));
    }

    #[test]
    fn dots_without_comma() {
        assert_eq!(parse_br_decimal("1.008").unwrap(), dec("1008"));
        assert_eq!(parse_br_decimal("10.5").unwrap(), dec("10.5"));
        assert_eq!(parse_br_decimal("126").unwrap(), dec("126"));
    }

    #[test]
    fn scientific_notation() {
        assert_eq!(parse_br_decimal("1,5E-03").unwrap(), dec("0.0015"));
    }

    #[test]
    fn placeholders_are_null() {
        for raw in ["", " ", "--", "-", "N/D"] {
            assert_eq!(parse_br_decimal(raw).unwrap(), None, "{raw:?}");
        }
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_br_decimal("abc").is_err());
        assert!(parse_br_decimal("12,3,4").is_err());
    }
}
