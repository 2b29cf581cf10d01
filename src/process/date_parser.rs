use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static BR_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{2})/(\d{2})/(\d{4})").unwrap());

/// `dd/mm/yyyy`, surrounding whitespace allowed.
pub fn parse_br_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%d/%m/%Y").ok()
}

/// `yyyymmdd`, as used in the secondary-market flat files.
pub fn parse_compact_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.len() != 8 || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y%m%d").ok()
}

/// First valid `dd/mm/yyyy` anywhere in `text`.
pub fn find_br_date(text: &str) -> Option<NaiveDate> {
    BR_DATE.captures_iter(text).find_map(|caps| {
        let (d, m, y) = (
            caps[1].parse::<u32>().ok()?,
            caps[2].parse::<u32>().ok()?,
            caps[3].parse::<i32>().ok()?,
        );
        NaiveDate::from_ymd_opt(y, m, d)
    })
}

/// Request parameter form of a date.
pub fn format_br_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}
