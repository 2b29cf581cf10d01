// src/calendar.rs

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::{collections::BTreeSet, fs, path::Path};
use tracing::{debug, warn};

/// Business-day calendar: a holiday list plus a fixed set of weekend days.
#[derive(Debug, Clone)]
pub struct BusinessCalendar {
    holidays: BTreeSet<NaiveDate>,
    weekend: Vec<Weekday>,
}

impl Default for BusinessCalendar {
    fn default() -> Self {
        Self::new(std::iter::empty())
    }
}

impl BusinessCalendar {
    /// Calendar with Saturday/Sunday weekends.
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self::with_weekend(holidays, vec![Weekday::Sat, Weekday::Sun])
    }

    pub fn with_weekend(holidays: impl IntoIterator<Item = NaiveDate>, weekend: Vec<Weekday>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
            weekend,
        }
    }

    /// Read a holiday file: one date per line, `yyyy-mm-dd` or `dd/mm/yyyy`.
    /// Blank lines and `#` comments are ignored.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading holidays {}", path.display()))?;
        let mut holidays = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let date = NaiveDate::parse_from_str(line, "%Y-%m-%d")
                .or_else(|_| NaiveDate::parse_from_str(line, "%d/%m/%Y"))
                .with_context(|| format!("{}:{}: bad holiday {:?}", path.display(), idx + 1, line))?;
            holidays.push(date);
        }
        debug!(path = %path.display(), count = holidays.len(), "loaded holidays");
        Ok(Self::new(holidays))
    }

    /// Like [`load`](Self::load), but a missing file means weekends only.
    pub fn load_or_weekends(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            warn!(path = %path.display(), "holiday file not found; using weekends only");
            Ok(Self::default())
        }
    }

    pub fn holiday_count(&self) -> usize {
        self.holidays.len()
    }

    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        !self.weekend.contains(&date.weekday()) && !self.holidays.contains(&date)
    }

    /// Business days in `[start, end]`, ascending. Empty when `start > end`.
    pub fn business_days_in_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| self.is_business_day(*d))
            .collect()
    }

    /// Move `n` business days forward (or back, for negative `n`).
    pub fn offset(&self, date: NaiveDate, n: i64) -> NaiveDate {
        let step = if n < 0 { Duration::days(-1) } else { Duration::days(1) };
        let mut remaining = n.unsigned_abs();
        let mut current = date;
        while remaining > 0 {
            current += step;
            if self.is_business_day(current) {
                remaining -= 1;
            }
        }
        current
    }

    pub fn next_business_day(&self, date: NaiveDate) -> NaiveDate {
        self.offset(date, 1)
    }

    pub fn previous_business_day(&self, date: NaiveDate) -> NaiveDate {
        self.offset(date, -1)
    }

    /// The `n` most recent business days up to and including `end`, ascending.
    pub fn last_n_business_days(&self, n: usize, end: NaiveDate) -> Vec<NaiveDate> {
        let mut days = Vec::with_capacity(n);
        let mut current = end;
        while days.len() < n {
            if self.is_business_day(current) {
                days.push(current);
            }
            current -= Duration::days(1);
        }
        days.reverse();
        days
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn range_skips_weekend_and_holiday() {
        let cal = BusinessCalendar::new([d(2024, 1, 1)]);
        assert_eq!(
            cal.business_days_in_range(d(2023, 12, 29), d(2024, 1, 1)),
            vec![d(2023, 12, 29)]
        );
        assert_eq!(
            cal.business_days_in_range(d(2023, 12, 29), d(2024, 1, 2)),
            vec![d(2023, 12, 29), d(2024, 1, 2)]
        );
    }

    #[test]
    fn inverted_range_is_empty() {
        let cal = BusinessCalendar::default();
        assert!(cal
            .business_days_in_range(d(2024, 3, 5), d(2024, 3, 4))
            .is_empty());
    }

    #[test]
    fn offset_walks_over_non_business_days() {
        let cal = BusinessCalendar::new([d(2024, 2, 12), d(2024, 2, 13)]);
        // Friday before carnival -> Wednesday after
        assert_eq!(cal.next_business_day(d(2024, 2, 9)), d(2024, 2, 14));
        assert_eq!(cal.previous_business_day(d(2024, 2, 14)), d(2024, 2, 9));
        assert_eq!(cal.offset(d(2024, 3, 1), 0), d(2024, 3, 1));
        assert_eq!(cal.offset(d(2024, 3, 1), 5), d(2024, 3, 8));
        assert_eq!(cal.offset(d(2024, 3, 8), -5), d(2024, 3, 1));
    }

    #[test]
    fn last_n_ends_on_latest_business_day() {
        let cal = BusinessCalendar::default();
        // Sunday
        let days = cal.last_n_business_days(3, d(2024, 3, 10));
        assert_eq!(days, vec![d(2024, 3, 6), d(2024, 3, 7), d(2024, 3, 8)]);
    }

    #[test]
    fn load_accepts_both_formats() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ANBIMA.txt");
        fs::write(&path, "# feriados\n2024-01-01\n\n12/02/2024\n").unwrap();
        let cal = BusinessCalendar::load(&path).unwrap();
        assert_eq!(cal.holiday_count(), 2);
        assert!(!cal.is_business_day(d(2024, 2, 12)));
    }

    #[test]
    fn load_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ANBIMA.txt");
        fs::write(&path, "2024-01-01\nnot a date\n").unwrap();
        let err = BusinessCalendar::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains(":2:"));
    }

    #[test]
    fn missing_file_means_weekends_only() {
        let dir = tempdir().unwrap();
        let cal = BusinessCalendar::load_or_weekends(&dir.path().join("none.txt")).unwrap();
        assert_eq!(cal.holiday_count(), 0);
        assert!(cal.is_business_day(d(2024, 1, 1)));
    }
}
