use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Formats tried in order before the generic fallback. The first one that
/// consumes the whole value wins, so `01/02/2024` is read month-first.
pub const DATE_FORMATS: [&str; 7] = [
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%B %d, %Y",
    "%Y/%m/%d",
    "%d-%b-%Y",
    "%Y-%b-%d",
];

const FALLBACK_DATE_FORMATS: [&str; 9] = [
    "%b %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%Y.%m.%d",
    "%d.%m.%Y",
    "%m-%d-%Y",
    "%d/%m/%Y",
    "%m/%d/%y",
];

const FALLBACK_DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Parse a cell as a calendar date. Time-of-day and offsets are dropped.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| parse_date_fallback(value))
}

/// Best-effort parsing for the shapes the fixed list misses: timestamps,
/// RFC 3339 / 2822, month-name orderings, dotted dates.
fn parse_date_fallback(value: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.date_naive());
    }
    if let Some(dt) = FALLBACK_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
    {
        return Some(dt.date());
    }
    FALLBACK_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| parse_year_month(value))
}

/// `YYYY-MM`, read as the first of the month.
fn parse_year_month(value: &str) -> Option<NaiveDate> {
    let (year, month) = value.split_once('-')?;
    let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if year.len() != 4 || !(1..=2).contains(&month.len()) || !digits(year) || !digits(month) {
        return None;
    }
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1)
}

/// Month number (1-12) for a three-letter abbreviation, any case.
pub fn month_from_abbreviation(abbrev: &str) -> Option<u32> {
    let abbrev = abbrev.trim().to_ascii_lowercase();
    MONTH_ABBREVIATIONS
        .iter()
        .position(|m| *m == abbrev)
        .map(|i| i as u32 + 1)
}

// ---------------------------------------------------------------------------
// Column kind detection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Date,
    Category,
}

/// Decides whether a reference column holds dates by parsing the first
/// `sample_size` non-empty values and requiring at least `min_match_ratio`
/// of them to parse.
///
/// The default samples a single value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnKindDetector {
    pub sample_size: usize,
    pub min_match_ratio: f64,
}

impl Default for ColumnKindDetector {
    fn default() -> Self {
        Self {
            sample_size: 1,
            min_match_ratio: 1.0,
        }
    }
}

impl ColumnKindDetector {
    pub fn new(sample_size: usize, min_match_ratio: f64) -> Self {
        Self {
            sample_size: sample_size.max(1),
            min_match_ratio: min_match_ratio.clamp(0.0, 1.0),
        }
    }

    pub fn detect<I, S>(&self, values: I) -> ColumnKind
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sampled = 0usize;
        let mut parsed = 0usize;
        for value in values {
            let value = value.as_ref();
            if value.trim().is_empty() {
                continue;
            }
            sampled += 1;
            if parse_date(value).is_some() {
                parsed += 1;
            }
            if sampled == self.sample_size {
                break;
            }
        }
        if sampled > 0 && parsed as f64 >= self.min_match_ratio * sampled as f64 {
            ColumnKind::Date
        } else {
            ColumnKind::Category
        }
    }
}
