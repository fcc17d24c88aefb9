use chrono::{Datelike, NaiveDate};

use super::model::Row;

// ---------------------------------------------------------------------------
// Row predicates applied before any grouping
// ---------------------------------------------------------------------------

/// A row that survived numeric coercion, paired with its value.
pub type NumericRow<'a> = (&'a Row, f64);

/// A value paired with the calendar date of its row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatedValue {
    pub date: NaiveDate,
    pub value: f64,
}

/// Coerce `column` to numbers and keep only the rows where that worked.
/// Rows are never defaulted to zero.
pub fn numeric_rows<'a>(rows: &'a [Row], column: &str) -> Vec<NumericRow<'a>> {
    let kept: Vec<NumericRow<'a>> = rows
        .iter()
        .filter_map(|row| row.get(column).to_number().map(|v| (row, v)))
        .collect();

    let dropped = rows.len() - kept.len();
    if dropped > 0 {
        log::warn!("Non-numeric values in {column}. Dropping {dropped} rows.");
    }
    kept
}

/// Values falling inside one calendar month.
pub fn in_month(values: &[DatedValue], year: i32, month: u32) -> Vec<DatedValue> {
    values
        .iter()
        .filter(|v| v.date.year() == year && v.date.month() == month)
        .copied()
        .collect()
}
