use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer};

use super::dates::{self, ColumnKind, ColumnKindDetector};
use super::result::{AggregationResult, ChartSeries};
use crate::data::filter::{self, DatedValue, NumericRow};
use crate::data::model::Dataset;
use crate::data::store::DatasetStore;
use crate::error::AnalysisError;

const SERIES_NAME: &str = "Data";
const DAY_SERIES_NAME: &str = "Day-wise Data";

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Narrow a date aggregation to the days of one month, e.g.
/// `{"month": "jan", "year": "2024"}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct DrillDown {
    #[serde(default)]
    pub month: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub year: String,
}

impl DrillDown {
    pub fn new(month: impl Into<String>, year: impl Into<String>) -> Self {
        Self {
            month: month.into(),
            year: year.into(),
        }
    }

    /// A selector missing either part is ignored.
    fn is_complete(&self) -> bool {
        !self.month.trim().is_empty() && !self.year.trim().is_empty()
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Year {
        Text(String),
        Number(i64),
    }
    Ok(match Year::deserialize(deserializer)? {
        Year::Text(s) => s,
        Year::Number(n) => n.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationRequest {
    pub numeric_column: String,
    pub reference_column: Option<String>,
    pub drill_down: Option<DrillDown>,
}

impl AggregationRequest {
    pub fn new(numeric_column: impl Into<String>) -> Self {
        Self {
            numeric_column: numeric_column.into(),
            reference_column: None,
            drill_down: None,
        }
    }

    pub fn with_reference(mut self, column: impl Into<String>) -> Self {
        self.reference_column = Some(column.into());
        self
    }

    pub fn with_drill_down(mut self, drill_down: DrillDown) -> Self {
        self.drill_down = Some(drill_down);
        self
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Runs aggregations against the stored dataset. Holds no mutable state, so
/// one instance can serve any number of concurrent jobs.
#[derive(Debug, Clone)]
pub struct Aggregator {
    store: DatasetStore,
    detector: ColumnKindDetector,
}

impl Aggregator {
    pub fn new(store: DatasetStore, detector: ColumnKindDetector) -> Self {
        Self { store, detector }
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    /// Load the dataset and aggregate it. Every error becomes a
    /// [`AggregationResult::Failure`].
    pub fn aggregate(&self, request: &AggregationRequest) -> AggregationResult {
        let outcome = self
            .store
            .load()
            .and_then(|dataset| aggregate_dataset(&dataset, request, &self.detector));
        match outcome {
            Ok(result) => result,
            Err(err) => {
                log::error!("Aggregation failed: {err}");
                AggregationResult::failure(err.to_string())
            }
        }
    }
}

/// Aggregate an already loaded dataset.
pub fn aggregate_dataset(
    dataset: &Dataset,
    request: &AggregationRequest,
    detector: &ColumnKindDetector,
) -> Result<AggregationResult, AnalysisError> {
    let numeric = request.numeric_column.as_str();
    if !dataset.has_column(numeric) {
        return Err(AnalysisError::ColumnNotFound(numeric.to_string()));
    }
    let rows = filter::numeric_rows(&dataset.rows, numeric);

    let reference = match request.reference_column.as_deref() {
        Some(reference) if !dataset.has_column(reference) => {
            return Err(AnalysisError::ColumnNotFound(reference.to_string()));
        }
        reference => reference,
    };

    if rows.is_empty() {
        return Ok(AggregationResult::empty(format!(
            "No numeric data in '{numeric}'"
        )));
    }

    let Some(reference) = reference else {
        return Ok(by_row_index(&rows));
    };

    let kind = detector.detect(
        rows.iter()
            .filter_map(|(row, _)| row.get(reference).as_text()),
    );
    log::info!(
        "Reference column '{reference}' detected as {}",
        match kind {
            ColumnKind::Date => "date",
            ColumnKind::Category => "non-date",
        }
    );

    match kind {
        ColumnKind::Category => Ok(by_category(&rows, reference)),
        ColumnKind::Date => {
            let values = dated_values(&rows, reference);
            if values.is_empty() {
                return Ok(AggregationResult::empty(
                    AnalysisError::UnparseableDates.to_string(),
                ));
            }
            match request.drill_down.as_ref().filter(|d| d.is_complete()) {
                Some(selector) => by_day(&values, selector),
                None => Ok(by_month(&values)),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

/// One point per surviving row, labeled by its original row index.
fn by_row_index(rows: &[NumericRow<'_>]) -> AggregationResult {
    let series = ChartSeries {
        labels: rows.iter().map(|(row, _)| row.index.to_string()).collect(),
        values: rows.iter().map(|(_, v)| *v).collect(),
        series_name: SERIES_NAME.to_string(),
    };
    AggregationResult::success(mean(series.values.iter().copied()), series)
}

/// Mean per distinct reference value, in order of first occurrence. Rows
/// whose reference value is missing are left out of the groups.
fn by_category(rows: &[NumericRow<'_>], reference: &str) -> AggregationResult {
    let mut order: Vec<(String, f64, usize)> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();

    for (row, value) in rows {
        let Some(key) = row.get(reference).as_text() else {
            continue;
        };
        let idx = *position.entry(key.clone()).or_insert_with(|| {
            order.push((key, 0.0, 0));
            order.len() - 1
        });
        order[idx].1 += value;
        order[idx].2 += 1;
    }

    let series = ChartSeries {
        labels: order.iter().map(|(key, _, _)| key.clone()).collect(),
        values: order
            .iter()
            .map(|(_, sum, count)| sum / *count as f64)
            .collect(),
        series_name: SERIES_NAME.to_string(),
    };
    AggregationResult::success(mean(rows.iter().map(|(_, v)| *v)), series)
}

/// Parse the reference column of every row; rows whose date cannot be
/// read are dropped.
fn dated_values(rows: &[NumericRow<'_>], reference: &str) -> Vec<DatedValue> {
    let values: Vec<DatedValue> = rows
        .iter()
        .filter_map(|(row, value)| {
            let text = row.get(reference).as_text()?;
            dates::parse_date(&text).map(|date| DatedValue {
                date,
                value: *value,
            })
        })
        .collect();

    let invalid = rows.len() - values.len();
    if invalid > 0 {
        log::warn!("Found {invalid} invalid dates in {reference}. Dropping rows.");
    }
    values
}

/// Mean per calendar month, chronological, labeled `Jan 2024`.
fn by_month(values: &[DatedValue]) -> AggregationResult {
    let mut months: BTreeMap<(i32, u32), (f64, usize)> = BTreeMap::new();
    for v in values {
        let slot = months.entry((v.date.year(), v.date.month())).or_default();
        slot.0 += v.value;
        slot.1 += 1;
    }

    let mut labels = Vec::with_capacity(months.len());
    let mut means = Vec::with_capacity(months.len());
    for ((year, month), (sum, count)) in months {
        let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap_or_default();
        labels.push(first.format("%b %Y").to_string());
        means.push(sum / count as f64);
    }

    let series = ChartSeries {
        labels,
        values: means,
        series_name: SERIES_NAME.to_string(),
    };
    AggregationResult::success(mean(values.iter().map(|v| v.value)), series)
}

/// Sum per day within the selected month, ascending, labeled `YYYY-MM-DD`.
/// The scalar is the mean over the month's ungrouped rows.
fn by_day(values: &[DatedValue], selector: &DrillDown) -> Result<AggregationResult, AnalysisError> {
    let month_text = selector.month.trim().to_ascii_lowercase();
    let year_text = selector.year.trim();
    let month = dates::month_from_abbreviation(&month_text)
        .ok_or_else(|| AnalysisError::InvalidMonth(selector.month.trim().to_string()))?;
    let year: i32 = year_text
        .parse()
        .map_err(|_| AnalysisError::InvalidYear(year_text.to_string()))?;

    let selected = filter::in_month(values, year, month);
    if selected.is_empty() {
        return Ok(AggregationResult::empty(format!(
            "No day-wise data for {} {year_text}",
            capitalize(&month_text)
        )));
    }

    let mut days: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for v in &selected {
        *days.entry(v.date).or_default() += v.value;
    }
    log::info!(
        "Day-wise aggregation for {month_text} {year_text}: {} days from {} rows",
        days.len(),
        selected.len()
    );

    let series = ChartSeries {
        labels: days.keys().map(|d| d.format("%Y-%m-%d").to_string()).collect(),
        values: days.into_values().collect(),
        series_name: DAY_SERIES_NAME.to_string(),
    };
    Ok(AggregationResult::success(
        mean(selected.iter().map(|v| v.value)),
        series,
    ))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
