use serde::{Serialize, Serializer};

/// Labeled values for one chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    #[serde(rename = "label")]
    pub series_name: String,
}

impl ChartSeries {
    /// The series used whenever nothing is left to chart.
    pub fn no_data() -> Self {
        Self {
            labels: Vec::new(),
            values: Vec::new(),
            series_name: "No Data".to_string(),
        }
    }
}

/// Outcome of one aggregation run. Both variants are ordinary results;
/// the routine never reports through `Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationResult {
    Success {
        mean_value: f64,
        series: ChartSeries,
        /// Explanation attached to degraded (empty) results.
        status: Option<String>,
    },
    Failure {
        message: String,
    },
}

impl AggregationResult {
    pub fn success(mean_value: f64, series: ChartSeries) -> Self {
        AggregationResult::Success {
            mean_value,
            series,
            status: None,
        }
    }

    /// A zero-valued success with an empty series and a reason.
    pub fn empty(status: impl Into<String>) -> Self {
        AggregationResult::Success {
            mean_value: 0.0,
            series: ChartSeries::no_data(),
            status: Some(status.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        AggregationResult::Failure {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AggregationResult::Success { .. })
    }

    pub fn state(&self) -> &'static str {
        match self {
            AggregationResult::Success { .. } => "SUCCESS",
            AggregationResult::Failure { .. } => "FAILURE",
        }
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ScalarResult {
    value: f64,
}

#[derive(Serialize)]
struct Payload<'a> {
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ScalarResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chart_data: Option<&'a ChartSeries>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'a str>,
}

/// `{state, result: {value}, chart_data: {labels, values, label}, status}`
/// with absent members omitted.
impl Serialize for AggregationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let payload = match self {
            AggregationResult::Success {
                mean_value,
                series,
                status,
            } => Payload {
                state: self.state(),
                result: Some(ScalarResult { value: *mean_value }),
                chart_data: Some(series),
                status: status.as_deref(),
            },
            AggregationResult::Failure { message } => Payload {
                state: self.state(),
                result: None,
                chart_data: None,
                status: Some(message.as_str()),
            },
        };
        payload.serialize(serializer)
    }
}
