use thiserror::Error;

/// Failures of the aggregation routine. The `Display` text is what the
/// client sees in the `status` field of a failed job.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("CSV file not found")]
    DatasetNotFound,

    #[error("Selected column '{0}' not found in data")]
    ColumnNotFound(String),

    /// Every reference value failed date parsing. Degrades to an empty
    /// success instead of a failure.
    #[error("No valid data after date parsing")]
    UnparseableDates,

    #[error("Unknown month '{0}'")]
    InvalidMonth(String),

    #[error("Invalid year '{0}'")]
    InvalidYear(String),

    #[error("{0}")]
    Generic(String),
}

impl From<anyhow::Error> for AnalysisError {
    fn from(err: anyhow::Error) -> Self {
        AnalysisError::Generic(format!("{err:#}"))
    }
}

/// Failures while turning an uploaded file into the stored dataset.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("No file part")]
    MissingFile,

    #[error("No selected file")]
    EmptyFileName,

    #[error("Only CSV, XLSX, JSON and Parquet files are supported.")]
    UnsupportedFormat,

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid JSON format. Expected an array or object with \"sales\" key.")]
    InvalidJsonShape,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0:#}")]
    Other(#[from] anyhow::Error),
}
