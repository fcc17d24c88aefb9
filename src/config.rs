//! Service configuration from environment variables

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::analysis::{Aggregator, ColumnKindDetector};
use crate::data::store::DatasetStore;

/// Configuration for the HTTP service and its job workers.
///
/// Loaded from environment variables with defaults for local use.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Address the HTTP server listens on
    pub bind_addr: SocketAddr,

    /// Directory holding the uploaded dataset
    pub upload_dir: PathBuf,

    /// File name of the stored dataset inside `upload_dir`
    pub dataset_file: String,

    /// Largest accepted upload body
    pub max_upload_bytes: usize,

    /// Maximum number of aggregations running at once
    pub workers: usize,

    /// Wall-clock limit for one aggregation
    pub job_timeout: Duration,

    /// Finished jobs kept for status polling
    pub max_retained_jobs: usize,

    /// Values sampled when deciding whether a reference column holds dates
    pub date_sample_size: usize,

    /// Share of sampled values that must parse as dates
    pub date_match_ratio: f64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            upload_dir: PathBuf::from("uploads"),
            dataset_file: "sales_data.csv".to_string(),
            max_upload_bytes: 16 * 1024 * 1024,
            workers: 4,
            job_timeout: Duration::from_secs(60),
            max_retained_jobs: 1024,
            date_sample_size: 1,
            date_match_ratio: 1.0,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `RUSTY_SALES_BIND` (default: 127.0.0.1:5000)
    /// - `RUSTY_SALES_UPLOAD_DIR` (default: uploads)
    /// - `RUSTY_SALES_DATASET_FILE` (default: sales_data.csv)
    /// - `RUSTY_SALES_MAX_UPLOAD_BYTES` (default: 16 MiB)
    /// - `RUSTY_SALES_WORKERS` (default: 4)
    /// - `RUSTY_SALES_JOB_TIMEOUT_SECS` (default: 60)
    /// - `RUSTY_SALES_MAX_JOBS` (default: 1024)
    /// - `RUSTY_SALES_DATE_SAMPLE` (default: 1)
    /// - `RUSTY_SALES_DATE_MATCH_RATIO` (default: 1.0)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from any key → value source. Unparseable
    /// values fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: parse_var(&lookup, "RUSTY_SALES_BIND").unwrap_or(defaults.bind_addr),

            upload_dir: lookup("RUSTY_SALES_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),

            dataset_file: lookup("RUSTY_SALES_DATASET_FILE").unwrap_or(defaults.dataset_file),

            max_upload_bytes: parse_var(&lookup, "RUSTY_SALES_MAX_UPLOAD_BYTES")
                .unwrap_or(defaults.max_upload_bytes),

            workers: parse_var(&lookup, "RUSTY_SALES_WORKERS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.workers),

            job_timeout: parse_var(&lookup, "RUSTY_SALES_JOB_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_timeout),

            max_retained_jobs: parse_var(&lookup, "RUSTY_SALES_MAX_JOBS")
                .unwrap_or(defaults.max_retained_jobs),

            date_sample_size: parse_var(&lookup, "RUSTY_SALES_DATE_SAMPLE")
                .unwrap_or(defaults.date_sample_size),

            date_match_ratio: parse_var(&lookup, "RUSTY_SALES_DATE_MATCH_RATIO")
                .unwrap_or(defaults.date_match_ratio),
        }
    }

    pub fn dataset_store(&self) -> DatasetStore {
        DatasetStore::new(&self.upload_dir, &self.dataset_file)
    }

    pub fn aggregator(&self) -> Aggregator {
        Aggregator::new(
            self.dataset_store(),
            ColumnKindDetector::new(self.date_sample_size, self.date_match_ratio),
        )
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}
