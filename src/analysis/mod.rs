//! The aggregation routine and its helpers.

pub mod aggregate;
pub mod dates;
pub mod result;

pub use aggregate::{AggregationRequest, Aggregator, DrillDown};
pub use dates::{ColumnKind, ColumnKindDetector};
pub use result::{AggregationResult, ChartSeries};
