/// Data layer: core types, loading, persistence and row filtering.
///
/// Architecture:
/// ```text
///  upload (.csv / .json / .xlsx / .parquet)
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse bytes → Dataset
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  store    │  uploads/sales_data.csv, re-read on every analysis
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  numeric coercion, calendar filters
///   └──────────┘
/// ```

pub mod filter;
pub mod loader;
pub mod model;
pub mod store;
