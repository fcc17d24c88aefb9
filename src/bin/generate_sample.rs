//! Write a deterministic sample sales dataset.
//!
//! ```bash
//! generate_sample [output]   # default: uploads/sales_data.csv
//! ```
//!
//! A `.parquet` output path writes the same rows as Parquet instead of CSV.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use arrow::array::{Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Duration, NaiveDate};
use parquet::arrow::ArrowWriter;
use rusty_sales::analysis::dates::DATE_FORMATS;

const PRODUCTS: [(&str, f64); 4] = [
    ("Widget", 19.5),
    ("Gadget", 42.0),
    ("Doohickey", 7.25),
    ("Gizmo", 99.9),
];
const REGIONS: [&str; 3] = ["North", "South", "West"];
const DAYS: i64 = 180;

struct SaleRow {
    date: String,
    product: &'static str,
    region: &'static str,
    units: i64,
    sales: f64,
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }
}

/// One to three sales per day. Dates keep the first format for the first
/// row so the file is recognised as date-indexed, then rotate through the
/// accepted formats.
fn generate_rows(rng: &mut SimpleRng, start: NaiveDate) -> Vec<SaleRow> {
    let mut rows = Vec::new();
    for day in 0..DAYS {
        let date = start + Duration::days(day);
        for _ in 0..1 + rng.below(3) {
            let format = if rows.is_empty() {
                DATE_FORMATS[0]
            } else {
                DATE_FORMATS[rng.below(DATE_FORMATS.len())]
            };
            let (product, price) = PRODUCTS[rng.below(PRODUCTS.len())];
            let units = 1 + rng.below(20) as i64;
            // up to 10% discount, rounded to cents
            let discount = 1.0 - 0.1 * rng.next_f64();
            let sales = (units as f64 * price * discount * 100.0).round() / 100.0;

            rows.push(SaleRow {
                date: date.format(format).to_string(),
                product,
                region: REGIONS[rng.below(REGIONS.len())],
                units,
                sales,
            });
        }
    }
    rows
}

fn write_csv(path: &Path, rows: &[SaleRow]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["Date", "Product", "Region", "Units", "Sales"])?;
    for row in rows {
        writer.write_record([
            row.date.clone(),
            row.product.to_string(),
            row.region.to_string(),
            row.units.to_string(),
            row.sales.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_parquet(path: &Path, rows: &[SaleRow]) -> anyhow::Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("Date", DataType::Utf8, false),
        Field::new("Product", DataType::Utf8, false),
        Field::new("Region", DataType::Utf8, false),
        Field::new("Units", DataType::Int64, false),
        Field::new("Sales", DataType::Float64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.date.as_str()))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.product))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.region))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.units))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.sales))),
        ],
    )?;

    let file = std::fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let output_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("uploads").join("sales_data.csv"));
    if let Some(dir) = output_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }

    let mut rng = SimpleRng::new(42);
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).context("invalid start date")?;
    let rows = generate_rows(&mut rng, start);

    let is_parquet = output_path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("parquet"));
    if is_parquet {
        write_parquet(&output_path, &rows)?;
    } else {
        write_csv(&output_path, &rows)?;
    }

    println!(
        "Wrote {} sales over {DAYS} days to {}",
        rows.len(),
        output_path.display()
    );
    Ok(())
}
