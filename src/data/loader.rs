use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::Path;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{DataType, Date32Type, Float32Type, Float64Type, Int32Type, Int64Type};
use calamine::{Data, DataType as _, Reader, Xlsx};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{CellValue, Dataset};
use crate::error::IngestError;

/// Cell texts read as missing, matching the usual DataFrame NA sentinels.
const NA_SENTINELS: [&str; 8] = ["", "NaN", "nan", "NA", "N/A", "null", "NULL", "None"];

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Parse an uploaded file. Dispatch by the extension of `file_name`.
///
/// Supported formats:
/// * `.csv`     – header row, one record per line
/// * `.json`    – `[{...}, ...]` or `{"sales": [{...}, ...]}`
/// * `.xlsx`    – first worksheet, first row is the header
/// * `.parquet` – scalar columns
///
/// A column named `date` is renamed to `Date` so clients can rely on one
/// spelling.
pub fn load_bytes(file_name: &str, bytes: &[u8]) -> Result<Dataset, IngestError> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let mut dataset = match ext.as_str() {
        "csv" => read_csv(bytes).context("parsing CSV")?,
        "json" => load_json(bytes)?,
        "xlsx" => load_xlsx(bytes).context("parsing XLSX")?,
        "parquet" | "pq" => load_parquet(bytes).context("parsing Parquet")?,
        _ => return Err(IngestError::UnsupportedFormat),
    };
    dataset.rename_column("date", "Date");
    log::info!(
        "Loaded {file_name}: {} rows, columns {:?}",
        dataset.len(),
        dataset.column_names
    );
    Ok(dataset)
}

/// Read a file from disk and parse it like an upload.
pub fn load_file(path: &Path) -> Result<Dataset, IngestError> {
    let bytes = std::fs::read(path)?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    load_bytes(name, &bytes)
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// Header row with column names, every cell typed by [`guess_cell_type`].
pub fn read_csv<R: Read>(reader: R) -> Result<Dataset> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;

        let cells: BTreeMap<String, CellValue> = headers
            .iter()
            .zip(record.iter())
            .map(|(col, value)| (col.clone(), guess_cell_type(value)))
            .collect();
        rows.push(cells);
    }

    Ok(Dataset::new(headers, rows))
}

fn guess_cell_type(s: &str) -> CellValue {
    if NA_SENTINELS.contains(&s.trim()) {
        return CellValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return CellValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return CellValue::Float(f);
    }
    if s == "true" || s == "false" {
        return CellValue::Bool(s == "true");
    }
    CellValue::String(s.to_string())
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Records-oriented JSON, either bare or wrapped under a `sales` key:
///
/// ```json
/// { "sales": [ { "date": "2024-01-05", "amount": 10 }, ... ] }
/// ```
///
/// Columns are ordered by first appearance across all records.
fn load_json(bytes: &[u8]) -> Result<Dataset, IngestError> {
    let root: JsonValue = serde_json::from_slice(bytes)?;

    let records = match &root {
        JsonValue::Array(records) => records,
        JsonValue::Object(obj) => match obj.get("sales") {
            Some(JsonValue::Array(records)) => records,
            _ => return Err(IngestError::InvalidJsonShape),
        },
        _ => return Err(IngestError::InvalidJsonShape),
    };

    let mut column_names: Vec<String> = Vec::new();
    let mut rows = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let mut cells = BTreeMap::new();
        for (key, val) in obj {
            if !column_names.contains(key) {
                column_names.push(key.clone());
            }
            cells.insert(key.clone(), json_to_cell(val));
        }
        rows.push(cells);
    }

    Ok(Dataset::new(column_names, rows))
}

fn json_to_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::String(s) => CellValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CellValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                CellValue::Float(f)
            } else {
                CellValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => CellValue::Bool(*b),
        JsonValue::Null => CellValue::Null,
        other => CellValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// XLSX loader
// ---------------------------------------------------------------------------

/// First worksheet only. Blank header cells get the `Unnamed: <n>` name a
/// DataFrame would give them.
fn load_xlsx(bytes: &[u8]) -> Result<Dataset> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).context("opening workbook")?;
    let range = workbook
        .worksheet_range_at(0)
        .context("workbook has no worksheet")?
        .context("reading first worksheet")?;

    let mut sheet_rows = range.rows();
    let Some(header_row) = sheet_rows.next() else {
        return Ok(Dataset::default());
    };
    let headers: Vec<String> = header_row
        .iter()
        .enumerate()
        .map(|(i, cell)| match xlsx_to_cell(cell).as_text() {
            Some(name) if !name.is_empty() => name,
            _ => format!("Unnamed: {i}"),
        })
        .collect();

    let rows = sheet_rows
        .map(|row| {
            headers
                .iter()
                .zip(row.iter())
                .map(|(col, cell)| (col.clone(), xlsx_to_cell(cell)))
                .collect()
        })
        .collect();

    Ok(Dataset::new(headers, rows))
}

fn xlsx_to_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Int(i) => CellValue::Integer(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::String(s) => guess_cell_type(s),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(_) | Data::DateTimeIso(_) => match cell.as_datetime() {
            Some(dt) if dt.time() == chrono::NaiveTime::MIN => {
                CellValue::String(dt.format("%Y-%m-%d").to_string())
            }
            Some(dt) => CellValue::String(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => CellValue::Null,
        },
        Data::DurationIso(s) => CellValue::String(s.clone()),
        _ => CellValue::Null,
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with scalar columns (strings, ints, floats, bools,
/// dates). Works with files written by both Pandas and Polars.
fn load_parquet(bytes: &[u8]) -> Result<Dataset> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes::Bytes::copy_from_slice(bytes))
        .context("reading parquet metadata")?;
    let column_names: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;

        for row in 0..batch.num_rows() {
            let mut cells = BTreeMap::new();
            for (col_idx, col_name) in column_names.iter().enumerate() {
                let value = extract_cell(batch.column(col_idx), row)
                    .with_context(|| format!("Row {row}: failed to read '{col_name}'"))?;
                cells.insert(col_name.clone(), value);
            }
            rows.push(cells);
        }
    }

    Ok(Dataset::new(column_names, rows))
}

/// Extract a single cell from an Arrow column at a given row.
fn extract_cell(col: &ArrayRef, row: usize) -> Result<CellValue> {
    if col.is_null(row) {
        return Ok(CellValue::Null);
    }
    let value = match col.data_type() {
        DataType::Utf8 => CellValue::String(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => CellValue::String(col.as_string::<i64>().value(row).to_string()),
        DataType::Int32 => CellValue::Integer(col.as_primitive::<Int32Type>().value(row) as i64),
        DataType::Int64 => CellValue::Integer(col.as_primitive::<Int64Type>().value(row)),
        DataType::Float32 => CellValue::Float(col.as_primitive::<Float32Type>().value(row) as f64),
        DataType::Float64 => CellValue::Float(col.as_primitive::<Float64Type>().value(row)),
        DataType::Boolean => CellValue::Bool(col.as_boolean().value(row)),
        DataType::Date32 => col
            .as_primitive::<Date32Type>()
            .value_as_date(row)
            .map(|d| CellValue::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(CellValue::Null),
        other => bail!("unsupported column type {other:?}"),
    };
    Ok(value)
}
