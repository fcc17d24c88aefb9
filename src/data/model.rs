use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// CellValue – a single cell of the uploaded table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell mirroring the scalar dtypes a DataFrame would
/// infer from an uploaded file.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::String(s) => write!(f, "{s}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            // `{:?}` keeps the `.0` on whole floats so they read back as floats
            CellValue::Float(v) => write!(f, "{v:?}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Null => Ok(()),
        }
    }
}

impl CellValue {
    /// Coerce the cell to a number. Anything that does not read as a finite
    /// number is treated as missing.
    pub fn to_number(&self) -> Option<f64> {
        let v = match self {
            CellValue::Float(v) => *v,
            CellValue::Integer(i) => *i as f64,
            CellValue::Bool(b) => f64::from(u8::from(*b)),
            CellValue::String(s) => s.trim().parse::<f64>().ok()?,
            CellValue::Null => return None,
        };
        v.is_finite().then_some(v)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Text form used for date parsing and category keys. `None` for nulls.
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            CellValue::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Row – one record of the dataset
// ---------------------------------------------------------------------------

/// A single record. `index` is the row's 0-based position in the file and
/// survives any later row dropping.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub index: usize,
    /// column_name → value.
    pub cells: BTreeMap<String, CellValue>,
}

impl Row {
    /// Value of a column, treating absent keys as null.
    pub fn get(&self, column: &str) -> &CellValue {
        self.cells.get(column).unwrap_or(&CellValue::Null)
    }
}

// ---------------------------------------------------------------------------
// Dataset – the complete loaded table
// ---------------------------------------------------------------------------

/// The full parsed table: rows in file order plus the header order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    pub rows: Vec<Row>,
    /// Ordered list of column names as they appear in the source.
    pub column_names: Vec<String>,
}

impl Dataset {
    /// Build a dataset from rows, assigning each its positional index.
    pub fn new(column_names: Vec<String>, cells: Vec<BTreeMap<String, CellValue>>) -> Self {
        let rows = cells
            .into_iter()
            .enumerate()
            .map(|(index, cells)| Row { index, cells })
            .collect();
        Dataset { rows, column_names }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }

    /// Rename a column in the header and in every row. No-op when `from`
    /// is absent or `to` already exists.
    pub fn rename_column(&mut self, from: &str, to: &str) {
        if !self.has_column(from) || self.has_column(to) {
            return;
        }
        for name in &mut self.column_names {
            if name == from {
                *name = to.to_string();
            }
        }
        for row in &mut self.rows {
            if let Some(v) = row.cells.remove(from) {
                row.cells.insert(to.to_string(), v);
            }
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
