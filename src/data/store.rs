use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tempfile::NamedTempFile;

use super::loader;
use super::model::{CellValue, Dataset};
use crate::error::{AnalysisError, IngestError};

// ---------------------------------------------------------------------------
// DatasetStore – the single persisted dataset
// ---------------------------------------------------------------------------

/// Location of the one dataset the service works on. Uploads overwrite it;
/// every analysis reads it fresh.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    path: PathBuf,
}

impl DatasetStore {
    pub fn new(upload_dir: impl AsRef<Path>, file_name: &str) -> Self {
        Self {
            path: upload_dir.as_ref().join(file_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the dataset as CSV, creating the upload directory if needed.
    ///
    /// Each save writes its own temporary file next to the final location
    /// and renames it into place, so concurrent saves never interleave and a
    /// concurrent [`load`](Self::load) sees one complete dataset.
    pub fn save(&self, dataset: &Dataset) -> Result<(), IngestError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        write_csv(tmp.as_file_mut(), dataset).context("writing dataset")?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        log::info!(
            "Stored dataset at {} ({} rows)",
            self.path.display(),
            dataset.len()
        );
        Ok(())
    }

    /// Read the stored dataset.
    pub fn load(&self) -> Result<Dataset, AnalysisError> {
        if !self.path.exists() {
            return Err(AnalysisError::DatasetNotFound);
        }
        let file = fs::File::open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        Ok(loader::read_csv(file)?)
    }
}

fn write_csv(out: impl Write, dataset: &Dataset) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(&dataset.column_names)?;
    for row in &dataset.rows {
        writer.write_record(
            dataset
                .column_names
                .iter()
                .map(|col| match row.get(col) {
                    CellValue::Null => String::new(),
                    other => other.to_string(),
                }),
        )?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn missing_file_is_dataset_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::new(dir.path(), "sales_data.csv");
        let err = store.load().unwrap_err();
        assert!(matches!(err, AnalysisError::DatasetNotFound));
        assert_eq!(err.to_string(), "CSV file not found");
    }

    #[test]
    fn save_then_load_preserves_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::new(dir.path().join("uploads"), "sales_data.csv");
        let uploaded = loader::load_bytes(
            "in.json",
            br#"[{"date": "Jan 5, 2024", "amount": 10, "note": "a, b"}, {"date": null, "amount": 2.5}]"#,
        )
        .unwrap();

        store.save(&uploaded).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded.column_names, vec!["Date", "amount", "note"]);
        assert_eq!(
            loaded.rows[0].get("Date"),
            &CellValue::String("Jan 5, 2024".into())
        );
        assert_eq!(loaded.rows[0].get("note"), &CellValue::String("a, b".into()));
        assert_eq!(loaded.rows[1].get("amount"), &CellValue::Float(2.5));
        assert!(loaded.rows[1].get("Date").is_null());
        assert_eq!(std::fs::read_dir(dir.path().join("uploads")).unwrap().count(), 1);
    }

    #[test]
    fn whole_floats_survive_a_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::new(dir.path(), "sales_data.csv");
        let uploaded = loader::load_bytes("in.json", br#"[{"size": 1.0, "amount": 3}]"#).unwrap();

        store.save(&uploaded).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded.rows[0].get("size"), &CellValue::Float(1.0));
        assert_eq!(loaded.rows[0].get("amount"), &CellValue::Integer(3));
    }

    fn numbered(column: &str, rows: usize) -> Dataset {
        let cells = (0..rows)
            .map(|i| BTreeMap::from([(column.to_string(), CellValue::Integer(i as i64))]))
            .collect();
        Dataset::new(vec![column.to_string()], cells)
    }

    #[test]
    fn concurrent_saves_leave_one_complete_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::new(dir.path(), "sales_data.csv");
        let large = numbered("large", 50_000);
        let small = numbered("small", 1_000);

        for _ in 0..10 {
            std::thread::scope(|scope| {
                scope.spawn(|| store.save(&large).unwrap());
                scope.spawn(|| store.save(&small).unwrap());
            });

            let loaded = store.load().unwrap();
            let expected = if loaded.column_names == vec!["large"] {
                &large
            } else {
                &small
            };
            assert_eq!(loaded.column_names, expected.column_names);
            assert_eq!(loaded.rows, expected.rows);
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
