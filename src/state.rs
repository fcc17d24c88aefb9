use crate::config::ServiceConfig;
use crate::data::loader;
use crate::data::store::DatasetStore;
use crate::error::IngestError;
use crate::jobs::JobQueue;

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// Everything the HTTP handlers share, owned by the running service.
#[derive(Clone)]
pub struct AppState {
    /// Where uploads are persisted and where jobs read from.
    pub store: DatasetStore,

    /// Background aggregation jobs.
    pub jobs: JobQueue,
}

impl AppState {
    pub fn new(store: DatasetStore, jobs: JobQueue) -> Self {
        Self { store, jobs }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.dataset_store(), JobQueue::from_config(config))
    }

    /// Parse an uploaded file, replace the stored dataset with it and return
    /// its column names.
    pub fn ingest(&self, file_name: &str, bytes: &[u8]) -> Result<Vec<String>, IngestError> {
        if file_name.is_empty() {
            return Err(IngestError::EmptyFileName);
        }
        let dataset = loader::load_bytes(file_name, bytes)?;
        self.store.save(&dataset)?;
        Ok(dataset.column_names)
    }
}
