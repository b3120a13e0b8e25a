//! Fold a landed increment into the persisted dataset.

use std::path::{Path, PathBuf};

use tracing::info;

use eventlake_core::IngestError;
use eventlake_dataset::{load_increment, DatasetStore, MergeStats};

pub struct Merger {
    landing_dir: PathBuf,
    store: DatasetStore,
}

impl Merger {
    pub fn new(landing_dir: impl Into<PathBuf>, store: DatasetStore) -> Self {
        Self {
            landing_dir: landing_dir.into(),
            store,
        }
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    pub fn landed_path(&self, identifier: &str) -> PathBuf {
        self.landing_dir.join(identifier)
    }

    /// Merge `<landing_dir>/<identifier>` into the dataset and return the net
    /// change in row count. Merging the same increment again yields 0.
    pub fn merge_increment(&self, identifier: &str) -> Result<i64, IngestError> {
        self.merge_path(&self.landed_path(identifier), identifier)
            .map(|stats| stats.inserted())
    }

    pub fn merge_path(&self, path: &Path, identifier: &str) -> Result<MergeStats, IngestError> {
        let increment = load_increment(path, self.store.schema())?;
        let stats = self.store.merge(&increment, identifier)?;
        info!(
            identifier = %identifier,
            increment_rows = stats.increment_rows,
            inserted = stats.inserted(),
            total = stats.total_rows,
            "increment merged"
        );
        Ok(stats)
    }
}
