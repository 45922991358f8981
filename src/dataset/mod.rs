//! Dataset storage, merging and locking
//!
//! One dataset is built per `(model, analysable, time splitting, labelled)`
//! key while holding that key's lock, then every analysable's dataset for a
//! time splitting is merged into one cross-analysable artifact:
//!
//! ```text
//! <area>/<model>/analysable/<analysable>/<ts>/<file>   per analysable
//! <area>/<model>/timesplitting/<ts>/<file>             merged
//! ```
//!
//! Evaluation datasets always use [`EVALUATION_FILENAME`] and are
//! overwritten; production datasets get a monotonically increasing
//! time-based name so runs never collide.

mod artifact;
pub mod csv;
mod lock;
mod table;

pub use artifact::{content_hash, ArtifactHandle, ArtifactStore, FileArea, FsArtifactStore, MemoryArtifactStore};
pub use lock::{DatasetLock, LockFactory, MemoryLockFactory, POLL_INTERVAL};
pub use table::{DatasetTable, FeatureMap, METADATA_SEPARATOR, SAMPLE_ID_COLUMN};

use crate::config::PipelineConfig;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// File name of evaluation datasets.
pub const EVALUATION_FILENAME: &str = "evaluation.csv";

/// Identifies one per-analysable dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetKey {
    /// Model id
    pub model_id: u64,
    /// Analysable id
    pub analysable_id: u64,
    /// Time splitting id
    pub time_splitting: String,
    /// Whether the dataset includes the target column
    pub labelled: bool,
    /// Whether the dataset is for evaluation
    pub evaluation: bool,
}

impl DatasetKey {
    /// Create a key.
    #[must_use]
    pub fn new(
        model_id: u64,
        analysable_id: u64,
        time_splitting: impl Into<String>,
        labelled: bool,
        evaluation: bool,
    ) -> Self {
        Self {
            model_id,
            analysable_id,
            time_splitting: time_splitting.into(),
            labelled,
            evaluation,
        }
    }

    /// Lock key. Evaluation and production runs share it.
    #[must_use]
    pub fn lock_key(&self) -> String {
        format!(
            "modelid:{}-analysableid:{}-timesplitting:{}-includetarget:{}",
            self.model_id,
            self.analysable_id,
            self.time_splitting,
            u8::from(self.labelled)
        )
    }

    /// Storage area.
    #[must_use]
    pub const fn area(&self) -> FileArea {
        FileArea::from_labelled(self.labelled)
    }

    /// Directory of the per-analysable dataset.
    #[must_use]
    pub fn analysable_dir(&self) -> String {
        format!("{}/analysable/{}/{}", self.model_id, self.analysable_id, self.time_splitting)
    }
}

fn merged_dir(model_id: u64, time_splitting: &str) -> String {
    format!("{model_id}/timesplitting/{time_splitting}")
}

/// Stores, merges and reads dataset artifacts.
pub struct DatasetManager {
    store: Arc<dyn ArtifactStore>,
    locks: Arc<dyn LockFactory>,
    lock_timeout: Duration,
    last_stamp: AtomicI64,
}

impl std::fmt::Debug for DatasetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetManager")
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

impl DatasetManager {
    /// Create a manager.
    #[must_use]
    pub fn new(store: Arc<dyn ArtifactStore>, locks: Arc<dyn LockFactory>, lock_timeout: Duration) -> Self {
        Self {
            store,
            locks,
            lock_timeout,
            last_stamp: AtomicI64::new(0),
        }
    }

    /// Create a manager using the configured lock timeout.
    #[must_use]
    pub fn from_config(store: Arc<dyn ArtifactStore>, locks: Arc<dyn LockFactory>, config: &PipelineConfig) -> Self {
        Self::new(store, locks, Duration::from_secs(config.lock_timeout_secs))
    }

    /// How long [`Self::init_process`] waits for a held key.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Underlying artifact store.
    #[must_use]
    pub fn artifact_store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Take the exclusive lock for `key`. Dropping the guard releases it.
    ///
    /// # Errors
    /// Returns `Error::LockTimeout` if another run holds the key too long
    pub fn init_process(&self, key: &DatasetKey) -> Result<DatasetLock> {
        DatasetLock::acquire(self.locks.clone(), &key.lock_key(), self.lock_timeout)
    }

    /// Store a per-analysable dataset, replacing previous ones for the key.
    ///
    /// # Errors
    /// Returns error if the artifact can not be written
    pub fn store(&self, key: &DatasetKey, table: &DatasetTable) -> Result<ArtifactHandle> {
        let dir = key.analysable_dir();
        let removed = self.store.delete_dir(key.area(), &dir)?;
        if removed > 0 {
            tracing::debug!(dir = %dir, removed, "Replaced previous datasets");
        }
        self.store
            .put(key.area(), &dir, &self.filename(key.evaluation), &table.to_csv())
    }

    /// Merge per-analysable datasets of one time splitting.
    ///
    /// # Errors
    /// Returns `Error::InvalidInput` if `datasets` is empty or headers differ
    pub fn merge(
        &self,
        datasets: &[ArtifactHandle],
        model_id: u64,
        time_splitting: &str,
        labelled: bool,
        evaluation: bool,
    ) -> Result<ArtifactHandle> {
        let tables = datasets
            .iter()
            .map(|handle| self.read_table(handle))
            .collect::<Result<Vec<_>>>()?;
        let merged = DatasetTable::merge(&tables)?;
        tracing::info!(
            model_id,
            time_splitting,
            inputs = datasets.len(),
            rows = merged.row_count(),
            "Merged datasets"
        );
        self.store.put(
            FileArea::from_labelled(labelled),
            &merged_dir(model_id, time_splitting),
            &self.filename(evaluation),
            &merged.to_csv(),
        )
    }

    /// Parse a stored dataset.
    ///
    /// # Errors
    /// Returns error if the artifact is missing or malformed
    pub fn read_table(&self, handle: &ArtifactHandle) -> Result<DatasetTable> {
        DatasetTable::parse(&self.store.read(handle)?)
    }

    /// Features of an unlabelled dataset by unique sample id.
    ///
    /// # Errors
    /// Returns `Error::InvalidInput` for labelled datasets
    pub fn read_unlabelled(&self, handle: &ArtifactHandle) -> Result<BTreeMap<String, FeatureMap>> {
        if handle.area() != FileArea::Unlabelled {
            return Err(Error::invalid_input(format!(
                "only unlabelled datasets can be read back, {} is {}",
                handle.id(),
                handle.area()
            )));
        }
        Ok(self.read_table(handle)?.feature_maps())
    }

    /// Merged evaluation dataset of a model and time splitting.
    ///
    /// # Errors
    /// Returns error if the store can not be queried
    pub fn evaluation_file(&self, model_id: u64, time_splitting: &str) -> Result<Option<ArtifactHandle>> {
        self.store.find(
            FileArea::Labelled,
            &merged_dir(model_id, time_splitting),
            EVALUATION_FILENAME,
        )
    }

    /// Delete the merged evaluation dataset, returning whether one existed.
    ///
    /// # Errors
    /// Returns error if the store can not be queried
    pub fn delete_evaluation_file(&self, model_id: u64, time_splitting: &str) -> Result<bool> {
        match self.evaluation_file(model_id, time_splitting)? {
            Some(handle) => self.store.delete(&handle),
            None => Ok(false),
        }
    }

    fn filename(&self, evaluation: bool) -> String {
        if evaluation {
            return EVALUATION_FILENAME.to_string();
        }
        let now = chrono::Utc::now().timestamp_millis();
        let stamp = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
            .map_or(now, |last| now.max(last + 1));
        format!("{stamp}.csv")
    }
}
