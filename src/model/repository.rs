//! Model repository port and its in-memory implementation

use super::{ModelLogEntry, ModelRecord, PredictionRecord};
use crate::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// What a dataset artifact was consumed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    /// Used to train a model
    Trained,
    /// Used to predict
    Predicted,
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trained => write!(f, "trained"),
            Self::Predicted => write!(f, "predicted"),
        }
    }
}

/// Key of the used-files record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsedFile {
    /// Model
    pub model_id: u64,
    /// Artifact id
    pub artifact: String,
    /// What the artifact was used for
    pub action: FileAction,
}

impl UsedFile {
    /// Create a used-file key.
    #[must_use]
    pub fn new(model_id: u64, artifact: impl Into<String>, action: FileAction) -> Self {
        Self {
            model_id,
            artifact: artifact.into(),
            action,
        }
    }
}

/// Structured record storage.
pub trait ModelRepository: Send + Sync {
    /// Store a new model and return its id.
    ///
    /// # Errors
    /// Returns storage errors
    fn insert_model(&self, record: ModelRecord) -> Result<u64>;

    /// Replace a stored model.
    ///
    /// # Errors
    /// Returns `Error::NotFound` for unknown ids
    fn update_model(&self, record: &ModelRecord) -> Result<()>;

    /// Load a model.
    ///
    /// # Errors
    /// Returns `Error::NotFound` for unknown ids
    fn get_model(&self, model_id: u64) -> Result<ModelRecord>;

    /// Store a prediction and return its id.
    ///
    /// # Errors
    /// Returns storage errors
    fn insert_prediction(&self, record: PredictionRecord) -> Result<u64>;

    /// Predictions of a model in a context, in insertion order.
    ///
    /// # Errors
    /// Returns storage errors
    fn predictions(&self, model_id: u64, context_id: u64) -> Result<Vec<PredictionRecord>>;

    /// Distinct contexts with predictions of a model, ascending.
    ///
    /// # Errors
    /// Returns storage errors
    fn prediction_contexts(&self, model_id: u64) -> Result<Vec<u64>>;

    /// Record that an artifact was consumed.
    ///
    /// # Errors
    /// Returns storage errors
    fn flag_file_used(&self, file: UsedFile) -> Result<()>;

    /// Whether an artifact was already consumed.
    ///
    /// # Errors
    /// Returns storage errors
    fn is_file_used(&self, file: &UsedFile) -> Result<bool>;

    /// Record that an artifact was consumed unless it already was.
    ///
    /// Returns `true` when this call set the flag. Check and set happen as
    /// one step, so of two concurrent callers only one gets `true`.
    ///
    /// # Errors
    /// Returns storage errors
    fn try_flag_file_used(&self, file: UsedFile) -> Result<bool>;

    /// Append an evaluation log entry and return its id.
    ///
    /// # Errors
    /// Returns storage errors
    fn insert_log(&self, entry: ModelLogEntry) -> Result<u64>;

    /// Log entries of a model, oldest first.
    ///
    /// # Errors
    /// Returns storage errors
    fn logs(&self, model_id: u64) -> Result<Vec<ModelLogEntry>>;
}

/// DashMap backed repository.
#[derive(Debug, Default)]
pub struct MemoryModelRepository {
    next_id: AtomicU64,
    models: DashMap<u64, ModelRecord>,
    predictions: DashMap<u64, PredictionRecord>,
    used_files: DashMap<UsedFile, ()>,
    logs: DashMap<u64, ModelLogEntry>,
}

impl MemoryModelRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored models.
    #[must_use]
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// Number of stored predictions.
    #[must_use]
    pub fn prediction_count(&self) -> usize {
        self.predictions.len()
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl ModelRepository for MemoryModelRepository {
    fn insert_model(&self, record: ModelRecord) -> Result<u64> {
        let id = self.allocate_id();
        self.models.insert(id, record.with_id(id));
        Ok(id)
    }

    fn update_model(&self, record: &ModelRecord) -> Result<()> {
        let mut stored = self
            .models
            .get_mut(&record.id())
            .ok_or_else(|| Error::not_found(format!("model {}", record.id())))?;
        *stored = record.clone();
        Ok(())
    }

    fn get_model(&self, model_id: u64) -> Result<ModelRecord> {
        self.models
            .get(&model_id)
            .map(|record| record.clone())
            .ok_or_else(|| Error::not_found(format!("model {model_id}")))
    }

    fn insert_prediction(&self, record: PredictionRecord) -> Result<u64> {
        let id = self.allocate_id();
        self.predictions.insert(id, record.with_id(id));
        Ok(id)
    }

    fn predictions(&self, model_id: u64, context_id: u64) -> Result<Vec<PredictionRecord>> {
        let mut records: Vec<PredictionRecord> = self
            .predictions
            .iter()
            .filter(|entry| entry.model_id() == model_id && entry.context_id() == context_id)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(PredictionRecord::id);
        Ok(records)
    }

    fn prediction_contexts(&self, model_id: u64) -> Result<Vec<u64>> {
        let contexts: FxHashSet<u64> = self
            .predictions
            .iter()
            .filter(|entry| entry.model_id() == model_id)
            .map(|entry| entry.context_id())
            .collect();
        let mut contexts: Vec<u64> = contexts.into_iter().collect();
        contexts.sort_unstable();
        Ok(contexts)
    }

    fn flag_file_used(&self, file: UsedFile) -> Result<()> {
        self.used_files.insert(file, ());
        Ok(())
    }

    fn is_file_used(&self, file: &UsedFile) -> Result<bool> {
        Ok(self.used_files.contains_key(file))
    }

    fn try_flag_file_used(&self, file: UsedFile) -> Result<bool> {
        match self.used_files.entry(file) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(true)
            }
        }
    }

    fn insert_log(&self, entry: ModelLogEntry) -> Result<u64> {
        let id = self.allocate_id();
        self.logs.insert(id, entry.with_id(id));
        Ok(id)
    }

    fn logs(&self, model_id: u64) -> Result<Vec<ModelLogEntry>> {
        let mut entries: Vec<ModelLogEntry> = self
            .logs
            .iter()
            .filter(|entry| entry.model_id() == model_id)
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by_key(ModelLogEntry::id);
        Ok(entries)
    }
}
