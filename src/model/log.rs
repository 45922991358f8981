//! Model Log Entry - append-only evaluation history

use super::ProcessStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One evaluation of one time splitting.
///
/// Entries are never updated; every evaluation appends a new one carrying a
/// snapshot of the model definition at that time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelLogEntry {
    id: u64,
    model_id: u64,
    version: i64,
    target: String,
    indicators: Vec<String>,
    time_splitting: String,
    status: ProcessStatus,
    score: f64,
    dir: Option<PathBuf>,
    errors: Vec<String>,
    created_at: DateTime<Utc>,
}

impl ModelLogEntry {
    /// Create a new entry for the model snapshot.
    #[must_use]
    pub fn new(record: &super::ModelRecord, time_splitting: impl Into<String>, status: ProcessStatus, score: f64) -> Self {
        Self {
            id: 0,
            model_id: record.id(),
            version: record.version(),
            target: record.target().to_string(),
            indicators: record.indicators().to_vec(),
            time_splitting: time_splitting.into(),
            status,
            score,
            dir: None,
            errors: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Attach the predictor output directory.
    #[must_use]
    pub fn with_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.dir = dir;
        self
    }

    /// Attach predictor errors.
    #[must_use]
    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }

    /// Return the entry with a repository-assigned id.
    #[must_use]
    pub const fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// Get the entry id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Get the model id.
    #[must_use]
    pub const fn model_id(&self) -> u64 {
        self.model_id
    }

    /// Get the model version at evaluation time.
    #[must_use]
    pub const fn version(&self) -> i64 {
        self.version
    }

    /// Get the target id.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Get the indicator ids.
    #[must_use]
    pub fn indicators(&self) -> &[String] {
        &self.indicators
    }

    /// Get the evaluated time splitting.
    #[must_use]
    pub fn time_splitting(&self) -> &str {
        &self.time_splitting
    }

    /// Get the evaluation status.
    #[must_use]
    pub const fn status(&self) -> ProcessStatus {
        self.status
    }

    /// Get the evaluation score.
    #[must_use]
    pub const fn score(&self) -> f64 {
        self.score
    }

    /// Get the predictor output directory.
    #[must_use]
    pub fn dir(&self) -> Option<&std::path::Path> {
        self.dir.as_deref()
    }

    /// Get the predictor errors.
    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
