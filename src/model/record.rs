//! Model Record - persisted model definition and lifecycle flags

use crate::config::ModelConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Model Record represents a configured prediction model.
///
/// `version` is bumped whenever the indicators or the time splitting change
/// so datasets and output directories of incompatible configurations are
/// never mixed. It only ever grows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelRecord {
    id: u64,
    target: String,
    indicators: Vec<String>,
    time_splitting: Option<String>,
    enabled: bool,
    trained: bool,
    version: i64,
    time_created: DateTime<Utc>,
    time_modified: DateTime<Utc>,
}

impl ModelRecord {
    /// Create a disabled, untrained model record.
    #[must_use]
    pub fn new(target: impl Into<String>, indicators: Vec<String>) -> Self {
        ModelRecordBuilder::new(target, indicators).build()
    }

    /// Create a builder for constructing a model record with optional fields.
    #[must_use]
    pub fn builder(target: impl Into<String>, indicators: Vec<String>) -> ModelRecordBuilder {
        ModelRecordBuilder::new(target, indicators)
    }

    /// Get the model id (0 until stored).
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
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

    /// Get the active time splitting id, if any.
    #[must_use]
    pub fn time_splitting(&self) -> Option<&str> {
        self.time_splitting.as_deref()
    }

    /// Whether the model is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the model was trained at least once.
    #[must_use]
    pub const fn is_trained(&self) -> bool {
        self.trained
    }

    /// Get the configuration version.
    #[must_use]
    pub const fn version(&self) -> i64 {
        self.version
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn time_created(&self) -> DateTime<Utc> {
        self.time_created
    }

    /// Get the last modification timestamp.
    #[must_use]
    pub const fn time_modified(&self) -> DateTime<Utc> {
        self.time_modified
    }

    /// Definition used to resolve calculables.
    #[must_use]
    pub fn config(&self) -> ModelConfig {
        ModelConfig {
            target: self.target.clone(),
            indicators: self.indicators.clone(),
            time_splitting: self.time_splitting.clone(),
        }
    }

    /// Return the record with a repository-assigned id.
    #[must_use]
    pub const fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// Apply an update. Returns whether the version was bumped.
    pub fn update(&mut self, enabled: bool, indicators: Vec<String>, time_splitting: Option<String>) -> bool {
        let now = Utc::now();
        let changed = self.indicators != indicators || self.time_splitting != time_splitting;
        if changed {
            self.bump_version(now);
        }
        self.enabled = enabled;
        self.indicators = indicators;
        self.time_splitting = time_splitting;
        self.time_modified = now;
        changed
    }

    /// Enable the model, switching time splitting if one is given. Returns
    /// whether the version was bumped.
    pub fn enable(&mut self, time_splitting: Option<&str>) -> bool {
        let now = Utc::now();
        let changed = match time_splitting {
            Some(id) if self.time_splitting.as_deref() != Some(id) => {
                self.time_splitting = Some(id.to_string());
                self.bump_version(now);
                true
            }
            _ => false,
        };
        self.enabled = true;
        self.time_modified = now;
        changed
    }

    /// Flag the model as trained.
    pub fn mark_as_trained(&mut self) {
        self.trained = true;
    }

    fn bump_version(&mut self, now: DateTime<Utc>) {
        self.version = now.timestamp().max(self.version + 1);
    }
}

/// Builder for `ModelRecord`.
#[derive(Debug)]
pub struct ModelRecordBuilder {
    id: u64,
    target: String,
    indicators: Vec<String>,
    time_splitting: Option<String>,
    enabled: bool,
    trained: bool,
    version: Option<i64>,
    time_created: DateTime<Utc>,
    time_modified: Option<DateTime<Utc>>,
}

impl ModelRecordBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(target: impl Into<String>, indicators: Vec<String>) -> Self {
        Self {
            id: 0,
            target: target.into(),
            indicators,
            time_splitting: None,
            enabled: false,
            trained: false,
            version: None,
            time_created: Utc::now(),
            time_modified: None,
        }
    }

    /// Set the model id.
    #[must_use]
    pub const fn id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// Set the active time splitting.
    #[must_use]
    pub fn time_splitting(mut self, time_splitting: impl Into<String>) -> Self {
        self.time_splitting = Some(time_splitting.into());
        self
    }

    /// Set the enabled flag.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the trained flag.
    #[must_use]
    pub const fn trained(mut self, trained: bool) -> Self {
        self.trained = trained;
        self
    }

    /// Set the version (defaults to the creation time in seconds).
    #[must_use]
    pub const fn version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }

    /// Set a custom creation timestamp (useful for deserialization/testing).
    #[must_use]
    pub const fn time_created(mut self, time_created: DateTime<Utc>) -> Self {
        self.time_created = time_created;
        self
    }

    /// Set a custom modification timestamp (defaults to the creation time).
    #[must_use]
    pub const fn time_modified(mut self, time_modified: DateTime<Utc>) -> Self {
        self.time_modified = Some(time_modified);
        self
    }

    /// Build the `ModelRecord`.
    #[must_use]
    pub fn build(self) -> ModelRecord {
        ModelRecord {
            id: self.id,
            target: self.target,
            indicators: self.indicators,
            time_splitting: self.time_splitting,
            enabled: self.enabled,
            trained: self.trained,
            version: self.version.unwrap_or_else(|| self.time_created.timestamp()),
            time_created: self.time_created,
            time_modified: self.time_modified.unwrap_or(self.time_created),
        }
    }
}
