//! Pipeline configuration
//!
//! Every field has a serde default so partial JSON documents load cleanly.

use crate::analysable::WEEK_SECS;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Time-splitting codenames used by evaluation runs, in order.
    #[serde(default = "default_time_splittings")]
    pub enabled_time_splittings: Vec<String>,
    /// Minimum percentage of student logs an inferred end date must cover.
    #[serde(default = "default_min_log_coverage")]
    pub min_log_coverage_percent: u32,
    /// Boundary search stops once its window is narrower than this.
    #[serde(default = "default_boundary_resolution")]
    pub boundary_resolution_secs: i64,
    /// Window used to decide whether an analysable is still ongoing.
    #[serde(default = "default_recent_activity_window")]
    pub recent_activity_window_secs: i64,
    /// Share of students active in the recent window that marks an analysable as ongoing.
    #[serde(default = "default_recent_activity_ratio")]
    pub recent_activity_ratio: f64,
    /// Deviation accepted by the predictor during evaluation.
    #[serde(default = "default_accepted_deviation")]
    pub accepted_deviation: f64,
    /// Evaluation iterations.
    #[serde(default = "default_evaluation_iterations")]
    pub evaluation_iterations: u32,
    /// Minimum prediction confidence that triggers a target callback.
    #[serde(default = "default_min_prediction_score")]
    pub min_prediction_score: f64,
    /// Per-target minimum confidence, by target id. Wins over
    /// `min_prediction_score`.
    #[serde(default)]
    pub target_min_scores: BTreeMap<String, f64>,
    /// Dataset lock acquisition timeout.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,
    /// Base directory handed to the predictor.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled_time_splittings: default_time_splittings(),
            min_log_coverage_percent: default_min_log_coverage(),
            boundary_resolution_secs: default_boundary_resolution(),
            recent_activity_window_secs: default_recent_activity_window(),
            recent_activity_ratio: default_recent_activity_ratio(),
            accepted_deviation: default_accepted_deviation(),
            evaluation_iterations: default_evaluation_iterations(),
            min_prediction_score: default_min_prediction_score(),
            target_min_scores: BTreeMap::new(),
            lock_timeout_secs: default_lock_timeout(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_time_splittings() -> Vec<String> {
    vec![
        "single_range".to_string(),
        "quarters".to_string(),
        "quarters_accum".to_string(),
    ]
}

const fn default_min_log_coverage() -> u32 {
    90
}

const fn default_boundary_resolution() -> i64 {
    WEEK_SECS
}

const fn default_recent_activity_window() -> i64 {
    WEEK_SECS * 4
}

const fn default_recent_activity_ratio() -> f64 {
    0.25
}

const fn default_accepted_deviation() -> f64 {
    0.02
}

const fn default_evaluation_iterations() -> u32 {
    100
}

const fn default_min_prediction_score() -> f64 {
    0.6
}

#[allow(clippy::cast_sign_loss)]
const fn default_lock_timeout() -> u64 {
    WEEK_SECS as u64
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("models")
}

impl PipelineConfig {
    /// Parse and validate a JSON configuration document.
    ///
    /// # Errors
    /// Returns error if the document is not valid JSON or fails validation
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file, falling back to defaults when it does not exist.
    ///
    /// # Errors
    /// Returns error if the file can not be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No pipeline config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Minimum prediction confidence for a target.
    #[must_use]
    pub fn min_score_for(&self, target: &str) -> f64 {
        self.target_min_scores
            .get(target)
            .copied()
            .unwrap_or(self.min_prediction_score)
    }

    /// Check value ranges.
    ///
    /// # Errors
    /// Returns `Error::Config` describing the first invalid setting
    pub fn validate(&self) -> Result<()> {
        if self.enabled_time_splittings.is_empty() {
            return Err(Error::config("at least one time splitting method must be enabled"));
        }
        if self.min_log_coverage_percent == 0 || self.min_log_coverage_percent > 100 {
            return Err(Error::config(format!(
                "min_log_coverage_percent must be in (0, 100], got {}",
                self.min_log_coverage_percent
            )));
        }
        if self.boundary_resolution_secs <= 0 {
            return Err(Error::config("boundary_resolution_secs must be positive"));
        }
        if !(0.0..=1.0).contains(&self.recent_activity_ratio) {
            return Err(Error::config("recent_activity_ratio must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.min_prediction_score) {
            return Err(Error::config("min_prediction_score must be in [0, 1]"));
        }
        if let Some((target, score)) = self
            .target_min_scores
            .iter()
            .find(|(_, score)| !(0.0..=1.0).contains(*score))
        {
            return Err(Error::config(format!(
                "target_min_scores.{target} must be in [0, 1], got {score}"
            )));
        }
        if self.evaluation_iterations == 0 {
            return Err(Error::config("evaluation_iterations must be positive"));
        }
        Ok(())
    }
}

/// Persisted model definition, resolved through the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Target identifier.
    pub target: String,
    /// Indicator identifiers.
    pub indicators: Vec<String>,
    /// Active time-splitting identifier.
    #[serde(default)]
    pub time_splitting: Option<String>,
}
