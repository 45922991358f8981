//! Model lifecycle: evaluate, train and predict
//!
//! ```text
//! Unconfigured ──enable(ts)──► Configured ──train──► Trained
//!      ▲                            │                   │
//!      └──── update(disabled) ──────┴───────────────────┘
//!
//! evaluate: any state, every enabled time splitting
//! train/predict: enabled model with an active time splitting
//! ```

use super::{
    FileAction, ModelLogEntry, ModelRecord, ModelRepository, Prediction, PredictionRecord, Predictor,
    ProcessStatus, UsedFile,
};
use crate::analyser::{Analyser, DatasetBuilder, DatasetOutcome, DatasetRequest};
use crate::calculable::SampleId;
use crate::config::{ModelConfig, PipelineConfig};
use crate::dataset::{ArtifactHandle, DatasetManager};
use crate::registry::{Registry, ResolvedModel};
use crate::target::{InsightNotifier, PredictionEvent};
use crate::time_splitting::TimeSplitting;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Output subdirectory of evaluation runs.
pub const EVALUATION_DIR: &str = "evaluation";

/// Output subdirectory of train and predict runs.
pub const EXECUTION_DIR: &str = "execution";

/// Collaborators shared by every model.
pub struct ModelServices {
    /// Calculable and time splitting registry
    pub registry: Arc<Registry>,
    /// Sample source
    pub analyser: Arc<dyn Analyser>,
    /// Dataset storage
    pub datasets: Arc<DatasetManager>,
    /// Structured record storage
    pub repository: Arc<dyn ModelRepository>,
    /// External predictor
    pub predictor: Arc<dyn Predictor>,
    /// Insight delivery
    pub notifier: Arc<dyn InsightNotifier>,
    /// Installation identifier mixed into unique model ids
    pub site_id: String,
}

impl fmt::Debug for ModelServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelServices")
            .field("registry", &self.registry)
            .field("site_id", &self.site_id)
            .finish_non_exhaustive()
    }
}

impl ModelServices {
    fn config(&self) -> &PipelineConfig {
        &self.registry.context().config
    }
}

/// Lifecycle state derived from the stored flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    /// Disabled or without an active time splitting
    Unconfigured,
    /// Ready to train
    Configured,
    /// Trained at least once, ready to predict
    Trained,
}

/// Evaluation result of one time splitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    /// Status
    pub status: ProcessStatus,
    /// Predictor score, 0 when nothing was evaluated
    pub score: f64,
    /// Predictor errors or dataset diagnostics
    pub errors: Vec<String>,
    /// Appended log entry, if the predictor ran
    pub log_id: Option<u64>,
    /// Predictor output directory
    pub dir: Option<PathBuf>,
}

/// Evaluation of every enabled time splitting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Outcome per time splitting id
    pub outcomes: BTreeMap<String, EvaluationOutcome>,
    /// Dataset diagnostics
    pub logs: Vec<String>,
}

/// Train run result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingOutcome {
    /// Status
    pub status: ProcessStatus,
    /// Predictor errors or dataset diagnostics
    pub errors: Vec<String>,
}

/// Predict run result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionOutcome {
    /// Status
    pub status: ProcessStatus,
    /// Predictor errors or dataset diagnostics
    pub errors: Vec<String>,
    /// Ids of the stored predictions
    pub predictions: Vec<u64>,
    /// Skipped prediction rows
    pub logs: Vec<String>,
}

impl PredictionOutcome {
    fn failed(status: ProcessStatus, errors: Vec<String>) -> Self {
        Self {
            status,
            errors,
            predictions: Vec::new(),
            logs: Vec::new(),
        }
    }
}

/// Serializable model summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelExport {
    /// Model id
    pub id: u64,
    /// Target id
    pub target: String,
    /// Indicator ids
    pub indicators: Vec<String>,
    /// Active time splitting
    pub time_splitting: Option<String>,
    /// Configuration version
    pub version: i64,
    /// Enabled flag
    pub enabled: bool,
    /// Trained flag
    pub trained: bool,
}

/// A stored model bound to its collaborators.
pub struct Model {
    services: Arc<ModelServices>,
    record: ModelRecord,
    resolved: ResolvedModel,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("record", &self.record)
            .field("resolved", &self.resolved)
            .finish_non_exhaustive()
    }
}

impl Model {
    /// Store a new, disabled model.
    ///
    /// # Errors
    /// Returns `Error::Config` for unknown ids or a model without indicators
    pub fn create(services: Arc<ModelServices>, config: &ModelConfig) -> Result<Self> {
        let resolved = services.registry.resolve(config)?;
        let mut builder = ModelRecord::builder(config.target.clone(), resolved_indicator_ids(&resolved));
        if let Some(ts) = &config.time_splitting {
            builder = builder.time_splitting(ts.clone());
        }
        let id = services.repository.insert_model(builder.build())?;
        tracing::info!(model_id = id, target = %config.target, "Model created");
        Self::load(services, id)
    }

    /// Load a stored model.
    ///
    /// # Errors
    /// Returns `Error::NotFound` for unknown ids and `Error::Config` when the
    /// stored definition no longer resolves
    pub fn load(services: Arc<ModelServices>, model_id: u64) -> Result<Self> {
        let record = services.repository.get_model(model_id)?;
        let resolved = services.registry.resolve(&record.config())?;
        Ok(Self {
            services,
            record,
            resolved,
        })
    }

    /// Get the model id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.record.id()
    }

    /// Get the stored record.
    #[must_use]
    pub const fn record(&self) -> &ModelRecord {
        &self.record
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ModelState {
        if !self.record.is_enabled() || self.resolved.time_splitting.is_none() {
            ModelState::Unconfigured
        } else if self.record.is_trained() {
            ModelState::Trained
        } else {
            ModelState::Configured
        }
    }

    /// Change the definition. The version is bumped only when indicators or
    /// time splitting change.
    ///
    /// # Errors
    /// Returns `Error::Config` for unknown ids
    pub fn update(&mut self, enabled: bool, indicators: Vec<String>, time_splitting: Option<String>) -> Result<()> {
        let config = ModelConfig {
            target: self.record.target().to_string(),
            indicators,
            time_splitting,
        };
        let resolved = self.services.registry.resolve(&config)?;
        let mut record = self.record.clone();
        let bumped = record.update(enabled, resolved_indicator_ids(&resolved), config.time_splitting);
        self.persist(record, resolved)?;
        tracing::info!(model_id = self.id(), version = self.record.version(), bumped, "Model updated");
        Ok(())
    }

    /// Enable the model, optionally switching its time splitting.
    ///
    /// # Errors
    /// Returns `Error::Config` for an unknown time splitting
    pub fn enable(&mut self, time_splitting: Option<&str>) -> Result<()> {
        if let Some(id) = time_splitting {
            if !self.services.registry.has_time_splitting(id) {
                return Err(Error::config(format!("unknown time splitting {id:?}")));
            }
        }
        let mut record = self.record.clone();
        record.enable(time_splitting);
        let resolved = self.services.registry.resolve(&record.config())?;
        self.persist(record, resolved)
    }

    /// Flag the model as trained.
    ///
    /// # Errors
    /// Returns repository errors
    pub fn mark_as_trained(&mut self) -> Result<()> {
        let mut record = self.record.clone();
        record.mark_as_trained();
        let resolved = self.resolved.clone();
        self.persist(record, resolved)
    }

    /// Id the predictor knows this model configuration by. Changes whenever
    /// the model is modified.
    #[must_use]
    pub fn unique_id(&self) -> String {
        let seed = format!(
            "{}$${}$${}",
            self.services.site_id,
            self.id(),
            self.record.time_modified().timestamp_micros()
        );
        format!("{:016x}", trueno::hash_key(&seed))
    }

    /// `<output_dir>/<id>/<version>/<subdirs...>`, created if missing.
    ///
    /// # Errors
    /// Returns `Error::Io` if the directory can not be created
    pub fn output_dir(&self, subdirs: &[&str]) -> Result<PathBuf> {
        let mut dir = self.services.config().output_dir.clone();
        dir.push(self.id().to_string());
        dir.push(self.record.version().to_string());
        for subdir in subdirs {
            dir.push(subdir);
        }
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Evaluate every enabled time splitting and append one log entry per
    /// predictor run.
    ///
    /// # Errors
    /// Returns configuration, storage and contract errors. Predictor
    /// failures become `GeneralError` outcomes.
    pub fn evaluate(&self) -> Result<EvaluationReport> {
        let time_splittings = self.services.registry.enabled_time_splittings()?;
        let outcome = self.build_datasets(&time_splittings, true, true)?;
        let config = self.services.config();

        let mut report = EvaluationReport {
            outcomes: BTreeMap::new(),
            logs: outcome.logs,
        };
        for time_splitting in &time_splittings {
            let ts = time_splitting.id();
            let Some(handle) = outcome.datasets.get(ts) else {
                tracing::info!(model_id = self.id(), time_splitting = ts, "No evaluation dataset");
                report.outcomes.insert(
                    ts.to_string(),
                    EvaluationOutcome {
                        status: ProcessStatus::NoDataset,
                        score: 0.0,
                        errors: report.logs.clone(),
                        log_id: None,
                        dir: None,
                    },
                );
                continue;
            };

            let dir = self.output_dir(&[EVALUATION_DIR, ts])?;
            let dataset = self.read_dataset(handle)?;
            let result = self
                .services
                .predictor
                .evaluate(self.id(), config.accepted_deviation, config.evaluation_iterations, &dataset, &dir);
            let (status, score, errors, dir) = match result {
                Ok(result) => (result.status, result.score, result.errors, result.dir),
                Err(err) => {
                    tracing::warn!(model_id = self.id(), time_splitting = ts, error = %err, "Predictor evaluate failed");
                    (ProcessStatus::GeneralError, 0.0, vec![err.to_string()], None)
                }
            };

            let entry = ModelLogEntry::new(&self.record, ts, status, score)
                .with_dir(dir.clone())
                .with_errors(errors.clone());
            let log_id = self.services.repository.insert_log(entry)?;
            tracing::info!(model_id = self.id(), time_splitting = ts, %status, score, log_id, "Evaluated");
            report.outcomes.insert(
                ts.to_string(),
                EvaluationOutcome {
                    status,
                    score,
                    errors,
                    log_id: Some(log_id),
                    dir,
                },
            );
        }
        Ok(report)
    }

    /// Train on the labelled dataset of the active time splitting.
    ///
    /// The dataset is flagged as trained on once it reached the predictor,
    /// the model only becomes trained on a successful run.
    ///
    /// # Errors
    /// Returns `Error::Config` when the model is disabled or has no time
    /// splitting, plus storage and contract errors
    pub fn train(&mut self) -> Result<TrainingOutcome> {
        let time_splitting = self.active_time_splitting()?;
        let dir = self.output_dir(&[EXECUTION_DIR])?;
        let outcome = self.build_datasets(&[time_splitting.clone()], true, false)?;
        let Some(handle) = outcome.datasets.get(time_splitting.id()) else {
            tracing::info!(model_id = self.id(), "No training dataset");
            return Ok(TrainingOutcome {
                status: ProcessStatus::NoDataset,
                errors: outcome.logs,
            });
        };

        let dataset = self.read_dataset(handle)?;
        let attempt = self.services.predictor.train(&self.unique_id(), &dataset, &dir);
        // A dataset handed to the predictor is consumed whatever the result.
        self.services
            .repository
            .flag_file_used(UsedFile::new(self.id(), handle.id(), FileAction::Trained))?;
        let result = match attempt {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(model_id = self.id(), error = %err, "Predictor train failed");
                return Ok(TrainingOutcome {
                    status: ProcessStatus::GeneralError,
                    errors: vec![err.to_string()],
                });
            }
        };
        if !result.status.is_ok() {
            return Ok(TrainingOutcome {
                status: result.status,
                errors: result.errors,
            });
        }

        if !self.record.is_trained() {
            self.mark_as_trained()?;
        }
        tracing::info!(model_id = self.id(), artifact = handle.id(), "Model trained");
        Ok(TrainingOutcome {
            status: ProcessStatus::Ok,
            errors: result.errors,
        })
    }

    /// Build the unlabelled dataset of the active time splitting and predict
    /// on it.
    ///
    /// # Errors
    /// Returns `Error::Config` when the model is disabled or has no time
    /// splitting, plus storage and contract errors
    pub fn predict(&self) -> Result<PredictionOutcome> {
        let time_splitting = self.active_time_splitting()?;
        self.output_dir(&[EXECUTION_DIR])?;
        let outcome = self.build_datasets(&[time_splitting.clone()], false, false)?;
        match outcome.datasets.get(time_splitting.id()) {
            Some(handle) => self.predict_dataset(handle),
            None => {
                tracing::info!(model_id = self.id(), "No prediction dataset");
                Ok(PredictionOutcome::failed(ProcessStatus::NoDataset, outcome.logs))
            }
        }
    }

    /// Predict on an already built unlabelled dataset.
    ///
    /// # Errors
    /// Returns `Error::AlreadyPredicted` if this model already predicted on
    /// the artifact, `Error::Config` when the model is not ready, plus
    /// storage and contract errors
    pub fn predict_dataset(&self, handle: &ArtifactHandle) -> Result<PredictionOutcome> {
        let time_splitting = self.active_time_splitting()?;
        let used = UsedFile::new(self.id(), handle.id(), FileAction::Predicted);
        if self.services.repository.is_file_used(&used)? {
            return Err(Error::AlreadyPredicted {
                model_id: self.id(),
                artifact: handle.id().to_string(),
            });
        }

        let dir = self.output_dir(&[EXECUTION_DIR])?;
        let dataset = self.read_dataset(handle)?;
        let result = match self.services.predictor.predict(&self.unique_id(), &dataset, &dir) {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(model_id = self.id(), error = %err, "Predictor predict failed");
                return Ok(PredictionOutcome::failed(ProcessStatus::GeneralError, vec![err.to_string()]));
            }
        };
        if !result.status.is_ok() {
            return Ok(PredictionOutcome::failed(result.status, result.errors));
        }
        // Claimed before anything is stored; a later failure leaves it claimed.
        if !self.services.repository.try_flag_file_used(used)? {
            return Err(Error::AlreadyPredicted {
                model_id: self.id(),
                artifact: handle.id().to_string(),
            });
        }

        let features = self.services.datasets.read_unlabelled(handle)?;
        let target = &self.resolved.target;
        let mut logs = Vec::new();
        let mut accepted: Vec<(String, SampleId, usize, f64, f64)> = Vec::new();
        for row in &result.predictions {
            match parse_prediction_row(row, time_splitting.as_ref()) {
                Ok((sample_id, range_index, value, score)) => {
                    if target.triggers_callback(value, score) {
                        accepted.push((row[0].clone(), sample_id, range_index, value, score));
                    }
                }
                Err(reason) => {
                    tracing::debug!(model_id = self.id(), ?row, %reason, "Skipping prediction row");
                    logs.push(reason);
                }
            }
        }

        let ids: Vec<SampleId> = accepted.iter().map(|(_, sample_id, ..)| *sample_id).collect();
        let samples = self.services.analyser.get_samples(&ids)?;
        let mut stored = Vec::new();
        let mut contexts = BTreeSet::new();
        for (unique_sample_id, sample_id, range_index, value, score) in accepted {
            let Some(sample) = samples.get(sample_id) else {
                logs.push(format!("Sample {sample_id} is no longer available"));
                continue;
            };
            let snapshot = features.get(&unique_sample_id).cloned().unwrap_or_default();
            let record = PredictionRecord::new(
                self.id(),
                sample.context_id,
                sample_id,
                range_index,
                value,
                score,
                &snapshot,
            )?;
            stored.push(self.services.repository.insert_prediction(record)?);
            target.prediction_callback(&PredictionEvent {
                model_id: self.id(),
                sample,
                range_index,
                prediction: value,
                score,
            })?;
            contexts.insert(sample.context_id);
        }

        if !contexts.is_empty() {
            target.generate_insights(self.id(), &contexts, self.services.notifier.as_ref())?;
        }
        tracing::info!(
            model_id = self.id(),
            artifact = handle.id(),
            rows = result.predictions.len(),
            stored = stored.len(),
            contexts = contexts.len(),
            "Predictions stored"
        );
        Ok(PredictionOutcome {
            status: ProcessStatus::Ok,
            errors: result.errors,
            predictions: stored,
            logs,
        })
    }

    /// Latest prediction per sample in a context.
    ///
    /// A prediction for a later range supersedes earlier ones. Samples the
    /// analyser no longer knows are dropped.
    ///
    /// # Errors
    /// Returns repository errors and `Error::Config` for snapshots referring
    /// to unknown indicators
    pub fn predictions(&self, context_id: u64) -> Result<Vec<Prediction>> {
        let mut latest: BTreeMap<SampleId, PredictionRecord> = BTreeMap::new();
        for record in self.services.repository.predictions(self.id(), context_id)? {
            let supersedes = latest
                .get(&record.sample_id())
                .map_or(true, |current| record.range_index() >= current.range_index());
            if supersedes {
                latest.insert(record.sample_id(), record);
            }
        }

        let ids: Vec<SampleId> = latest.keys().copied().collect();
        let samples = self.services.analyser.get_samples(&ids)?;
        latest
            .into_values()
            .filter_map(|record| samples.get(record.sample_id()).cloned().map(|sample| (record, sample)))
            .map(|(record, sample)| Prediction::new(record, sample, &self.services.registry))
            .collect()
    }

    /// Contexts with predictions of this model.
    ///
    /// # Errors
    /// Returns repository errors
    pub fn prediction_contexts(&self) -> Result<Vec<u64>> {
        self.services.repository.prediction_contexts(self.id())
    }

    /// Evaluation history, oldest first.
    ///
    /// # Errors
    /// Returns repository errors
    pub fn logs(&self) -> Result<Vec<ModelLogEntry>> {
        self.services.repository.logs(self.id())
    }

    /// Serializable summary of the definition.
    #[must_use]
    pub fn export(&self) -> ModelExport {
        ModelExport {
            id: self.id(),
            target: self.record.target().to_string(),
            indicators: self.record.indicators().to_vec(),
            time_splitting: self.record.time_splitting().map(ToString::to_string),
            version: self.record.version(),
            enabled: self.record.is_enabled(),
            trained: self.record.is_trained(),
        }
    }

    fn active_time_splitting(&self) -> Result<Arc<dyn TimeSplitting>> {
        if !self.record.is_enabled() {
            return Err(Error::config(format!("model {} is not enabled", self.id())));
        }
        self.resolved
            .time_splitting
            .clone()
            .ok_or_else(|| Error::config(format!("model {} has no time splitting", self.id())))
    }

    fn build_datasets(
        &self,
        time_splittings: &[Arc<dyn TimeSplitting>],
        labelled: bool,
        evaluation: bool,
    ) -> Result<DatasetOutcome> {
        let builder = DatasetBuilder::new(self.services.analyser.clone(), self.services.datasets.clone());
        let request = DatasetRequest {
            model_id: self.id(),
            target: self.resolved.target.as_ref(),
            indicators: &self.resolved.indicators,
            time_splittings,
            evaluation,
        };
        if labelled {
            builder.labelled(&request)
        } else {
            builder.unlabelled(&request)
        }
    }

    fn read_dataset(&self, handle: &ArtifactHandle) -> Result<String> {
        self.services.datasets.artifact_store().read(handle)
    }

    fn persist(&mut self, record: ModelRecord, resolved: ResolvedModel) -> Result<()> {
        self.services.repository.update_model(&record)?;
        self.record = record;
        self.resolved = resolved;
        Ok(())
    }
}

fn resolved_indicator_ids(resolved: &ResolvedModel) -> Vec<String> {
    resolved.indicators.iter().map(|indicator| indicator.id().to_string()).collect()
}

/// `[uniquesampleid, value]` or `[uniquesampleid, value, score]`; a missing
/// score means full confidence.
fn parse_prediction_row(
    row: &[String],
    time_splitting: &dyn TimeSplitting,
) -> std::result::Result<(SampleId, usize, f64, f64), String> {
    if row.len() < 2 {
        return Err(format!("Prediction row {row:?} has fewer than 2 fields"));
    }
    let (sample_id, range_index) = time_splitting
        .decode(&row[0])
        .map_err(|err| format!("Prediction row {row:?}: {err}"))?;
    let value: f64 = row[1]
        .parse()
        .map_err(|_| format!("Prediction row {row:?}: value is not a number"))?;
    let score = match row.get(2) {
        Some(score) => score
            .parse()
            .map_err(|_| format!("Prediction row {row:?}: score is not a number"))?,
        None => 1.0,
    };
    Ok((sample_id, range_index, value, score))
}
