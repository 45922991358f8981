//! External predictor contract and status codes
//!
//! The predictor fits and applies models; this crate only prepares its input
//! datasets and interprets its results. Business outcomes travel as
//! [`ProcessStatus`] codes, transport failures as [`crate::Error::Predictor`].

use crate::dataset::DatasetTable;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Outcome of an evaluate, train or predict run.
///
/// Codes are bit flags on the predictor wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum ProcessStatus {
    /// Finished successfully
    Ok = 0,
    /// Failed, see the error list
    GeneralError = 1,
    /// No usable dataset could be built
    NoDataset = 2,
    /// Evaluation score below the accepted threshold
    EvaluateLowScore = 4,
    /// Not enough data to evaluate
    EvaluateNotEnoughData = 8,
}

impl ProcessStatus {
    /// Numeric wire code.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire code.
    ///
    /// # Errors
    /// Returns `Error::InvalidInput` for unknown codes
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::Ok),
            1 => Ok(Self::GeneralError),
            2 => Ok(Self::NoDataset),
            4 => Ok(Self::EvaluateLowScore),
            8 => Ok(Self::EvaluateNotEnoughData),
            other => Err(Error::invalid_input(format!("unknown process status code {other}"))),
        }
    }

    /// Whether the run succeeded.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl From<ProcessStatus> for u8 {
    fn from(status: ProcessStatus) -> Self {
        status.code()
    }
}

impl TryFrom<u8> for ProcessStatus {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        Self::from_code(code)
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "ok",
            Self::GeneralError => "general error",
            Self::NoDataset => "no dataset",
            Self::EvaluateLowScore => "low score",
            Self::EvaluateNotEnoughData => "not enough data",
        };
        write!(f, "{name} ({})", self.code())
    }
}

/// Predictor evaluate response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Status
    pub status: ProcessStatus,
    /// Model quality in `[0, 1]`
    pub score: f64,
    /// Error messages
    pub errors: Vec<String>,
    /// Where the predictor left its evaluation output
    pub dir: Option<PathBuf>,
}

/// Predictor train response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingResult {
    /// Status
    pub status: ProcessStatus,
    /// Error messages
    pub errors: Vec<String>,
}

/// Predictor predict response.
///
/// Each prediction row is `[uniquesampleid, value]` or
/// `[uniquesampleid, value, score]`; anything shorter is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Status
    pub status: ProcessStatus,
    /// Error messages
    pub errors: Vec<String>,
    /// Raw prediction rows
    pub predictions: Vec<Vec<String>>,
}

/// The external statistical backend.
pub trait Predictor: Send + Sync {
    /// Evaluate how well the dataset can be predicted.
    ///
    /// # Errors
    /// Returns `Error::Predictor` when the backend can not be reached
    fn evaluate(
        &self,
        model_id: u64,
        accepted_deviation: f64,
        iterations: u32,
        dataset: &str,
        output_dir: &Path,
    ) -> Result<EvaluationResult>;

    /// Train the model identified by `unique_id`.
    ///
    /// # Errors
    /// Returns `Error::Predictor` when the backend can not be reached
    fn train(&self, unique_id: &str, dataset: &str, output_dir: &Path) -> Result<TrainingResult>;

    /// Predict every row of an unlabelled dataset.
    ///
    /// # Errors
    /// Returns `Error::Predictor` when the backend can not be reached
    fn predict(&self, unique_id: &str, dataset: &str, output_dir: &Path) -> Result<PredictionResult>;
}

/// Deterministic predictor for tests and demos.
///
/// Predicts the same value and score for every dataset row, unless raw
/// prediction rows were scripted.
#[derive(Debug)]
pub struct ScriptedPredictor {
    value: f64,
    score: Option<f64>,
    evaluation: (ProcessStatus, f64),
    raw: Option<Vec<Vec<String>>>,
    unreachable: bool,
    evaluate_calls: AtomicUsize,
    train_calls: AtomicUsize,
    predict_calls: AtomicUsize,
}

impl ScriptedPredictor {
    /// Predict `value` with `score` for every row.
    #[must_use]
    pub const fn new(value: f64, score: Option<f64>) -> Self {
        Self {
            value,
            score,
            evaluation: (ProcessStatus::Ok, 1.0),
            raw: None,
            unreachable: false,
            evaluate_calls: AtomicUsize::new(0),
            train_calls: AtomicUsize::new(0),
            predict_calls: AtomicUsize::new(0),
        }
    }

    /// Return these rows from `predict` instead of one per dataset row.
    #[must_use]
    pub fn with_predictions(mut self, rows: Vec<Vec<String>>) -> Self {
        self.raw = Some(rows);
        self
    }

    /// Status and score returned by `evaluate`.
    #[must_use]
    pub const fn with_evaluation(mut self, status: ProcessStatus, score: f64) -> Self {
        self.evaluation = (status, score);
        self
    }

    /// Fail every call with `Error::Predictor`.
    #[must_use]
    pub const fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Number of evaluate calls.
    #[must_use]
    pub fn evaluate_calls(&self) -> usize {
        self.evaluate_calls.load(Ordering::Relaxed)
    }

    /// Number of train calls.
    #[must_use]
    pub fn train_calls(&self) -> usize {
        self.train_calls.load(Ordering::Relaxed)
    }

    /// Number of predict calls.
    #[must_use]
    pub fn predict_calls(&self) -> usize {
        self.predict_calls.load(Ordering::Relaxed)
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable {
            return Err(Error::Predictor("connection refused".to_string()));
        }
        Ok(())
    }
}

impl Predictor for ScriptedPredictor {
    fn evaluate(
        &self,
        _model_id: u64,
        _accepted_deviation: f64,
        _iterations: u32,
        dataset: &str,
        output_dir: &Path,
    ) -> Result<EvaluationResult> {
        self.evaluate_calls.fetch_add(1, Ordering::Relaxed);
        self.check_reachable()?;
        let table = DatasetTable::parse(dataset)?;
        let (status, score) = if table.is_empty() {
            (ProcessStatus::EvaluateNotEnoughData, 0.0)
        } else {
            self.evaluation
        };
        Ok(EvaluationResult {
            status,
            score,
            errors: Vec::new(),
            dir: Some(output_dir.to_path_buf()),
        })
    }

    fn train(&self, _unique_id: &str, dataset: &str, _output_dir: &Path) -> Result<TrainingResult> {
        self.train_calls.fetch_add(1, Ordering::Relaxed);
        self.check_reachable()?;
        DatasetTable::parse(dataset)?;
        Ok(TrainingResult {
            status: ProcessStatus::Ok,
            errors: Vec::new(),
        })
    }

    fn predict(&self, _unique_id: &str, dataset: &str, _output_dir: &Path) -> Result<PredictionResult> {
        self.predict_calls.fetch_add(1, Ordering::Relaxed);
        self.check_reachable()?;
        let predictions = match &self.raw {
            Some(rows) => rows.clone(),
            None => DatasetTable::parse(dataset)?
                .rows
                .iter()
                .filter_map(|row| row.first())
                .map(|id| {
                    let mut prediction = vec![id.clone(), self.value.to_string()];
                    if let Some(score) = self.score {
                        prediction.push(score.to_string());
                    }
                    prediction
                })
                .collect(),
        };
        Ok(PredictionResult {
            status: ProcessStatus::Ok,
            errors: Vec::new(),
            predictions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATASET: &str = "time_splitting\nquarters\nsampleid,reads\n1-0,0.5\n2-0,1\n";

    #[test]
    fn test_status_codes() {
        assert_eq!(ProcessStatus::Ok.code(), 0);
        assert_eq!(ProcessStatus::GeneralError.code(), 1);
        assert_eq!(ProcessStatus::NoDataset.code(), 2);
        assert_eq!(ProcessStatus::EvaluateLowScore.code(), 4);
        assert_eq!(ProcessStatus::EvaluateNotEnoughData.code(), 8);
        assert_eq!(ProcessStatus::from_code(4).unwrap(), ProcessStatus::EvaluateLowScore);
        assert!(ProcessStatus::from_code(3).is_err());
        assert!(ProcessStatus::Ok.is_ok());
        assert!(!ProcessStatus::NoDataset.is_ok());
    }

    #[test]
    fn test_status_serializes_as_code() {
        let json = serde_json::to_string(&ProcessStatus::NoDataset).unwrap();
        assert_eq!(json, "2");
        let status: ProcessStatus = serde_json::from_str("8").unwrap();
        assert_eq!(status, ProcessStatus::EvaluateNotEnoughData);
        assert!(serde_json::from_str::<ProcessStatus>("16").is_err());
    }

    #[test]
    fn test_scripted_predict_one_row_per_sample() {
        let predictor = ScriptedPredictor::new(1.0, Some(0.9));
        let result = predictor.predict("abc", DATASET, Path::new("out")).unwrap();
        assert_eq!(result.predictions.len(), 2);
        assert_eq!(result.predictions[0], vec!["1-0", "1", "0.9"]);
        assert_eq!(predictor.predict_calls(), 1);
    }

    #[test]
    fn test_scripted_predict_without_score() {
        let predictor = ScriptedPredictor::new(0.0, None);
        let result = predictor.predict("abc", DATASET, Path::new("out")).unwrap();
        assert_eq!(result.predictions[1], vec!["2-0", "0"]);
    }

    #[test]
    fn test_unreachable_predictor() {
        let predictor = ScriptedPredictor::new(1.0, None).unreachable();
        let err = predictor.train("abc", DATASET, Path::new("out")).unwrap_err();
        assert!(matches!(err, Error::Predictor(_)));
        assert_eq!(predictor.train_calls(), 1);
    }

    #[test]
    fn test_scripted_evaluation() {
        let predictor = ScriptedPredictor::new(1.0, None).with_evaluation(ProcessStatus::EvaluateLowScore, 0.3);
        let result = predictor.evaluate(1, 0.02, 100, DATASET, Path::new("out")).unwrap();
        assert_eq!(result.status, ProcessStatus::EvaluateLowScore);
        assert!((result.score - 0.3).abs() < f64::EPSILON);
    }
}
