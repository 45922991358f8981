//! Model lifecycle and persisted records
//!
//! [`Model`] ties a stored [`ModelRecord`] to the collaborators it needs:
//! the registry resolving its ids, the analyser feeding datasets, the
//! repository storing records and the external [`Predictor`].

mod log;
mod orchestrator;
mod prediction;
mod predictor;
mod record;
mod repository;

pub use log::ModelLogEntry;
pub use orchestrator::{
    EvaluationOutcome, EvaluationReport, Model, ModelExport, ModelServices, ModelState, PredictionOutcome,
    TrainingOutcome, EVALUATION_DIR, EXECUTION_DIR,
};
pub use prediction::{CalculationDetail, Prediction, PredictionRecord, RANGE_FEATURE};
pub use predictor::{EvaluationResult, PredictionResult, Predictor, ProcessStatus, ScriptedPredictor, TrainingResult};
pub use record::{ModelRecord, ModelRecordBuilder};
pub use repository::{FileAction, MemoryModelRepository, ModelRepository, UsedFile};
