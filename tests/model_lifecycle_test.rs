//! End-to-end model lifecycle: evaluate, train and predict over two courses.

mod common;

use analytics_pipeline::dataset::{ArtifactStore, FeatureMap, FileArea};
use analytics_pipeline::model::{
    FileAction, Model, ModelRepository, ModelServices, ModelState, PredictionRecord, ProcessStatus, ScriptedPredictor, UsedFile,
};
use analytics_pipeline::target::{Insight, InsightNotifier};
use analytics_pipeline::Error;
use common::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn enabled_model(p: &Pipeline) -> Model {
    let mut model = Model::create(p.services.clone(), &dropout_model(None)).unwrap();
    model.enable(Some("quarters")).unwrap();
    model
}

fn merged_dir(model: &Model) -> String {
    format!("{}/timesplitting/quarters", model.id())
}

// ============================================================================
// Configuration and state
// ============================================================================

#[test]
fn test_new_model_is_unconfigured() {
    let p = pipeline(BOTH, ScriptedPredictor::new(1.0, Some(0.9)));
    let model = Model::create(p.services.clone(), &dropout_model(None)).unwrap();
    assert_eq!(model.state(), ModelState::Unconfigured);
    assert!(!model.record().is_enabled());
    // Indicators are stored in resolved order.
    assert_eq!(model.record().indicators(), ["any_access_before_start", "read_actions"]);
}

#[test]
fn test_enable_validates_time_splitting() {
    let p = pipeline(BOTH, ScriptedPredictor::new(1.0, Some(0.9)));
    let mut model = Model::create(p.services.clone(), &dropout_model(None)).unwrap();
    let err = model.enable(Some("weekly")).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(!model.record().is_enabled());

    model.enable(Some("quarters")).unwrap();
    assert_eq!(model.state(), ModelState::Configured);
    let reloaded = Model::load(p.services.clone(), model.id()).unwrap();
    assert_eq!(reloaded.record().time_splitting(), Some("quarters"));
}

#[test]
fn test_enabled_without_time_splitting_is_unconfigured() {
    let p = pipeline(BOTH, ScriptedPredictor::new(1.0, Some(0.9)));
    let mut model = Model::create(p.services.clone(), &dropout_model(None)).unwrap();
    model.enable(None).unwrap();
    assert_eq!(model.state(), ModelState::Unconfigured);
    assert!(matches!(model.train(), Err(Error::Config(_))));
    assert!(matches!(model.predict(), Err(Error::Config(_))));
}

#[test]
fn test_unknown_target_rejected_at_create() {
    let p = pipeline(BOTH, ScriptedPredictor::new(1.0, Some(0.9)));
    let mut config = dropout_model(None);
    config.target = "grade_prediction".to_string();
    assert!(matches!(Model::create(p.services.clone(), &config), Err(Error::Config(_))));
    assert_eq!(p.repository.model_count(), 0);
}

#[test]
fn test_update_bumps_version_and_unique_id() {
    let p = pipeline(BOTH, ScriptedPredictor::new(1.0, Some(0.9)));
    let mut model = enabled_model(&p);
    let (version, unique_id) = (model.record().version(), model.unique_id());

    std::thread::sleep(std::time::Duration::from_millis(5));
    model
        .update(true, vec!["read_actions".to_string()], Some("quarters".to_string()))
        .unwrap();
    assert!(model.record().version() > version);
    assert_ne!(model.unique_id(), unique_id);
    assert_eq!(model.unique_id().len(), 16);

    let version = model.record().version();
    model
        .update(false, vec!["read_actions".to_string()], Some("quarters".to_string()))
        .unwrap();
    assert_eq!(model.record().version(), version);
    assert_eq!(model.state(), ModelState::Unconfigured);
}

#[test]
fn test_output_dir_layout() {
    let p = pipeline(BOTH, ScriptedPredictor::new(1.0, Some(0.9)));
    let model = enabled_model(&p);
    let dir = model.output_dir(&["execution"]).unwrap();
    let expected = p
        .output
        .path()
        .join(model.id().to_string())
        .join(model.record().version().to_string())
        .join("execution");
    assert_eq!(dir, expected);
    assert!(dir.is_dir());
}

#[test]
fn test_export_is_serializable() {
    let p = pipeline(BOTH, ScriptedPredictor::new(1.0, Some(0.9)));
    let model = enabled_model(&p);
    let json = serde_json::to_value(model.export()).unwrap();
    assert_eq!(json["target"], "no_access_in_last_quarter");
    assert_eq!(json["time_splitting"], "quarters");
    assert_eq!(json["enabled"], true);
    assert_eq!(json["trained"], false);
}

// ============================================================================
// Evaluate
// ============================================================================

#[test]
fn test_evaluate_every_enabled_time_splitting() {
    let p = pipeline(BOTH, ScriptedPredictor::new(1.0, Some(0.9)));
    let model = Model::create(p.services.clone(), &dropout_model(None)).unwrap();

    let report = model.evaluate().unwrap();
    let evaluated: Vec<&str> = report.outcomes.keys().map(String::as_str).collect();
    assert_eq!(evaluated, vec!["quarters", "quarters_accum", "single_range"]);
    for outcome in report.outcomes.values() {
        assert_eq!(outcome.status, ProcessStatus::Ok);
        assert!(outcome.log_id.is_some());
        assert!(outcome.dir.as_ref().is_some_and(|dir| dir.is_dir()));
    }
    assert_eq!(p.predictor.evaluate_calls(), 3);
    // The running course can not be labelled.
    assert!(report.logs.iter().any(|log| log.contains("not valid for target")));
    assert!(p.services.datasets.evaluation_file(model.id(), "quarters").unwrap().is_some());
}

#[test]
fn test_evaluation_log_is_append_only() {
    let p = pipeline(
        BOTH,
        ScriptedPredictor::new(1.0, Some(0.9)).with_evaluation(ProcessStatus::EvaluateLowScore, 0.4),
    );
    let model = Model::create(p.services.clone(), &dropout_model(None)).unwrap();
    model.evaluate().unwrap();
    model.evaluate().unwrap();

    let logs = model.logs().unwrap();
    assert_eq!(logs.len(), 6);
    assert!(logs.iter().all(|entry| entry.status() == ProcessStatus::EvaluateLowScore));
    assert!(logs.iter().all(|entry| entry.version() == model.record().version()));
    let mut ids: Vec<u64> = logs.iter().map(|entry| entry.id()).collect();
    ids.dedup();
    assert_eq!(ids.len(), 6);
}

#[test]
fn test_evaluate_without_finished_courses() {
    let p = pipeline(
        Courses {
            finished: false,
            running: true,
        },
        ScriptedPredictor::new(1.0, Some(0.9)),
    );
    let model = Model::create(p.services.clone(), &dropout_model(None)).unwrap();
    let report = model.evaluate().unwrap();
    assert_eq!(report.outcomes.len(), 3);
    for outcome in report.outcomes.values() {
        assert_eq!(outcome.status, ProcessStatus::NoDataset);
        assert!(outcome.log_id.is_none());
        assert!(!outcome.errors.is_empty());
    }
    assert_eq!(p.predictor.evaluate_calls(), 0);
    assert!(model.logs().unwrap().is_empty());
}

#[test]
fn test_evaluate_predictor_failure_is_logged() {
    let p = pipeline(BOTH, ScriptedPredictor::new(1.0, Some(0.9)).unreachable());
    let model = Model::create(p.services.clone(), &dropout_model(None)).unwrap();
    let report = model.evaluate().unwrap();
    let outcome = &report.outcomes["single_range"];
    assert_eq!(outcome.status, ProcessStatus::GeneralError);
    assert!(outcome.errors[0].contains("connection refused"));
    assert_eq!(model.logs().unwrap().len(), 3);
}

// ============================================================================
// Train
// ============================================================================

#[test]
fn test_train_marks_model_trained() {
    let p = pipeline(BOTH, ScriptedPredictor::new(1.0, Some(0.9)));
    let mut model = enabled_model(&p);

    let outcome = model.train().unwrap();
    assert_eq!(outcome.status, ProcessStatus::Ok);
    assert_eq!(model.state(), ModelState::Trained);
    assert!(p.repository.get_model(model.id()).unwrap().is_trained());
    assert_eq!(p.predictor.train_calls(), 1);

    let handles = p.artifacts.list(FileArea::Labelled, &merged_dir(&model)).unwrap();
    assert_eq!(handles.len(), 1);
    let used = UsedFile::new(model.id(), handles[0].id(), FileAction::Trained);
    assert!(p.repository.is_file_used(&used).unwrap());
}

#[test]
fn test_train_without_dataset() {
    let p = pipeline(
        Courses {
            finished: false,
            running: true,
        },
        ScriptedPredictor::new(1.0, Some(0.9)),
    );
    let mut model = enabled_model(&p);
    let outcome = model.train().unwrap();
    assert_eq!(outcome.status, ProcessStatus::NoDataset);
    assert!(!outcome.errors.is_empty());
    assert_eq!(p.predictor.train_calls(), 0);
    assert_eq!(model.state(), ModelState::Configured);
}

#[test]
fn test_train_predictor_failure() {
    let p = pipeline(BOTH, ScriptedPredictor::new(1.0, Some(0.9)).unreachable());
    let mut model = enabled_model(&p);
    let outcome = model.train().unwrap();
    assert_eq!(outcome.status, ProcessStatus::GeneralError);
    assert!(!model.record().is_trained());

    // The dataset still counts as consumed.
    let handles = p.artifacts.list(FileArea::Labelled, &merged_dir(&model)).unwrap();
    let used = UsedFile::new(model.id(), handles[0].id(), FileAction::Trained);
    assert!(p.repository.is_file_used(&used).unwrap());
}

#[test]
fn test_train_requires_enabled_model() {
    let p = pipeline(BOTH, ScriptedPredictor::new(1.0, Some(0.9)));
    let mut model = Model::create(p.services.clone(), &dropout_model(Some("quarters"))).unwrap();
    assert!(matches!(model.train(), Err(Error::Config(_))));
}

// ============================================================================
// Predict
// ============================================================================

#[test]
fn test_predict_stores_predictions_and_insights() {
    let p = pipeline(BOTH, ScriptedPredictor::new(1.0, Some(0.9)));
    let model = enabled_model(&p);

    let outcome = model.predict().unwrap();
    assert_eq!(outcome.status, ProcessStatus::Ok);
    assert_eq!(outcome.predictions.len(), 2);
    assert_eq!(p.notifier.for_context(RUNNING_CONTEXT).len(), 1);
    assert!(p.notifier.for_context(FINISHED_CONTEXT).is_empty());
    assert_eq!(model.prediction_contexts().unwrap(), vec![RUNNING_CONTEXT]);

    let predictions = model.predictions(RUNNING_CONTEXT).unwrap();
    assert_eq!(predictions.len(), 2);
    let first = &predictions[0];
    assert_eq!(first.record.sample_id(), 11);
    assert_eq!(first.record.range_index(), 0);
    assert!((first.record.score() - 0.9).abs() < f64::EPSILON);
    assert_eq!(first.sample.data["user"]["name"], "Ada");
    let features: Vec<&str> = first.calculations.iter().map(|c| c.feature.as_str()).collect();
    assert_eq!(features, vec!["any_access_before_start", "read_actions", "read_actions/mean"]);
}

#[test]
fn test_predict_twice_on_same_artifact_is_refused() {
    let p = pipeline(BOTH, ScriptedPredictor::new(1.0, Some(0.9)));
    let model = enabled_model(&p);
    model.predict().unwrap();

    let handles = p.artifacts.list(FileArea::Unlabelled, &merged_dir(&model)).unwrap();
    assert_eq!(handles.len(), 1);
    let err = model.predict_dataset(&handles[0]).unwrap_err();
    assert!(matches!(err, Error::AlreadyPredicted { model_id, .. } if model_id == model.id()));
    assert_eq!(p.predictor.predict_calls(), 1);
}

/// Fails the first delivery, accepts the rest.
#[derive(Default)]
struct FlakyNotifier {
    failed: AtomicBool,
}

impl InsightNotifier for FlakyNotifier {
    fn notify(&self, _insight: Insight) -> analytics_pipeline::Result<()> {
        if self.failed.swap(true, Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::storage("notifier offline"))
        }
    }
}

#[test]
fn test_retry_after_notifier_failure_does_not_duplicate_predictions() {
    let p = pipeline(BOTH, ScriptedPredictor::new(1.0, Some(0.9)));
    let services = Arc::new(ModelServices {
        registry: p.services.registry.clone(),
        analyser: p.services.analyser.clone(),
        datasets: p.services.datasets.clone(),
        repository: p.services.repository.clone(),
        predictor: p.services.predictor.clone(),
        notifier: Arc::new(FlakyNotifier::default()),
        site_id: p.services.site_id.clone(),
    });
    let mut model = Model::create(services, &dropout_model(None)).unwrap();
    model.enable(Some("quarters")).unwrap();

    assert!(matches!(model.predict(), Err(Error::Storage(_))));
    assert_eq!(p.repository.prediction_count(), 2);

    let handle = p.artifacts.list(FileArea::Unlabelled, &merged_dir(&model)).unwrap().remove(0);
    let err = model.predict_dataset(&handle).unwrap_err();
    assert!(matches!(err, Error::AlreadyPredicted { .. }));
    assert_eq!(p.repository.prediction_count(), 2);
}

#[test]
fn test_another_model_may_use_the_same_artifact() {
    let p = pipeline(BOTH, ScriptedPredictor::new(1.0, Some(0.9)));
    let first = enabled_model(&p);
    first.predict().unwrap();
    let handle = p.artifacts.list(FileArea::Unlabelled, &merged_dir(&first)).unwrap().remove(0);

    let second = enabled_model(&p);
    let outcome = second.predict_dataset(&handle).unwrap();
    assert_eq!(outcome.status, ProcessStatus::Ok);
}

#[test]
fn test_low_score_and_ignored_class_do_not_trigger() {
    let p = pipeline(BOTH, ScriptedPredictor::new(1.0, Some(0.3)));
    let model = enabled_model(&p);
    assert!(model.predict().unwrap().predictions.is_empty());

    let p = pipeline(BOTH, ScriptedPredictor::new(0.0, None));
    let model = enabled_model(&p);
    let outcome = model.predict().unwrap();
    assert_eq!(outcome.status, ProcessStatus::Ok);
    assert!(outcome.predictions.is_empty());
    assert!(p.notifier.is_empty());
}

#[test]
fn test_missing_score_means_full_confidence() {
    let p = pipeline(BOTH, ScriptedPredictor::new(1.0, None));
    let model = enabled_model(&p);
    model.predict().unwrap();
    let predictions = model.predictions(RUNNING_CONTEXT).unwrap();
    assert!(predictions.iter().all(|p| (p.record.score() - 1.0).abs() < f64::EPSILON));
}

#[test]
fn test_malformed_prediction_rows_are_skipped() {
    let rows = vec![
        vec!["11-0".to_string()],
        vec!["11-0".to_string(), "1".to_string(), "0.9".to_string()],
        vec!["bogus".to_string(), "1".to_string()],
    ];
    let p = pipeline(BOTH, ScriptedPredictor::new(1.0, Some(0.9)).with_predictions(rows));
    let model = enabled_model(&p);
    let outcome = model.predict().unwrap();
    assert_eq!(outcome.predictions.len(), 1);
    assert_eq!(outcome.logs.len(), 2);
}

#[test]
fn test_predict_without_running_courses() {
    let p = pipeline(
        Courses {
            finished: true,
            running: false,
        },
        ScriptedPredictor::new(1.0, Some(0.9)),
    );
    let model = enabled_model(&p);
    let outcome = model.predict().unwrap();
    assert_eq!(outcome.status, ProcessStatus::NoDataset);
    assert_eq!(p.predictor.predict_calls(), 0);
}

// ============================================================================
// Prediction retrieval
// ============================================================================

#[test]
fn test_later_range_supersedes_earlier_prediction() {
    let p = pipeline(BOTH, ScriptedPredictor::new(1.0, Some(0.9)));
    let model = enabled_model(&p);
    let features: FeatureMap = [("read_actions".to_string(), "0.5".to_string())].into_iter().collect();
    for (sample, range, value) in [(11, 1, 1.0), (11, 0, 0.0), (12, 0, 1.0), (99, 1, 1.0)] {
        let record = PredictionRecord::new(model.id(), RUNNING_CONTEXT, sample, range, value, 0.8, &features).unwrap();
        p.repository.insert_prediction(record).unwrap();
    }

    let predictions = model.predictions(RUNNING_CONTEXT).unwrap();
    // Sample 99 is unknown to the analyser.
    let latest: Vec<(u64, usize)> = predictions
        .iter()
        .map(|p| (p.record.sample_id(), p.record.range_index()))
        .collect();
    assert_eq!(latest, vec![(11, 1), (12, 0)]);
}

#[test]
fn test_repeated_predict_runs_keep_one_prediction_per_sample() {
    let p = pipeline(BOTH, ScriptedPredictor::new(1.0, Some(0.9)));
    let model = enabled_model(&p);
    model.predict().unwrap();
    model.predict().unwrap();
    assert_eq!(p.repository.prediction_count(), 4);
    assert_eq!(model.predictions(RUNNING_CONTEXT).unwrap().len(), 2);
}
