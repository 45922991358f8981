//! Shared fixtures: two courses, an in-memory repository and a scripted predictor.

#![allow(dead_code)]

use analytics_pipeline::analysable::{
    BoundaryEstimator, BoundarySettings, Course, LogRecord, MemoryActivityStore, WEEK_SECS,
};
use analytics_pipeline::analyser::MemoryAnalyser;
use analytics_pipeline::calculable::{Sample, SampleSet};
use analytics_pipeline::config::{ModelConfig, PipelineConfig};
use analytics_pipeline::dataset::{DatasetManager, MemoryArtifactStore, MemoryLockFactory};
use analytics_pipeline::model::{MemoryModelRepository, ModelServices, ScriptedPredictor};
use analytics_pipeline::registry::{FactoryContext, Registry};
use analytics_pipeline::target::MemoryNotifier;
use std::sync::Arc;
use tempfile::TempDir;

pub const START: i64 = 1_600_000_000;
pub const END: i64 = START + 8 * WEEK_SECS;

/// Finished course, used for training and evaluation.
pub const FINISHED_COURSE: u64 = 1;
pub const FINISHED_CONTEXT: u64 = 100;

/// Running course in its seventh week, used for prediction.
pub const RUNNING_COURSE: u64 = 2;
pub const RUNNING_CONTEXT: u64 = 200;

pub struct Pipeline {
    pub store: Arc<MemoryActivityStore>,
    pub repository: Arc<MemoryModelRepository>,
    pub predictor: Arc<ScriptedPredictor>,
    pub notifier: Arc<MemoryNotifier>,
    pub artifacts: Arc<MemoryArtifactStore>,
    pub services: Arc<ModelServices>,
    pub output: TempDir,
}

#[derive(Clone, Copy)]
pub struct Courses {
    pub finished: bool,
    pub running: bool,
}

pub const BOTH: Courses = Courses {
    finished: true,
    running: true,
};

pub fn activity() -> Arc<MemoryActivityStore> {
    let store = Arc::new(MemoryActivityStore::new());
    // Finished course: student 1 active every week, student 2 only at the start.
    for week in 0..8 {
        store.record(LogRecord::new(FINISHED_COURSE, 1, START + week * WEEK_SECS + 60));
    }
    store.record(LogRecord::new(FINISHED_COURSE, 2, START + 60));
    store.record(LogRecord::new(FINISHED_COURSE, 2, START - 60));

    // Running course: student 11 active so far, student 12 gone after day one.
    for week in 0..7 {
        store.record(LogRecord::new(RUNNING_COURSE, 11, START + week * WEEK_SECS + 60));
    }
    store.record(LogRecord::new(RUNNING_COURSE, 12, START + 60));
    store
}

pub fn analyser(store: &Arc<MemoryActivityStore>, courses: Courses) -> MemoryAnalyser {
    let estimator = || BoundaryEstimator::new(store.clone(), BoundarySettings::default());
    let mut analyser = MemoryAnalyser::new();
    if courses.finished {
        let course = Course::builder(FINISHED_COURSE, estimator())
            .context_id(FINISHED_CONTEXT)
            .students([1, 2])
            .start_date(START)
            .end_date(END)
            .now(END + 2 * WEEK_SECS)
            .metadata("format", "weeks")
            .build();
        let samples: SampleSet = [
            Sample::new(1, Some(1), FINISHED_CONTEXT),
            Sample::new(2, Some(2), FINISHED_CONTEXT),
        ]
        .into_iter()
        .collect();
        analyser = analyser.with_analysable(Arc::new(course), samples);
    }
    if courses.running {
        let course = Course::builder(RUNNING_COURSE, estimator())
            .context_id(RUNNING_CONTEXT)
            .students([11, 12])
            .start_date(START)
            .end_date(END)
            .now(START + 7 * WEEK_SECS)
            .metadata("format", "topics")
            .build();
        let samples: SampleSet = [
            Sample::new(11, Some(11), RUNNING_CONTEXT).with_data("user", serde_json::json!({"name": "Ada"})),
            Sample::new(12, Some(12), RUNNING_CONTEXT).with_data("user", serde_json::json!({"name": "Bob"})),
        ]
        .into_iter()
        .collect();
        analyser = analyser.with_analysable(Arc::new(course), samples);
    }
    analyser
}

pub fn pipeline(courses: Courses, predictor: ScriptedPredictor) -> Pipeline {
    let store = activity();
    pipeline_with(analyser(&store, courses), store, predictor)
}

pub fn pipeline_with(analyser: MemoryAnalyser, store: Arc<MemoryActivityStore>, predictor: ScriptedPredictor) -> Pipeline {
    let output = TempDir::new().unwrap();
    let config = PipelineConfig {
        output_dir: output.path().to_path_buf(),
        lock_timeout_secs: 1,
        ..PipelineConfig::default()
    };
    let registry = Registry::with_defaults(FactoryContext::new(store.clone(), config.clone())).unwrap();
    let artifacts = Arc::new(MemoryArtifactStore::new());
    let repository = Arc::new(MemoryModelRepository::new());
    let predictor = Arc::new(predictor);
    let notifier = Arc::new(MemoryNotifier::new());
    let services = Arc::new(ModelServices {
        registry: Arc::new(registry),
        analyser: Arc::new(analyser),
        datasets: Arc::new(DatasetManager::from_config(
            artifacts.clone(),
            Arc::new(MemoryLockFactory::new()),
            &config,
        )),
        repository: repository.clone(),
        predictor: predictor.clone(),
        notifier: notifier.clone(),
        site_id: "test-site".to_string(),
    });
    Pipeline {
        store,
        repository,
        predictor,
        notifier,
        artifacts,
        services,
        output,
    }
}

pub fn dropout_model(time_splitting: Option<&str>) -> ModelConfig {
    ModelConfig {
        target: "no_access_in_last_quarter".to_string(),
        indicators: vec!["read_actions".to_string(), "any_access_before_start".to_string()],
        time_splitting: time_splitting.map(ToString::to_string),
    }
}
