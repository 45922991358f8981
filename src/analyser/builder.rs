//! Analyser → calculables → time splitting → dataset pipeline.

use super::Analyser;
use crate::analysable::Analysable;
use crate::calculable::{Calculations, SampleSet};
use crate::dataset::{ArtifactHandle, DatasetKey, DatasetManager, DatasetTable, SAMPLE_ID_COLUMN};
use crate::indicator::Indicator;
use crate::target::Target;
use crate::time_splitting::{Range, TimeSplitting, UniqueSampleId};
use crate::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Variable name of the time splitting id in dataset metadata.
pub const TIME_SPLITTING_VAR: &str = "time_splitting";

/// What to build.
#[derive(Clone, Copy)]
pub struct DatasetRequest<'a> {
    /// Model id
    pub model_id: u64,
    /// Target providing the label column
    pub target: &'a dyn Target,
    /// Indicators, in column order
    pub indicators: &'a [Arc<dyn Indicator>],
    /// Time splittings to build datasets for
    pub time_splittings: &'a [Arc<dyn TimeSplitting>],
    /// Evaluation run (fixed file names, always overwritten)
    pub evaluation: bool,
}

/// Merged datasets by time splitting id plus diagnostics.
#[derive(Debug, Clone, Default)]
pub struct DatasetOutcome {
    /// One merged artifact per time splitting that produced rows
    pub datasets: BTreeMap<String, ArtifactHandle>,
    /// Why analysables or time splittings were skipped
    pub logs: Vec<String>,
}

type Row = (UniqueSampleId, Vec<String>);

/// Builds labelled and unlabelled datasets.
pub struct DatasetBuilder {
    analyser: Arc<dyn Analyser>,
    manager: Arc<DatasetManager>,
}

impl DatasetBuilder {
    /// Create a builder.
    #[must_use]
    pub fn new(analyser: Arc<dyn Analyser>, manager: Arc<DatasetManager>) -> Self {
        Self { analyser, manager }
    }

    /// Datasets with the target as last column, from finished analysables.
    ///
    /// # Errors
    /// Propagates collaborator failures and contract violations
    pub fn labelled(&self, request: &DatasetRequest<'_>) -> Result<DatasetOutcome> {
        self.build(request, true)
    }

    /// Datasets to predict on, from ranges that already ended.
    ///
    /// # Errors
    /// Propagates collaborator failures and contract violations
    pub fn unlabelled(&self, request: &DatasetRequest<'_>) -> Result<DatasetOutcome> {
        self.build(request, false)
    }

    fn build(&self, request: &DatasetRequest<'_>, labelled: bool) -> Result<DatasetOutcome> {
        let mut outcome = DatasetOutcome::default();
        let mut per_splitting: BTreeMap<String, Vec<ArtifactHandle>> = BTreeMap::new();

        let analysables = self.analyser.analysables()?;
        // Every table of one build carries the same variables so they merge.
        let metadata_vars: Vec<String> = analysables
            .iter()
            .flat_map(|analysable| analysable.metadata().into_iter().map(|(name, _)| name))
            .filter(|name| name != TIME_SPLITTING_VAR)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        for analysable in analysables {
            let stored = self.process_analysable(
                analysable.as_ref(),
                request,
                labelled,
                &metadata_vars,
                &mut outcome.logs,
            )?;
            for (time_splitting, handle) in stored {
                per_splitting.entry(time_splitting).or_default().push(handle);
            }
        }

        for (time_splitting, handles) in per_splitting {
            let merged = self.manager.merge(
                &handles,
                request.model_id,
                &time_splitting,
                labelled,
                request.evaluation,
            )?;
            outcome.datasets.insert(time_splitting, merged);
        }

        tracing::info!(
            model_id = request.model_id,
            labelled,
            datasets = outcome.datasets.len(),
            skipped = outcome.logs.len(),
            "Datasets built"
        );
        Ok(outcome)
    }

    fn process_analysable(
        &self,
        analysable: &dyn Analysable,
        request: &DatasetRequest<'_>,
        labelled: bool,
        metadata_vars: &[String],
        logs: &mut Vec<String>,
    ) -> Result<Vec<(String, ArtifactHandle)>> {
        let id = analysable.id();
        if !request.target.is_valid_analysable(analysable, labelled)? {
            logs.push(format!("Analysable {id}: not valid for target {}", request.target.id()));
            return Ok(Vec::new());
        }

        let samples = self.analyser.enumerate_samples(analysable)?;
        if samples.is_empty() {
            logs.push(format!("Analysable {id}: no samples"));
            return Ok(Vec::new());
        }

        let mut stored = Vec::new();
        for time_splitting in request.time_splittings {
            let ts = time_splitting.id();
            if !time_splitting.is_valid_analysable(analysable, labelled)? {
                logs.push(format!("Analysable {id}: not valid for time splitting {ts}"));
                continue;
            }

            let key = DatasetKey::new(request.model_id, id, ts, labelled, request.evaluation);
            let _lock = self.manager.init_process(&key)?;

            let table = calculate_table(
                analysable,
                &samples,
                time_splitting.as_ref(),
                request,
                labelled,
                metadata_vars,
            )?;
            if table.is_empty() {
                logs.push(format!("Analysable {id}: no rows for time splitting {ts}"));
                continue;
            }
            tracing::debug!(analysable_id = id, time_splitting = ts, rows = table.row_count(), "Dataset calculated");
            stored.push((ts.to_string(), self.manager.store(&key, &table)?));
        }
        Ok(stored)
    }
}

fn calculate_table(
    analysable: &dyn Analysable,
    samples: &SampleSet,
    time_splitting: &dyn TimeSplitting,
    request: &DatasetRequest<'_>,
    labelled: bool,
    metadata_vars: &[String],
) -> Result<DatasetTable> {
    let metadata: BTreeMap<String, String> = analysable.metadata().into_iter().collect();
    let mut var_names = vec![TIME_SPLITTING_VAR.to_string()];
    let mut var_values = vec![time_splitting.id().to_string()];
    for name in metadata_vars {
        var_values.push(metadata.get(name).cloned().unwrap_or_default());
        var_names.push(name.clone());
    }

    let mut columns = vec![SAMPLE_ID_COLUMN.to_string()];
    columns.extend(request.indicators.iter().flat_map(|indicator| indicator.feature_headers()));
    if labelled {
        columns.push(request.target.id().to_string());
    }

    let labels = if labelled {
        Some(request.target.calculate_validated(samples, analysable, None)?)
    } else {
        None
    };

    let now = analysable.now();
    let ranges: Vec<(usize, Range)> = time_splitting
        .ranges(analysable)?
        .into_iter()
        .enumerate()
        .filter(|(_, range)| range.is_valid() && (labelled || range.end <= now))
        .collect();

    let compute = |(index, range): &(usize, Range)| {
        range_rows(analysable, samples, request.indicators, *index, range, labels.as_ref())
    };
    #[cfg(feature = "rayon")]
    let per_range: Vec<Vec<Row>> = ranges.par_iter().map(compute).collect::<Result<_>>()?;
    #[cfg(not(feature = "rayon"))]
    let per_range: Vec<Vec<Row>> = ranges.iter().map(compute).collect::<Result<_>>()?;

    let mut rows: Vec<Row> = per_range.into_iter().flatten().collect();
    rows.sort_by_key(|(id, _)| *id);

    let mut table = DatasetTable::new(var_names, var_values, columns);
    for (id, values) in rows {
        let mut row = Vec::with_capacity(values.len() + 1);
        row.push(id.to_string());
        row.extend(values);
        table.push_row(row)?;
    }
    Ok(table)
}

/// Feature rows of one range. Samples without a label, or without any
/// indicator value, produce no row.
fn range_rows(
    analysable: &dyn Analysable,
    samples: &SampleSet,
    indicators: &[Arc<dyn Indicator>],
    range_index: usize,
    range: &Range,
    labels: Option<&Calculations>,
) -> Result<Vec<Row>> {
    let mut calculated = Vec::with_capacity(indicators.len());
    for indicator in indicators {
        let values = indicator.calculate(samples, analysable, Some(range))?;
        let features = indicator.to_features(&values);
        calculated.push((values, features));
    }

    let mut rows = Vec::new();
    for sample_id in samples.ids() {
        let label = match labels {
            Some(labels) => match labels.get(&sample_id).copied().flatten() {
                Some(label) => Some(label),
                None => continue,
            },
            None => None,
        };
        let any_value = calculated
            .iter()
            .any(|(values, _)| values.get(&sample_id).copied().flatten().is_some());
        if !any_value {
            continue;
        }

        let mut row: Vec<String> = calculated
            .iter()
            .flat_map(|(_, features)| features.get(&sample_id).cloned().unwrap_or_default())
            .map(|value| value.to_string())
            .collect();
        if let Some(label) = label {
            row.push(label.to_string());
        }
        rows.push((UniqueSampleId::new(sample_id, range_index), row));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyser::MemoryAnalyser;
    use crate::analysable::{BoundaryEstimator, BoundarySettings, Course, LogRecord, MemoryActivityStore, WEEK_SECS};
    use crate::calculable::Sample;
    use crate::dataset::{FileArea, MemoryArtifactStore, MemoryLockFactory};
    use crate::indicator::{AnyAccessBeforeStart, ReadActions};
    use crate::target::NoAccessInLastQuarter;
    use crate::time_splitting::{Quarters, SingleRange};
    use std::time::Duration;

    const START: i64 = 1_000_000;
    const END: i64 = START + 8 * WEEK_SECS;

    struct Fixture {
        builder: DatasetBuilder,
        manager: Arc<DatasetManager>,
        target: NoAccessInLastQuarter,
        indicators: Vec<Arc<dyn Indicator>>,
    }

    fn fixture(now: i64) -> Fixture {
        let store = Arc::new(MemoryActivityStore::new());
        for week in 0..8 {
            store.record(LogRecord::new(1, 1, START + week * WEEK_SECS + 10));
        }
        store.record(LogRecord::new(1, 2, START + 10));
        store.record(LogRecord::new(1, 2, START - 10));
        let course = Course::builder(1, BoundaryEstimator::new(store.clone(), BoundarySettings::default()))
            .students([1, 2, 3])
            .start_date(START)
            .end_date(END)
            .now(now)
            .metadata("format", "weeks")
            .build();
        let samples: SampleSet = [Sample::new(1, Some(1), 1), Sample::new(2, Some(2), 1), Sample::new(3, None, 1)]
            .into_iter()
            .collect();
        let analyser = Arc::new(MemoryAnalyser::new().with_analysable(Arc::new(course), samples));
        let manager = Arc::new(DatasetManager::new(
            Arc::new(MemoryArtifactStore::new()),
            Arc::new(MemoryLockFactory::new()),
            Duration::from_millis(10),
        ));
        Fixture {
            builder: DatasetBuilder::new(analyser, manager.clone()),
            manager,
            target: NoAccessInLastQuarter::new(store.clone()),
            indicators: vec![
                Arc::new(AnyAccessBeforeStart::new(store.clone())),
                Arc::new(ReadActions::new(store)),
            ],
        }
    }

    #[test]
    fn test_labelled_dataset_layout() {
        let f = fixture(END + WEEK_SECS);
        let splittings: Vec<Arc<dyn TimeSplitting>> = vec![Arc::new(SingleRange), Arc::new(Quarters)];
        let request = DatasetRequest {
            model_id: 5,
            target: &f.target,
            indicators: &f.indicators,
            time_splittings: &splittings,
            evaluation: true,
        };
        let outcome = f.builder.labelled(&request).unwrap();
        assert_eq!(outcome.datasets.len(), 2);

        let table = f.manager.read_table(&outcome.datasets["quarters"]).unwrap();
        assert_eq!(table.var_names, vec!["time_splitting", "format"]);
        assert_eq!(table.var_values, vec!["quarters", "weeks"]);
        assert_eq!(
            table.columns,
            vec![
                "sampleid",
                "any_access_before_start",
                "read_actions",
                "read_actions/mean",
                "no_access_in_last_quarter"
            ]
        );
        // Sample 3 has no participant so no label: 2 samples x 2 ranges.
        let ids: Vec<&str> = table.rows.iter().map(|row| row[0].as_str()).collect();
        assert_eq!(ids, vec!["1-0", "1-1", "2-0", "2-1"]);
        // Participant 1 was active in the last quarter, participant 2 was not.
        assert_eq!(table.rows[0][4], "0");
        assert_eq!(table.rows[2][4], "1");
        assert_eq!(table.rows[2][1], "1");
    }

    #[test]
    fn test_unlabelled_only_uses_finished_ranges() {
        // Course running: third quarter done, fourth still in progress.
        let now = START + 7 * WEEK_SECS;
        let f = fixture(now);
        let splittings: Vec<Arc<dyn TimeSplitting>> = vec![Arc::new(Quarters)];
        let request = DatasetRequest {
            model_id: 5,
            target: &f.target,
            indicators: &f.indicators,
            time_splittings: &splittings,
            evaluation: false,
        };
        let outcome = f.builder.unlabelled(&request).unwrap();
        let handle = &outcome.datasets["quarters"];
        assert_eq!(handle.area(), FileArea::Unlabelled);

        let features = f.manager.read_unlabelled(handle).unwrap();
        // Only the third quarter has ended; sample 3 has no indicator values.
        let ids: Vec<String> = features.keys().cloned().collect();
        assert_eq!(ids, vec!["1-0", "2-0"]);
        assert!(!features["1-0"].contains_key("no_access_in_last_quarter"));
        assert_eq!(features["2-0"]["any_access_before_start"], "1");
    }

    #[test]
    fn test_finished_course_is_skipped_for_prediction() {
        let f = fixture(END + WEEK_SECS);
        let splittings: Vec<Arc<dyn TimeSplitting>> = vec![Arc::new(Quarters)];
        let request = DatasetRequest {
            model_id: 5,
            target: &f.target,
            indicators: &f.indicators,
            time_splittings: &splittings,
            evaluation: false,
        };
        let outcome = f.builder.unlabelled(&request).unwrap();
        assert!(outcome.datasets.is_empty());
        assert_eq!(outcome.logs.len(), 1);
        assert!(outcome.logs[0].contains("not valid for target"));
    }

    #[test]
    fn test_running_course_is_skipped_for_training() {
        let f = fixture(START + WEEK_SECS);
        let splittings: Vec<Arc<dyn TimeSplitting>> = vec![Arc::new(SingleRange)];
        let request = DatasetRequest {
            model_id: 5,
            target: &f.target,
            indicators: &f.indicators,
            time_splittings: &splittings,
            evaluation: false,
        };
        let outcome = f.builder.labelled(&request).unwrap();
        assert!(outcome.datasets.is_empty());
        assert!(!outcome.logs.is_empty());
    }

    #[test]
    fn test_courses_with_different_metadata_merge() {
        let store = Arc::new(MemoryActivityStore::new());
        for course_id in [1, 3] {
            for week in 0..8 {
                store.record(LogRecord::new(course_id, 1, START + week * WEEK_SECS + 10));
            }
        }
        let course = |id: u64| {
            Course::builder(id, BoundaryEstimator::new(store.clone(), BoundarySettings::default()))
                .students([1])
                .start_date(START)
                .end_date(END)
                .now(END + WEEK_SECS)
        };
        let samples = |context: u64| -> SampleSet { [Sample::new(1, Some(1), context)].into_iter().collect() };
        let analyser = MemoryAnalyser::new()
            .with_analysable(Arc::new(course(1).metadata("format", "weeks").build()), samples(1))
            .with_analysable(Arc::new(course(3).build()), samples(3));
        let manager = Arc::new(DatasetManager::new(
            Arc::new(MemoryArtifactStore::new()),
            Arc::new(MemoryLockFactory::new()),
            Duration::from_millis(10),
        ));
        let builder = DatasetBuilder::new(Arc::new(analyser), manager.clone());
        let target = NoAccessInLastQuarter::new(store.clone());
        let indicators: Vec<Arc<dyn Indicator>> = vec![Arc::new(ReadActions::new(store))];
        let splittings: Vec<Arc<dyn TimeSplitting>> = vec![Arc::new(SingleRange)];
        let request = DatasetRequest {
            model_id: 5,
            target: &target,
            indicators: &indicators,
            time_splittings: &splittings,
            evaluation: true,
        };

        let outcome = builder.labelled(&request).unwrap();
        let table = manager.read_table(&outcome.datasets["single_range"]).unwrap();
        assert_eq!(table.var_names, vec!["time_splitting", "format"]);
        assert_eq!(table.var_values, vec!["single_range", "weeks"]);
        assert_eq!(table.row_count(), 2);
    }
}
