//! Binary dropout target: no activity during the last quarter.

use crate::analysable::{ActivityStore, Analysable, TimeWindow, MAX_TIME};
use crate::calculable::{Calculable, Sample, ValueDomain};
use crate::target::{Target, DEFAULT_MIN_PREDICTION_SCORE};
use crate::time_splitting::Range;
use crate::Result;
use std::sync::Arc;

const IGNORED: [f64; 1] = [0.0];

/// 1 when the participant has no activity in the last quarter of the
/// analysable, 0 otherwise. Only class 1 triggers callbacks.
pub struct NoAccessInLastQuarter {
    store: Arc<dyn ActivityStore>,
    domain: ValueDomain,
    min_score: f64,
}

impl NoAccessInLastQuarter {
    /// Target id.
    pub const ID: &'static str = "no_access_in_last_quarter";

    /// Create the target over an activity store.
    #[must_use]
    pub fn new(store: Arc<dyn ActivityStore>) -> Self {
        Self {
            store,
            domain: ValueDomain::binary(),
            min_score: DEFAULT_MIN_PREDICTION_SCORE,
        }
    }

    /// Override the confidence floor.
    #[must_use]
    pub const fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }
}

impl Calculable for NoAccessInLastQuarter {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "No access in last quarter"
    }

    fn domain(&self) -> &ValueDomain {
        &self.domain
    }

    fn calculate_sample(
        &self,
        sample: &Sample,
        analysable: &dyn Analysable,
        _range: Option<&Range>,
    ) -> Result<Option<f64>> {
        let Some(participant) = sample.participant_id else {
            return Ok(None);
        };
        let (start, end) = (analysable.start()?, analysable.end()?);
        if start == 0 || end == 0 || end == MAX_TIME || end <= start {
            return Ok(None);
        }
        let quarter_start = end - (end - start).div_euclid(4);
        let logs = self
            .store
            .count_logs(analysable.id(), &[participant], TimeWindow::between(quarter_start, end))?;
        Ok(Some(if logs == 0 { 1.0 } else { 0.0 }))
    }
}

impl Target for NoAccessInLastQuarter {
    fn min_prediction_score(&self) -> f64 {
        self.min_score
    }

    fn ignored_classes(&self) -> &[f64] {
        &IGNORED
    }

    fn is_valid_analysable(&self, analysable: &dyn Analysable, for_training: bool) -> Result<bool> {
        if for_training {
            return analysable.is_finished();
        }
        // Predictions only make sense while there is still time to act.
        Ok(analysable.was_started()? && !analysable.is_finished()?)
    }

    fn display_value(&self, value: f64) -> String {
        if self.is_ignored(value) {
            "Not at risk".to_string()
        } else {
            "At risk of dropping out".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysable::{BoundaryEstimator, BoundarySettings, Course, LogRecord, MemoryActivityStore};
    use crate::calculable::SampleSet;

    fn course(store: &Arc<MemoryActivityStore>, now: i64) -> Course {
        Course::builder(4, BoundaryEstimator::new(store.clone(), BoundarySettings::default()))
            .students([1, 2])
            .start_date(0)
            .end_date(400)
            .now(now)
            .build()
    }

    #[test]
    fn test_label_is_one_without_late_activity() {
        let store = Arc::new(MemoryActivityStore::new());
        store.extend([LogRecord::new(4, 1, 50), LogRecord::new(4, 2, 50), LogRecord::new(4, 2, 350)]);
        // Explicit start 0 counts as unknown, use a course starting at 1.
        let course = Course::builder(4, BoundaryEstimator::new(store.clone(), BoundarySettings::default()))
            .students([1, 2])
            .start_date(1)
            .end_date(401)
            .now(500)
            .build();
        let target = NoAccessInLastQuarter::new(store);
        let samples: SampleSet = [Sample::new(1, Some(1), 4), Sample::new(2, Some(2), 4)].into_iter().collect();
        let labels = target.calculate_validated(&samples, &course, None).unwrap();
        assert_eq!(labels[&1], Some(1.0));
        assert_eq!(labels[&2], Some(0.0));
    }

    #[test]
    fn test_unknown_start_gives_no_label() {
        let store = Arc::new(MemoryActivityStore::new());
        let target = NoAccessInLastQuarter::new(store.clone());
        let sample = Sample::new(1, Some(1), 4);
        assert_eq!(target.calculate_sample(&sample, &course(&store, 500), None).unwrap(), None);
    }

    #[test]
    fn test_validity_for_training_and_prediction() {
        let store = Arc::new(MemoryActivityStore::new());
        let target = NoAccessInLastQuarter::new(store.clone());
        let running = Course::builder(4, BoundaryEstimator::new(store.clone(), BoundarySettings::default()))
            .students([1])
            .start_date(100)
            .end_date(400)
            .now(200)
            .build();
        assert!(!target.is_valid_analysable(&running, true).unwrap());
        assert!(target.is_valid_analysable(&running, false).unwrap());

        let finished = Course::builder(4, BoundaryEstimator::new(store, BoundarySettings::default()))
            .students([1])
            .start_date(100)
            .end_date(400)
            .now(500)
            .build();
        assert!(target.is_valid_analysable(&finished, true).unwrap());
        assert!(!target.is_valid_analysable(&finished, false).unwrap());
    }

    #[test]
    fn test_only_dropouts_trigger_callbacks() {
        let target = NoAccessInLastQuarter::new(Arc::new(MemoryActivityStore::new())).with_min_score(0.8);
        assert!(target.triggers_callback(1.0, 0.9));
        assert!(!target.triggers_callback(1.0, 0.7));
        assert!(!target.triggers_callback(0.0, 1.0));
        assert_eq!(target.display_value(1.0), "At risk of dropping out");
    }
}
