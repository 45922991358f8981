//! Linear engagement target on `[-1, 1]`.

use crate::analysable::{ActivityStore, Analysable, TimeWindow, MAX_TIME};
use crate::calculable::{clamp, Calculable, Sample, ValueDomain};
use crate::target::{Target, DEFAULT_MIN_PREDICTION_SCORE};
use crate::time_splitting::Range;
use crate::Result;
use std::sync::Arc;

/// Weekly activity rate that counts as fully engaged.
const ENGAGED_PER_WEEK: f64 = 10.0;

/// Weekly log rate over the whole analysable, scaled so that no activity is
/// -1 and [`ENGAGED_PER_WEEK`] or more is 1.
pub struct EngagementLevel {
    store: Arc<dyn ActivityStore>,
    domain: ValueDomain,
    min_score: f64,
}

impl EngagementLevel {
    /// Target id.
    pub const ID: &'static str = "engagement_level";

    /// Create the target over an activity store.
    #[must_use]
    pub fn new(store: Arc<dyn ActivityStore>) -> Self {
        Self {
            store,
            domain: ValueDomain::linear(-1.0, 1.0),
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

impl Calculable for EngagementLevel {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "Engagement level"
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
        let weeks = Range::new(start, end).weeks()?;
        let logs = self
            .store
            .count_logs(analysable.id(), &[participant], TimeWindow::between(start, end))?;
        #[allow(clippy::cast_precision_loss)]
        let rate = logs as f64 / weeks;
        Ok(Some(clamp(rate / ENGAGED_PER_WEEK * 2.0 - 1.0, &self.domain)))
    }
}

impl Target for EngagementLevel {
    fn min_prediction_score(&self) -> f64 {
        self.min_score
    }
}
