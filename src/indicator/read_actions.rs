//! Weekly activity rate of a participant, classified onto `[-1, 1]`.

use crate::analysable::{ActivityStore, Analysable, TimeWindow, MAX_TIME};
use crate::calculable::{classify_value, Calculable, Predicate, RangeRule, Sample, ValueDomain};
use crate::indicator::{FeatureEncoding, Indicator};
use crate::time_splitting::Range;
use crate::Result;
use std::sync::Arc;

/// Logs per week, bucketed as `< 1`, `< 5`, `< 10`, `>= 10`.
pub struct ReadActions {
    store: Arc<dyn ActivityStore>,
    domain: ValueDomain,
    ranges: Vec<RangeRule>,
    include_averages: bool,
}

impl ReadActions {
    /// Indicator id.
    pub const ID: &'static str = "read_actions";

    /// Create the indicator with the batch mean column enabled.
    #[must_use]
    pub fn new(store: Arc<dyn ActivityStore>) -> Self {
        Self {
            store,
            domain: ValueDomain::linear(-1.0, 1.0),
            ranges: vec![
                RangeRule::new(Predicate::Lt, 1.0),
                RangeRule::new(Predicate::Lt, 5.0),
                RangeRule::new(Predicate::Lt, 10.0),
                RangeRule::new(Predicate::Ge, 10.0),
            ],
            include_averages: true,
        }
    }

    /// Toggle the `/mean` column.
    #[must_use]
    pub const fn with_averages(mut self, include_averages: bool) -> Self {
        self.include_averages = include_averages;
        self
    }

    fn window(analysable: &dyn Analysable, range: Option<&Range>) -> Result<Option<Range>> {
        if let Some(range) = range {
            return Ok(Some(*range));
        }
        let start = analysable.start()?;
        let end = match analysable.end()? {
            MAX_TIME => analysable.now(),
            end => end,
        };
        if start == 0 || end == 0 {
            return Ok(None);
        }
        Ok(Some(Range::new(start, end)))
    }
}

impl Calculable for ReadActions {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "Read actions per week"
    }

    fn domain(&self) -> &ValueDomain {
        &self.domain
    }

    fn calculate_sample(
        &self,
        sample: &Sample,
        analysable: &dyn Analysable,
        range: Option<&Range>,
    ) -> Result<Option<f64>> {
        let Some(participant) = sample.participant_id else {
            return Ok(None);
        };
        let Some(window) = Self::window(analysable, range)? else {
            return Ok(None);
        };
        let weeks = window.weeks()?;
        let logs = self.store.count_logs(
            analysable.id(),
            &[participant],
            TimeWindow::between(window.start, window.end - 1),
        )?;
        #[allow(clippy::cast_precision_loss)]
        let per_week = logs as f64 / weeks;
        Ok(Some(classify_value(per_week, &self.ranges, &self.domain)?))
    }
}

impl Indicator for ReadActions {
    fn encoding(&self) -> FeatureEncoding {
        FeatureEncoding::Linear {
            include_averages: self.include_averages,
        }
    }
}
