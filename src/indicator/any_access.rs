//! Binary indicators on access outside the analysable boundaries.

use crate::analysable::{ActivityStore, Analysable, TimeWindow, MAX_TIME};
use crate::calculable::{Calculable, Sample, ValueDomain};
use crate::indicator::{FeatureEncoding, Indicator};
use crate::time_splitting::Range;
use crate::Result;
use std::sync::Arc;

fn flag(count: u64) -> Option<f64> {
    Some(if count > 0 { 1.0 } else { 0.0 })
}

/// 1 when the participant accessed the analysable before it started.
pub struct AnyAccessBeforeStart {
    store: Arc<dyn ActivityStore>,
    domain: ValueDomain,
}

impl AnyAccessBeforeStart {
    /// Indicator id.
    pub const ID: &'static str = "any_access_before_start";

    /// Create the indicator over an activity store.
    #[must_use]
    pub fn new(store: Arc<dyn ActivityStore>) -> Self {
        Self {
            store,
            domain: ValueDomain::binary(),
        }
    }
}

impl Calculable for AnyAccessBeforeStart {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "Any access before start"
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
        let start = analysable.start()?;
        if start == 0 {
            return Ok(None);
        }
        let count = self
            .store
            .count_logs(analysable.id(), &[participant], TimeWindow::until(start - 1))?;
        Ok(flag(count))
    }
}

impl Indicator for AnyAccessBeforeStart {
    fn encoding(&self) -> FeatureEncoding {
        FeatureEncoding::Binary
    }
}

/// 1 when the participant accessed the analysable after it finished.
pub struct AnyAccessAfterEnd {
    store: Arc<dyn ActivityStore>,
    domain: ValueDomain,
}

impl AnyAccessAfterEnd {
    /// Indicator id.
    pub const ID: &'static str = "any_access_after_end";

    /// Create the indicator over an activity store.
    #[must_use]
    pub fn new(store: Arc<dyn ActivityStore>) -> Self {
        Self {
            store,
            domain: ValueDomain::binary(),
        }
    }
}

impl Calculable for AnyAccessAfterEnd {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "Any access after end"
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
        let end = analysable.end()?;
        if end == 0 || end == MAX_TIME {
            return Ok(None);
        }
        let count = self
            .store
            .count_logs(analysable.id(), &[participant], TimeWindow::since(end + 1))?;
        Ok(flag(count))
    }
}

impl Indicator for AnyAccessAfterEnd {
    fn encoding(&self) -> FeatureEncoding {
        FeatureEncoding::Binary
    }
}
