//! Targets: calculables that produce the label to predict
//!
//! A target validates every calculated value against its [`ValueDomain`]
//! before it reaches a dataset, decides which predictions are worth acting
//! on and turns the contexts of those predictions into insights.

mod engagement_level;
mod insight;
mod no_access_in_last_quarter;

pub use engagement_level::EngagementLevel;
pub use insight::{Insight, InsightNotifier, MemoryNotifier};
pub use no_access_in_last_quarter::NoAccessInLastQuarter;

use crate::analysable::Analysable;
use crate::calculable::{Calculable, Calculations, Sample, SampleSet};
use crate::time_splitting::Range;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Confidence floor applied when a target does not set its own.
pub const DEFAULT_MIN_PREDICTION_SCORE: f64 = 0.6;

/// How a predicted value should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueStyle {
    /// Nothing to worry about
    Success,
    /// Needs attention
    Alert,
}

/// A stored prediction handed to [`Target::prediction_callback`].
#[derive(Debug, Clone, Copy)]
pub struct PredictionEvent<'a> {
    /// Model that made the prediction
    pub model_id: u64,
    /// Sample the prediction is about
    pub sample: &'a Sample,
    /// Range the sample was evaluated in
    pub range_index: usize,
    /// Predicted value
    pub prediction: f64,
    /// Prediction confidence
    pub score: f64,
}

/// A calculable providing the label.
pub trait Target: Calculable {
    /// Minimum prediction confidence that triggers callbacks.
    fn min_prediction_score(&self) -> f64 {
        DEFAULT_MIN_PREDICTION_SCORE
    }

    /// Discrete classes that never trigger callbacks.
    fn ignored_classes(&self) -> &[f64] {
        &[]
    }

    /// Whether the analysable can provide samples for this target.
    ///
    /// Training needs a finished analysable so the label is known.
    ///
    /// # Errors
    /// Propagates boundary inference errors
    fn is_valid_analysable(&self, analysable: &dyn Analysable, for_training: bool) -> Result<bool> {
        if for_training {
            return analysable.is_finished();
        }
        Ok(true)
    }

    /// Whether a `(value, score)` prediction is worth acting on.
    fn triggers_callback(&self, predicted: f64, score: f64) -> bool {
        if score < self.min_prediction_score() {
            return false;
        }
        if self.domain().is_linear() {
            return true;
        }
        !self.is_ignored(predicted)
    }

    /// Called once per stored prediction.
    ///
    /// # Errors
    /// Implementations may fail; the error aborts the predict run
    fn prediction_callback(&self, _event: &PredictionEvent<'_>) -> Result<()> {
        Ok(())
    }

    /// Called once per predict run with every context that got a prediction.
    ///
    /// # Errors
    /// Propagates notifier failures
    fn generate_insights(
        &self,
        model_id: u64,
        contexts: &BTreeSet<u64>,
        notifier: &dyn InsightNotifier,
    ) -> Result<()> {
        for context_id in contexts {
            notifier.notify(Insight {
                model_id,
                target: self.id().to_string(),
                context_id: *context_id,
            })?;
        }
        Ok(())
    }

    /// Human readable value.
    fn display_value(&self, value: f64) -> String {
        if self.domain().is_linear() {
            format!("{value:.2}")
        } else {
            format!("{value}")
        }
    }

    /// Linear values in the upper half of the domain and ignored classes are
    /// fine, everything else needs attention.
    fn value_style(&self, value: f64) -> ValueStyle {
        let ok = if self.domain().is_linear() {
            let domain = self.domain();
            value >= domain.min() + (domain.max() - domain.min()) / 2.0
        } else {
            self.is_ignored(value)
        };
        if ok {
            ValueStyle::Success
        } else {
            ValueStyle::Alert
        }
    }

    /// Whether `value` is one of [`Target::ignored_classes`].
    fn is_ignored(&self, value: f64) -> bool {
        self.ignored_classes()
            .iter()
            .any(|class| (class - value).abs() < f64::EPSILON)
    }

    /// Calculate labels and check each one against the domain.
    ///
    /// # Errors
    /// Returns `Error::Contract` for values outside the domain
    fn calculate_validated(
        &self,
        samples: &SampleSet,
        analysable: &dyn Analysable,
        range: Option<&Range>,
    ) -> Result<Calculations> {
        let calculations = self.calculate(samples, analysable, range)?;
        for value in calculations.values().flatten() {
            self.domain().validate(self.id(), *value)?;
        }
        Ok(calculations)
    }
}
