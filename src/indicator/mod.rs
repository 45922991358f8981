//! Indicators: calculables that produce input features
//!
//! An indicator's calculated value becomes one or two dataset columns:
//!
//! ```text
//! Binary                    <id>
//! Linear                    <id>
//! Linear + averages         <id>  <id>/mean
//! ```
//!
//! The `/mean` column is the arithmetic mean of the indicator over the
//! samples calculated together in one batch, so its value depends on which
//! samples happen to share the batch.

mod any_access;
mod read_actions;

pub use any_access::{AnyAccessAfterEnd, AnyAccessBeforeStart};
pub use read_actions::ReadActions;

use crate::calculable::{Calculable, Calculations, SampleId};
use std::collections::BTreeMap;

/// Feature value written for samples an indicator does not apply to.
pub const NO_DATA: f64 = 0.0;

/// Suffix of the batch-mean feature column.
pub const MEAN_SUFFIX: &str = "mean";

/// How calculated values turn into feature columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureEncoding {
    /// One column with the raw class value
    Binary,
    /// The value, plus the batch mean when `include_averages` is set
    Linear {
        /// Add a `<id>/mean` column
        include_averages: bool,
    },
}

impl FeatureEncoding {
    /// Number of columns produced per sample.
    #[must_use]
    pub const fn feature_count(self) -> usize {
        match self {
            Self::Binary | Self::Linear { include_averages: false } => 1,
            Self::Linear { include_averages: true } => 2,
        }
    }
}

/// Feature values per sample, in header order.
pub type FeatureRows = BTreeMap<SampleId, Vec<f64>>;

/// A calculable contributing input features.
pub trait Indicator: Calculable {
    /// Feature encoding.
    fn encoding(&self) -> FeatureEncoding;

    /// Column names, matching [`Indicator::to_features`] order.
    fn feature_headers(&self) -> Vec<String> {
        feature_headers(self.id(), self.encoding())
    }

    /// Turn a batch of calculations into feature rows.
    fn to_features(&self, calculations: &Calculations) -> FeatureRows {
        encode_features(self.encoding(), calculations)
    }
}

/// Column names for an indicator id.
#[must_use]
pub fn feature_headers(id: &str, encoding: FeatureEncoding) -> Vec<String> {
    match encoding {
        FeatureEncoding::Linear { include_averages: true } => {
            vec![id.to_string(), format!("{id}/{MEAN_SUFFIX}")]
        }
        FeatureEncoding::Binary | FeatureEncoding::Linear { .. } => vec![id.to_string()],
    }
}

/// Encode a batch. `None` values become [`NO_DATA`] and do not count
/// toward the mean.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn encode_features(encoding: FeatureEncoding, calculations: &Calculations) -> FeatureRows {
    let value = |calculated: &Option<f64>| calculated.unwrap_or(NO_DATA);
    match encoding {
        FeatureEncoding::Binary | FeatureEncoding::Linear { include_averages: false } => calculations
            .iter()
            .map(|(id, calculated)| (*id, vec![value(calculated)]))
            .collect(),
        FeatureEncoding::Linear { include_averages: true } => {
            let present: Vec<f64> = calculations.values().filter_map(|v| *v).collect();
            let mean = if present.is_empty() {
                NO_DATA
            } else {
                present.iter().sum::<f64>() / present.len() as f64
            };
            calculations
                .iter()
                .map(|(id, calculated)| (*id, vec![value(calculated), mean]))
                .collect()
        }
    }
}
