//! Stored predictions and their presentation view

use crate::calculable::{Sample, SampleId};
use crate::dataset::FeatureMap;
use crate::indicator::MEAN_SUFFIX;
use crate::registry::Registry;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pseudo-feature carrying the range position, never shown as a calculation.
pub const RANGE_FEATURE: &str = "range";

/// An immutable prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    id: u64,
    model_id: u64,
    context_id: u64,
    sample_id: SampleId,
    range_index: usize,
    prediction: f64,
    score: f64,
    calculations: String,
    created_at: DateTime<Utc>,
}

impl PredictionRecord {
    /// Create a prediction, snapshotting the features it was made from.
    ///
    /// # Errors
    /// Returns `Error::Serde` if the features can not be serialized
    pub fn new(
        model_id: u64,
        context_id: u64,
        sample_id: SampleId,
        range_index: usize,
        prediction: f64,
        score: f64,
        features: &FeatureMap,
    ) -> Result<Self> {
        Ok(Self {
            id: 0,
            model_id,
            context_id,
            sample_id,
            range_index,
            prediction,
            score,
            calculations: serde_json::to_string(features)?,
            created_at: Utc::now(),
        })
    }

    /// Return the record with a repository-assigned id.
    #[must_use]
    pub const fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// Get the prediction id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Get the model id.
    #[must_use]
    pub const fn model_id(&self) -> u64 {
        self.model_id
    }

    /// Get the context id.
    #[must_use]
    pub const fn context_id(&self) -> u64 {
        self.context_id
    }

    /// Get the sample id.
    #[must_use]
    pub const fn sample_id(&self) -> SampleId {
        self.sample_id
    }

    /// Get the range index.
    #[must_use]
    pub const fn range_index(&self) -> usize {
        self.range_index
    }

    /// Get the predicted value.
    #[must_use]
    pub const fn prediction(&self) -> f64 {
        self.prediction
    }

    /// Get the prediction score.
    #[must_use]
    pub const fn score(&self) -> f64 {
        self.score
    }

    /// Get the serialized feature snapshot.
    #[must_use]
    pub fn calculations(&self) -> &str {
        &self.calculations
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// One feature of a prediction's snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationDetail {
    /// Dataset column name
    pub feature: String,
    /// Indicator that produced it
    pub indicator: String,
    /// Sub-feature such as `mean`
    pub subtype: Option<String>,
    /// Stored value
    pub value: String,
}

/// A prediction with its sample and parsed calculations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Stored prediction
    pub record: PredictionRecord,
    /// Sample as the analyser currently knows it
    pub sample: Sample,
    /// Features the prediction was made from
    pub calculations: Vec<CalculationDetail>,
}

impl Prediction {
    /// Build the view, checking every feature belongs to a known indicator.
    ///
    /// # Errors
    /// Returns `Error::Serde` for a corrupt snapshot and `Error::Config` for
    /// features of unknown indicators
    pub fn new(record: PredictionRecord, sample: Sample, registry: &Registry) -> Result<Self> {
        let features: FeatureMap = serde_json::from_str(record.calculations())?;
        let calculations = features
            .into_iter()
            .filter(|(feature, _)| feature != RANGE_FEATURE)
            .map(|(feature, value)| {
                let (indicator, subtype) = match feature.split_once('/') {
                    Some((indicator, subtype)) => (indicator.to_string(), Some(subtype.to_string())),
                    None => (feature.clone(), None),
                };
                if !registry.has_indicator(&indicator) {
                    return Err(Error::config(format!(
                        "prediction {} refers to unknown indicator {indicator:?}",
                        record.id()
                    )));
                }
                Ok(CalculationDetail {
                    feature,
                    indicator,
                    subtype,
                    value,
                })
            })
            .collect::<Result<_>>()?;
        Ok(Self {
            record,
            sample,
            calculations,
        })
    }

    /// Calculations without batch averages.
    pub fn own_calculations(&self) -> impl Iterator<Item = &CalculationDetail> {
        self.calculations
            .iter()
            .filter(|detail| detail.subtype.as_deref() != Some(MEAN_SUFFIX))
    }
}
