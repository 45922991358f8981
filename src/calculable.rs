//! Calculation contract shared by indicators and targets
//!
//! A calculable turns samples into one scalar each (or `None` when the
//! sample does not apply). Values live in a [`ValueDomain`]:
//!
//! ```text
//! Linear   [min ........................ max]   continuous
//! Discrete {c0, c1, ..., cn}                   fixed class set
//! ```
//!
//! Shared helpers: [`clamp`] and [`classify_value`].

use crate::analysable::{Analysable, ParticipantId};
use crate::error::ContractViolation;
use crate::time_splitting::Range;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sample identifier, stable across analyser calls.
pub type SampleId = u64;

/// Per-sample calculation results, ordered by sample id.
pub type Calculations = BTreeMap<SampleId, Option<f64>>;

/// Neutral value used when a symmetric domain's midpoint is zero.
const NONZERO_NEUTRAL: f64 = 0.1;

/// A unit of analysis and the data the analyser attached to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Sample id
    pub id: SampleId,
    /// Participant the sample is about, if any
    pub participant_id: Option<ParticipantId>,
    /// Access context of the sample
    pub context_id: u64,
    /// Related records (user, course, ...)
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
}

impl Sample {
    /// Create a sample about a participant.
    #[must_use]
    pub fn new(id: SampleId, participant_id: Option<ParticipantId>, context_id: u64) -> Self {
        Self {
            id,
            participant_id,
            context_id,
            data: BTreeMap::new(),
        }
    }

    /// Attach a related record.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

/// Samples keyed by id, iterated in id order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSet {
    samples: BTreeMap<SampleId, Sample>,
}

impl SampleSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a sample, replacing any sample with the same id.
    pub fn insert(&mut self, sample: Sample) {
        self.samples.insert(sample.id, sample);
    }

    /// Look a sample up.
    #[must_use]
    pub fn get(&self, id: SampleId) -> Option<&Sample> {
        self.samples.get(&id)
    }

    /// Sample ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = SampleId> + '_ {
        self.samples.keys().copied()
    }

    /// Samples in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.values()
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl FromIterator<Sample> for SampleSet {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        let mut set = Self::new();
        for sample in iter {
            set.insert(sample);
        }
        set
    }
}

/// Value domain of a calculable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueDomain {
    /// Continuous `[min, max]`
    Linear {
        /// Lower bound
        min: f64,
        /// Upper bound
        max: f64,
        /// Replacement for a classified value of exactly zero
        neutral: f64,
    },
    /// Finite class set
    Discrete {
        /// Declared classes
        classes: Vec<f64>,
    },
}

impl ValueDomain {
    /// Linear domain whose neutral value is the midpoint, or a small positive
    /// value when the midpoint is zero.
    #[must_use]
    pub fn linear(min: f64, max: f64) -> Self {
        let middle = min + (max - min) / 2.0;
        let neutral = if middle == 0.0 { NONZERO_NEUTRAL } else { middle };
        Self::Linear { min, max, neutral }
    }

    /// `{0, 1}`
    #[must_use]
    pub fn binary() -> Self {
        Self::Discrete {
            classes: vec![0.0, 1.0],
        }
    }

    /// Whether this is a linear domain.
    #[must_use]
    pub const fn is_linear(&self) -> bool {
        matches!(self, Self::Linear { .. })
    }

    /// Domain minimum.
    #[must_use]
    pub fn min(&self) -> f64 {
        match self {
            Self::Linear { min, .. } => *min,
            Self::Discrete { classes } => classes.iter().copied().fold(f64::INFINITY, f64::min),
        }
    }

    /// Domain maximum.
    #[must_use]
    pub fn max(&self) -> f64 {
        match self {
            Self::Linear { max, .. } => *max,
            Self::Discrete { classes } => classes.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }

    /// Value substituted for a classified zero.
    #[must_use]
    pub fn neutral(&self) -> f64 {
        match self {
            Self::Linear { neutral, .. } => *neutral,
            Self::Discrete { .. } => {
                let middle = self.min() + (self.max() - self.min()) / 2.0;
                if middle == 0.0 {
                    NONZERO_NEUTRAL
                } else {
                    middle
                }
            }
        }
    }

    /// Whether `value` belongs to the domain.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        match self {
            Self::Linear { min, max, .. } => value >= *min && value <= *max,
            Self::Discrete { classes } => classes.iter().any(|class| (class - value).abs() < f64::EPSILON),
        }
    }

    /// Check a calculated value, reporting the violation against `calculable`.
    ///
    /// # Errors
    /// Returns `ContractViolation::OutOfRange` or `ContractViolation::UnknownClass`
    pub fn validate(&self, calculable: &str, value: f64) -> std::result::Result<(), ContractViolation> {
        if self.contains(value) {
            return Ok(());
        }
        Err(match self {
            Self::Linear { min, max, .. } => ContractViolation::OutOfRange {
                calculable: calculable.to_string(),
                value,
                min: *min,
                max: *max,
            },
            Self::Discrete { classes } => ContractViolation::UnknownClass {
                calculable: calculable.to_string(),
                value,
                classes: classes.clone(),
            },
        })
    }
}

/// Comparison used by a classification range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl Predicate {
    /// Parse `eq`, `ne`, `lt`, `le`, `gt` or `ge`.
    ///
    /// # Errors
    /// Returns `ContractViolation::UnknownPredicate` for anything else
    pub fn parse(name: &str) -> std::result::Result<Self, ContractViolation> {
        match name {
            "eq" => Ok(Self::Eq),
            "ne" => Ok(Self::Ne),
            "lt" => Ok(Self::Lt),
            "le" => Ok(Self::Le),
            "gt" => Ok(Self::Gt),
            "ge" => Ok(Self::Ge),
            other => Err(ContractViolation::UnknownPredicate(other.to_string())),
        }
    }

    /// Evaluate `value <predicate> threshold`.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn matches(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Eq => value == threshold,
            Self::Ne => value != threshold,
            Self::Lt => value < threshold,
            Self::Le => value <= threshold,
            Self::Gt => value > threshold,
            Self::Ge => value >= threshold,
        }
    }
}

/// One `(predicate, threshold)` classification range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeRule {
    /// Comparison
    pub predicate: Predicate,
    /// Threshold
    pub threshold: f64,
}

impl RangeRule {
    /// Create a rule.
    #[must_use]
    pub const fn new(predicate: Predicate, threshold: f64) -> Self {
        Self { predicate, threshold }
    }

    /// Parse rules from JSON such as `[["lt", 20], ["ge", 20]]`.
    ///
    /// # Errors
    /// Returns `ContractViolation::MalformedRange` when an item is not a
    /// `[predicate, number]` pair and `UnknownPredicate` for bad predicates
    pub fn parse_list(ranges: &serde_json::Value) -> std::result::Result<Vec<Self>, ContractViolation> {
        let items = ranges
            .as_array()
            .ok_or_else(|| ContractViolation::MalformedRange(ranges.to_string()))?;
        items
            .iter()
            .map(|item| match item.as_array().map(Vec::as_slice) {
                Some([predicate, threshold]) => {
                    let predicate = predicate
                        .as_str()
                        .ok_or_else(|| ContractViolation::MalformedRange(item.to_string()))?;
                    let threshold = threshold
                        .as_f64()
                        .ok_or_else(|| ContractViolation::MalformedRange(item.to_string()))?;
                    Ok(Self::new(Predicate::parse(predicate)?, threshold))
                }
                _ => Err(ContractViolation::MalformedRange(item.to_string())),
            })
            .collect()
    }
}

/// `max(min(value, max), min)` over the domain bounds.
#[must_use]
pub fn clamp(value: f64, domain: &ValueDomain) -> f64 {
    value.min(domain.max()).max(domain.min())
}

/// Map `value` onto the domain according to the first matching range.
///
/// The index `i` of the matching range becomes
/// `min + i * (max - min) / (ranges - 1)`, rounded to 2 decimals. A result of
/// exactly zero is replaced by the domain's neutral value because zero is the
/// "no data" sentinel in datasets.
///
/// # Errors
/// Returns `ContractViolation::TooFewRanges` with fewer than 2 ranges and
/// `ContractViolation::UnclassifiedValue` when no range matches
#[allow(clippy::cast_precision_loss)]
pub fn classify_value(
    value: f64,
    ranges: &[RangeRule],
    domain: &ValueDomain,
) -> std::result::Result<f64, ContractViolation> {
    if ranges.len() < 2 {
        return Err(ContractViolation::TooFewRanges(ranges.len()));
    }
    let weight = (domain.max() - domain.min()) / (ranges.len() - 1) as f64;

    let index = ranges
        .iter()
        .position(|rule| rule.predicate.matches(value, rule.threshold))
        .ok_or(ContractViolation::UnclassifiedValue(value))?;

    let classified = round2(domain.min() + weight * index as f64);
    if classified == 0.0 {
        return Ok(domain.neutral());
    }
    Ok(classified)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Something that computes one scalar per sample.
pub trait Calculable: Send + Sync {
    /// Stable identifier, also used as dataset column name.
    fn id(&self) -> &str;

    /// Human readable name.
    fn name(&self) -> &str {
        self.id()
    }

    /// Value domain.
    fn domain(&self) -> &ValueDomain;

    /// Calculate one sample. `None` means "not applicable".
    ///
    /// `range` is `None` when the calculation covers the whole analysable.
    ///
    /// # Errors
    /// Returns error if collaborators fail or the contract is broken
    fn calculate_sample(
        &self,
        sample: &Sample,
        analysable: &dyn Analysable,
        range: Option<&Range>,
    ) -> Result<Option<f64>>;

    /// Calculate every sample of the batch.
    ///
    /// # Errors
    /// Propagates the first per-sample error
    fn calculate(
        &self,
        samples: &SampleSet,
        analysable: &dyn Analysable,
        range: Option<&Range>,
    ) -> Result<Calculations> {
        samples
            .iter()
            .map(|sample| Ok((sample.id, self.calculate_sample(sample, analysable, range)?)))
            .collect()
    }
}
