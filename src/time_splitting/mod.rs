//! Time splitting: partitions an analysable's lifetime into sample ranges
//!
//! Every sample is evaluated once per range, and each `(sample, range)`
//! pair gets a [`UniqueSampleId`] used as the dataset row key:
//!
//! ```text
//! single_range     [start ................................ end)
//! quarters                             [q2 ...... q3)[q3 .. end)
//! quarters_accum   [start ................ q3)
//!                  [start ................................ end)
//! ```

mod quarters;
mod quarters_accum;
mod single_range;

pub use quarters::Quarters;
pub use quarters_accum::QuartersAccum;
pub use single_range::SingleRange;

use crate::analysable::{Analysable, Timestamp, WEEK_SECS};
use crate::calculable::SampleId;
use crate::error::ContractViolation;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A `[start, end)` time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    /// Range start
    pub start: Timestamp,
    /// Range end
    pub end: Timestamp,
}

impl Range {
    /// Create a range.
    #[must_use]
    pub const fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// Duration in seconds (may be non-positive for invalid ranges).
    #[must_use]
    pub const fn duration(&self) -> i64 {
        self.end - self.start
    }

    /// Ranges with a non-positive duration are skipped.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.duration() > 0
    }

    /// Number of weeks the range spans.
    ///
    /// # Errors
    /// Returns `ContractViolation::EmptyTimeRange` when end <= start
    #[allow(clippy::cast_precision_loss)]
    pub fn weeks(&self) -> std::result::Result<f64, ContractViolation> {
        if !self.is_valid() {
            return Err(ContractViolation::EmptyTimeRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(self.duration() as f64 / WEEK_SECS as f64)
    }
}

/// Composite `(sample id, range index)` row key.
///
/// Encoded as `"<sampleid>-<rangeindex>"`. Sample ids are unsigned so the
/// separator is never ambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UniqueSampleId {
    /// Sample id
    pub sample_id: SampleId,
    /// Range index
    pub range_index: usize,
}

impl UniqueSampleId {
    /// Create a unique sample id.
    #[must_use]
    pub const fn new(sample_id: SampleId, range_index: usize) -> Self {
        Self {
            sample_id,
            range_index,
        }
    }
}

impl fmt::Display for UniqueSampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.sample_id, self.range_index)
    }
}

impl FromStr for UniqueSampleId {
    type Err = Error;

    fn from_str(token: &str) -> Result<Self> {
        let invalid = || Error::invalid_input(format!("malformed unique sample id {token:?}"));
        let (sample, range) = token.split_once('-').ok_or_else(invalid)?;
        Ok(Self {
            sample_id: sample.parse().map_err(|_| invalid())?,
            range_index: range.parse().map_err(|_| invalid())?,
        })
    }
}

/// A method that splits an analysable into ranges.
pub trait TimeSplitting: Send + Sync {
    /// Stable identifier.
    fn id(&self) -> &str;

    /// Human readable name.
    fn name(&self) -> &str;

    /// Ranges for a `[start, end)` lifetime, in order. May contain invalid ranges.
    fn define_ranges(&self, start: Timestamp, end: Timestamp) -> Vec<Range>;

    /// Ranges for an analysable.
    ///
    /// # Errors
    /// Propagates boundary inference errors
    fn ranges(&self, analysable: &dyn Analysable) -> Result<Vec<Range>> {
        Ok(self.define_ranges(analysable.start()?, analysable.end()?))
    }

    /// Whether the analysable can be split: labelled data needs a finished
    /// analysable, unlabelled data a started one with a known end.
    ///
    /// # Errors
    /// Propagates boundary inference errors
    fn is_valid_analysable(&self, analysable: &dyn Analysable, labelled: bool) -> Result<bool> {
        if labelled {
            return analysable.is_valid();
        }
        Ok(analysable.was_started()? && analysable.end()? != 0)
    }

    /// Encode a row key.
    fn encode(&self, sample_id: SampleId, range_index: usize) -> String {
        UniqueSampleId::new(sample_id, range_index).to_string()
    }

    /// Decode a row key back into `(sample id, range index)`.
    ///
    /// # Errors
    /// Returns `Error::InvalidInput` for malformed tokens
    fn decode(&self, token: &str) -> Result<(SampleId, usize)> {
        let id: UniqueSampleId = token.parse()?;
        Ok((id.sample_id, id.range_index))
    }
}

pub(crate) fn quarter_duration(start: Timestamp, end: Timestamp) -> i64 {
    (end - start).div_euclid(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_sample_id_round_trip() {
        let splitter = SingleRange;
        let token = splitter.encode(123, 4);
        assert_eq!(token, "123-4");
        assert_eq!(splitter.decode(&token).unwrap(), (123, 4));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let splitter = SingleRange;
        assert!(splitter.decode("123").is_err());
        assert!(splitter.decode("a-1").is_err());
        assert!(splitter.decode("1-b").is_err());
        assert!(splitter.decode("-1-2").is_err());
    }

    #[test]
    fn test_range_validity_and_weeks() {
        assert!(Range::new(0, WEEK_SECS * 2).is_valid());
        assert!((Range::new(0, WEEK_SECS * 2).weeks().unwrap() - 2.0).abs() < f64::EPSILON);
        assert!(!Range::new(10, 10).is_valid());
        assert!(Range::new(10, 5).weeks().is_err());
    }

    #[test]
    fn test_unique_sample_id_ordering() {
        let mut ids = vec![UniqueSampleId::new(2, 0), UniqueSampleId::new(1, 1), UniqueSampleId::new(1, 0)];
        ids.sort();
        assert_eq!(ids, vec![UniqueSampleId::new(1, 0), UniqueSampleId::new(1, 1), UniqueSampleId::new(2, 0)]);
    }
}
