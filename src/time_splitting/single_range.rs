//! One range spanning the whole lifetime.

use super::{Range, TimeSplitting};
use crate::analysable::Timestamp;

/// `[start, end)` as a single range.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleRange;

impl TimeSplitting for SingleRange {
    fn id(&self) -> &str {
        "single_range"
    }

    fn name(&self) -> &str {
        "Single range"
    }

    fn define_ranges(&self, start: Timestamp, end: Timestamp) -> Vec<Range> {
        vec![Range::new(start, end)]
    }
}
