//! Growing windows ending at the third and fourth quarter boundaries.

use super::{quarter_duration, Range, TimeSplitting};
use crate::analysable::Timestamp;

/// Two cumulative ranges, both starting at the analysable start.
///
/// A sample appears in both ranges with different accumulated values.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuartersAccum;

impl TimeSplitting for QuartersAccum {
    fn id(&self) -> &str {
        "quarters_accum"
    }

    fn name(&self) -> &str {
        "Quarters accumulative"
    }

    fn define_ranges(&self, start: Timestamp, end: Timestamp) -> Vec<Range> {
        let quarter = quarter_duration(start, end);
        vec![
            Range::new(start, start + quarter * 3),
            Range::new(start, start + quarter * 4),
        ]
    }
}
