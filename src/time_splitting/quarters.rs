//! Third and fourth quarters as disjoint ranges.

use super::{quarter_duration, Range, TimeSplitting};
use crate::analysable::Timestamp;

/// Two disjoint ranges covering the 3rd and 4th quarters.
///
/// The first half of the lifetime is not sampled.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quarters;

impl TimeSplitting for Quarters {
    fn id(&self) -> &str {
        "quarters"
    }

    fn name(&self) -> &str {
        "Quarters"
    }

    fn define_ranges(&self, start: Timestamp, end: Timestamp) -> Vec<Range> {
        let quarter = quarter_duration(start, end);
        vec![
            Range::new(start + quarter * 2, start + quarter * 3),
            Range::new(start + quarter * 3, start + quarter * 4),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarters_skip_first_half() {
        let ranges = Quarters.define_ranges(0, 400);
        assert_eq!(ranges, vec![Range::new(200, 300), Range::new(300, 400)]);
    }

    #[test]
    fn test_quarters_floor_duration() {
        // 403 / 4 floors to 100, the last 3 seconds are not covered.
        let ranges = Quarters.define_ranges(1000, 1403);
        assert_eq!(ranges, vec![Range::new(1200, 1300), Range::new(1300, 1400)]);
    }

    #[test]
    fn test_short_lifetime_gives_invalid_ranges() {
        let ranges = Quarters.define_ranges(10, 12);
        assert!(ranges.iter().all(|range| !range.is_valid()));
    }
}
