//! Analysable entities and their lifecycle window
//!
//! An analysable (typically a course) has a start and an end timestamp. When
//! the host does not provide explicit dates they are inferred from the
//! activity log by the [`BoundaryEstimator`].
//!
//! ## Sentinels
//!
//! ```text
//! start == 0         never started / unknown
//! end   == 0         can not be worked out
//! end   == MAX_TIME  ongoing, end unknown
//! ```

mod activity;
mod boundary;
mod course;

pub use activity::{ActivityStore, LogRecord, MemoryActivityStore, TimeWindow};
pub use boundary::{BoundaryEstimator, BoundaryInput, BoundarySettings, EndEstimate, EndOutcome};
pub use course::{Course, CourseBuilder};

use crate::Result;

/// Unix timestamp in seconds.
pub type Timestamp = i64;

/// Participant (user) identifier in the host activity store.
pub type ParticipantId = u64;

/// Seconds in a week.
pub const WEEK_SECS: i64 = 7 * 24 * 60 * 60;

/// End timestamp of analysables that are still ongoing.
pub const MAX_TIME: Timestamp = 9_999_999_999;

/// An entity with a lifecycle window that can be split into ranges.
pub trait Analysable: Send + Sync {
    /// Analysable identifier.
    fn id(&self) -> u64;

    /// Context predictions for this analysable are attached to.
    fn context_id(&self) -> u64;

    /// Start timestamp, 0 when unknown.
    ///
    /// # Errors
    /// Returns error if the activity store can not be queried
    fn start(&self) -> Result<Timestamp>;

    /// End timestamp, 0 when unknown and [`MAX_TIME`] when ongoing.
    ///
    /// # Errors
    /// Returns error if the activity store can not be queried
    fn end(&self) -> Result<Timestamp>;

    /// Reference "now" used for validity checks.
    fn now(&self) -> Timestamp;

    /// Ordered analysable-level variables written to the dataset header rows.
    fn metadata(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Whether the analysable has started.
    ///
    /// # Errors
    /// Propagates boundary inference errors
    fn was_started(&self) -> Result<bool> {
        let start = self.start()?;
        Ok(start != 0 && self.now() >= start)
    }

    /// Whether the analysable has finished.
    ///
    /// # Errors
    /// Propagates boundary inference errors
    fn is_finished(&self) -> Result<bool> {
        let end = self.end()?;
        Ok(end != 0 && self.now() >= end)
    }

    /// Started and finished.
    ///
    /// # Errors
    /// Propagates boundary inference errors
    fn is_valid(&self) -> Result<bool> {
        Ok(self.was_started()? && self.is_finished()?)
    }
}
