//! Start/end inference from sparse activity logs
//!
//! The end date is the earliest timestamp that covers a minimum share of all
//! student logs, found by bisecting `[start, now]`:
//!
//! ```text
//! start                      mid                       now
//!   |-------------------------|-------------------------|
//!   coverage(start..mid) >= min  -> record mid, search [start, mid]
//!   coverage(start..mid) <  min  -> search [mid, now]
//! ```
//!
//! The search always shrinks toward the earliest passing timestamp rather
//! than the midpoint of the activity mass.

use super::{ActivityStore, ParticipantId, Timestamp, TimeWindow, MAX_TIME};
use crate::config::PipelineConfig;
use crate::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Tunables of the boundary search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundarySettings {
    /// Minimum percentage of student logs the end date must cover
    pub min_log_coverage_percent: u32,
    /// Search stops once the window is this narrow
    pub resolution_secs: i64,
    /// Recent activity window used for the ongoing check
    pub recent_window_secs: i64,
    /// Share of active students in the recent window that marks "ongoing"
    pub recent_activity_ratio: f64,
}

impl Default for BoundarySettings {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for BoundarySettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            min_log_coverage_percent: config.min_log_coverage_percent,
            resolution_secs: config.boundary_resolution_secs,
            recent_window_secs: config.recent_activity_window_secs,
            recent_activity_ratio: config.recent_activity_ratio,
        }
    }
}

/// What the estimator knows about an analysable.
#[derive(Debug, Clone, Copy)]
pub struct BoundaryInput<'a> {
    /// Analysable identifier
    pub analysable_id: u64,
    /// Participants whose activity counts
    pub students: &'a [ParticipantId],
    /// Explicit start date, if the host has one
    pub start_date: Option<Timestamp>,
    /// Explicit end date, if the host has one
    pub end_date: Option<Timestamp>,
    /// Reference "now"
    pub now: Timestamp,
}

/// How an end timestamp was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndOutcome {
    /// Host provided the end date
    Explicit,
    /// Not enough information (no start, no students or no logs)
    Unknown,
    /// Recent activity shows the analysable is still running
    Ongoing,
    /// Found by the coverage search
    Inferred,
    /// No candidate cleared the coverage threshold.
    ///
    /// Carries the integer coverage percentage observed at every tried
    /// timestamp so the threshold can be tuned.
    Inconclusive {
        /// Tried timestamp -> coverage percent
        coverage: BTreeMap<Timestamp, u32>,
    },
}

/// Result of end inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndEstimate {
    /// End timestamp (0, [`MAX_TIME`] or a real date)
    pub timestamp: Timestamp,
    /// How it was obtained
    pub outcome: EndOutcome,
}

impl EndEstimate {
    const fn new(timestamp: Timestamp, outcome: EndOutcome) -> Self {
        Self { timestamp, outcome }
    }

    /// Whether the search failed to clear the threshold.
    #[must_use]
    pub const fn is_inconclusive(&self) -> bool {
        matches!(self.outcome, EndOutcome::Inconclusive { .. })
    }
}

/// Infers analysable boundaries from the activity store.
#[derive(Clone)]
pub struct BoundaryEstimator {
    store: Arc<dyn ActivityStore>,
    settings: BoundarySettings,
}

impl std::fmt::Debug for BoundaryEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundaryEstimator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl BoundaryEstimator {
    /// Create an estimator over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ActivityStore>, settings: BoundarySettings) -> Self {
        Self { store, settings }
    }

    /// Current settings.
    #[must_use]
    pub const fn settings(&self) -> &BoundarySettings {
        &self.settings
    }

    /// Start timestamp: explicit date, else earliest student log, else 0.
    ///
    /// # Errors
    /// Returns error if the activity store can not be queried
    pub fn start(&self, input: &BoundaryInput<'_>) -> Result<Timestamp> {
        if input.students.is_empty() {
            return Ok(0);
        }
        if let Some(start) = input.start_date.filter(|start| *start != 0) {
            return Ok(start);
        }
        Ok(self
            .store
            .earliest_log(input.analysable_id, input.students)?
            .unwrap_or(0))
    }

    /// End timestamp given an already resolved `start`.
    ///
    /// # Errors
    /// Returns error if the activity store can not be queried
    pub fn end(&self, input: &BoundaryInput<'_>, start: Timestamp) -> Result<EndEstimate> {
        if let Some(end) = input.end_date.filter(|end| *end != 0) {
            return Ok(EndEstimate::new(end, EndOutcome::Explicit));
        }
        if start == 0 || input.students.is_empty() {
            return Ok(EndEstimate::new(0, EndOutcome::Unknown));
        }

        let id = input.analysable_id;
        let total = self.store.count_logs(id, input.students, TimeWindow::all())?;
        if total == 0 {
            return Ok(EndEstimate::new(0, EndOutcome::Unknown));
        }

        let recent = self.store.count_active_participants(
            id,
            input.students,
            input.now - self.settings.recent_window_secs,
        )?;
        #[allow(clippy::cast_precision_loss)]
        let ongoing_floor = input.students.len() as f64 * self.settings.recent_activity_ratio;
        #[allow(clippy::cast_precision_loss)]
        let recent_count = recent as f64;
        if recent_count > ongoing_floor {
            tracing::debug!(analysable_id = id, recent, "Recent student activity, analysable is ongoing");
            return Ok(EndEstimate::new(MAX_TIME, EndOutcome::Ongoing));
        }

        self.search_end(input, start, total)
    }

    fn search_end(&self, input: &BoundaryInput<'_>, start: Timestamp, total: u64) -> Result<EndEstimate> {
        let mut best = MAX_TIME;
        let mut coverage = BTreeMap::new();
        let (mut loop_start, mut loop_time, mut loop_end) = split(start, input.now);

        loop {
            let nlogs = self.store.count_logs(
                input.analysable_id,
                input.students,
                TimeWindow::between(start, loop_time),
            )?;
            let percent = u32::try_from(nlogs * 100 / total).unwrap_or(u32::MAX);
            coverage.insert(loop_time, percent);

            if nlogs != 0 && percent >= self.settings.min_log_coverage_percent {
                best = best.min(loop_time);
                (loop_start, loop_time, loop_end) = split(loop_start, loop_time);
            } else {
                (loop_start, loop_time, loop_end) = split(loop_time, loop_end);
            }

            if loop_end - loop_start <= self.settings.resolution_secs {
                break;
            }
        }

        if best == MAX_TIME {
            tracing::warn!(
                analysable_id = input.analysable_id,
                min_percent = self.settings.min_log_coverage_percent,
                coverage = ?coverage,
                "No end date candidate clears the log coverage threshold, treating as ongoing"
            );
            return Ok(EndEstimate::new(MAX_TIME, EndOutcome::Inconclusive { coverage }));
        }

        Ok(EndEstimate::new(best, EndOutcome::Inferred))
    }
}

const fn split(start: Timestamp, end: Timestamp) -> (Timestamp, Timestamp, Timestamp) {
    (start, start + (end - start) / 2, end)
}
