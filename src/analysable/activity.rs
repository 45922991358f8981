//! Activity store port and its in-memory implementation.

use super::{ParticipantId, Timestamp};
use crate::Result;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// A single activity log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Analysable the activity belongs to
    pub analysable_id: u64,
    /// Participant that generated the activity
    pub participant_id: ParticipantId,
    /// Creation timestamp
    pub time_created: Timestamp,
}

impl LogRecord {
    /// Create a log record.
    #[must_use]
    pub const fn new(analysable_id: u64, participant_id: ParticipantId, time_created: Timestamp) -> Self {
        Self {
            analysable_id,
            participant_id,
            time_created,
        }
    }
}

/// Inclusive time window, open ends are unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeWindow {
    /// Lower bound (inclusive)
    pub from: Option<Timestamp>,
    /// Upper bound (inclusive)
    pub to: Option<Timestamp>,
}

impl TimeWindow {
    /// Unbounded window.
    #[must_use]
    pub const fn all() -> Self {
        Self { from: None, to: None }
    }

    /// `[from, to]`
    #[must_use]
    pub const fn between(from: Timestamp, to: Timestamp) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    /// `[from, ∞)`
    #[must_use]
    pub const fn since(from: Timestamp) -> Self {
        Self { from: Some(from), to: None }
    }

    /// `(-∞, to]`
    #[must_use]
    pub const fn until(to: Timestamp) -> Self {
        Self { from: None, to: Some(to) }
    }

    /// Whether `time` falls inside the window.
    #[must_use]
    pub fn contains(&self, time: Timestamp) -> bool {
        self.from.map_or(true, |from| time >= from) && self.to.map_or(true, |to| time <= to)
    }
}

/// Read access to the host activity log.
///
/// Only counts and min/max timestamps are needed; implementations are free to
/// push the filtering down to their storage.
pub trait ActivityStore: Send + Sync {
    /// Count logs of `participants` in `analysable_id` inside `window`.
    ///
    /// # Errors
    /// Returns error if the store can not be queried
    fn count_logs(
        &self,
        analysable_id: u64,
        participants: &[ParticipantId],
        window: TimeWindow,
    ) -> Result<u64>;

    /// Earliest log timestamp of `participants` in `analysable_id`.
    ///
    /// # Errors
    /// Returns error if the store can not be queried
    fn earliest_log(&self, analysable_id: u64, participants: &[ParticipantId]) -> Result<Option<Timestamp>>;

    /// Latest log timestamp of `participants` in `analysable_id`.
    ///
    /// # Errors
    /// Returns error if the store can not be queried
    fn latest_log(&self, analysable_id: u64, participants: &[ParticipantId]) -> Result<Option<Timestamp>>;

    /// Number of distinct `participants` with a log strictly after `after`.
    ///
    /// # Errors
    /// Returns error if the store can not be queried
    fn count_active_participants(
        &self,
        analysable_id: u64,
        participants: &[ParticipantId],
        after: Timestamp,
    ) -> Result<u64>;
}

/// In-memory activity store keyed by analysable id.
#[derive(Debug, Default)]
pub struct MemoryActivityStore {
    logs: DashMap<u64, Vec<LogRecord>>,
}

impl MemoryActivityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a log record.
    pub fn record(&self, log: LogRecord) {
        self.logs.entry(log.analysable_id).or_default().push(log);
    }

    /// Append many log records.
    pub fn extend(&self, logs: impl IntoIterator<Item = LogRecord>) {
        for log in logs {
            self.record(log);
        }
    }

    /// Total number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.logs.iter().map(|entry| entry.value().len()).sum()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn matching<'a>(
        logs: &'a [LogRecord],
        participants: &'a [ParticipantId],
    ) -> impl Iterator<Item = &'a LogRecord> + 'a {
        logs.iter().filter(move |log| participants.contains(&log.participant_id))
    }
}

impl ActivityStore for MemoryActivityStore {
    fn count_logs(
        &self,
        analysable_id: u64,
        participants: &[ParticipantId],
        window: TimeWindow,
    ) -> Result<u64> {
        Ok(self.logs.get(&analysable_id).map_or(0, |logs| {
            Self::matching(logs.value(), participants)
                .filter(|log| window.contains(log.time_created))
                .count() as u64
        }))
    }

    fn earliest_log(&self, analysable_id: u64, participants: &[ParticipantId]) -> Result<Option<Timestamp>> {
        Ok(self.logs.get(&analysable_id).and_then(|logs| {
            Self::matching(logs.value(), participants)
                .map(|log| log.time_created)
                .min()
        }))
    }

    fn latest_log(&self, analysable_id: u64, participants: &[ParticipantId]) -> Result<Option<Timestamp>> {
        Ok(self.logs.get(&analysable_id).and_then(|logs| {
            Self::matching(logs.value(), participants)
                .map(|log| log.time_created)
                .max()
        }))
    }

    fn count_active_participants(
        &self,
        analysable_id: u64,
        participants: &[ParticipantId],
        after: Timestamp,
    ) -> Result<u64> {
        Ok(self.logs.get(&analysable_id).map_or(0, |logs| {
            let mut active: Vec<ParticipantId> = Self::matching(logs.value(), participants)
                .filter(|log| log.time_created > after)
                .map(|log| log.participant_id)
                .collect();
            active.sort_unstable();
            active.dedup();
            active.len() as u64
        }))
    }
}
