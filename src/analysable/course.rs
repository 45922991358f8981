//! Course analysable with lazily inferred boundaries.

use super::{
    Analysable, BoundaryEstimator, BoundaryInput, EndEstimate, ParticipantId, Timestamp,
};
use crate::Result;
use std::sync::OnceLock;

/// A course: students, optional explicit dates and cached boundaries.
///
/// Boundaries are computed on first access and cached for the lifetime of
/// the object; nothing is persisted.
#[derive(Debug)]
pub struct Course {
    id: u64,
    context_id: u64,
    students: Vec<ParticipantId>,
    start_date: Option<Timestamp>,
    end_date: Option<Timestamp>,
    metadata: Vec<(String, String)>,
    now: Timestamp,
    estimator: BoundaryEstimator,
    start: OnceLock<Timestamp>,
    end: OnceLock<EndEstimate>,
}

impl Course {
    /// Create a builder with the required fields.
    #[must_use]
    pub fn builder(id: u64, estimator: BoundaryEstimator) -> CourseBuilder {
        CourseBuilder::new(id, estimator)
    }

    /// Course students.
    #[must_use]
    pub fn students(&self) -> &[ParticipantId] {
        &self.students
    }

    /// Full end estimate including how it was obtained.
    ///
    /// # Errors
    /// Returns error if the activity store can not be queried
    pub fn end_estimate(&self) -> Result<&EndEstimate> {
        if let Some(estimate) = self.end.get() {
            return Ok(estimate);
        }
        let start = self.start()?;
        let estimate = self.estimator.end(&self.input(), start)?;
        Ok(self.end.get_or_init(|| estimate))
    }

    fn input(&self) -> BoundaryInput<'_> {
        BoundaryInput {
            analysable_id: self.id,
            students: &self.students,
            start_date: self.start_date,
            end_date: self.end_date,
            now: self.now,
        }
    }
}

impl Analysable for Course {
    fn id(&self) -> u64 {
        self.id
    }

    fn context_id(&self) -> u64 {
        self.context_id
    }

    fn start(&self) -> Result<Timestamp> {
        if let Some(start) = self.start.get() {
            return Ok(*start);
        }
        let start = self.estimator.start(&self.input())?;
        Ok(*self.start.get_or_init(|| start))
    }

    fn end(&self) -> Result<Timestamp> {
        Ok(self.end_estimate()?.timestamp)
    }

    fn now(&self) -> Timestamp {
        self.now
    }

    fn metadata(&self) -> Vec<(String, String)> {
        self.metadata.clone()
    }
}

/// Builder for [`Course`].
#[derive(Debug)]
pub struct CourseBuilder {
    id: u64,
    context_id: Option<u64>,
    students: Vec<ParticipantId>,
    start_date: Option<Timestamp>,
    end_date: Option<Timestamp>,
    metadata: Vec<(String, String)>,
    now: Timestamp,
    estimator: BoundaryEstimator,
}

impl CourseBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(id: u64, estimator: BoundaryEstimator) -> Self {
        Self {
            id,
            context_id: None,
            students: Vec::new(),
            start_date: None,
            end_date: None,
            metadata: Vec::new(),
            now: chrono::Utc::now().timestamp(),
            estimator,
        }
    }

    /// Set the context id (defaults to the course id).
    #[must_use]
    pub const fn context_id(mut self, context_id: u64) -> Self {
        self.context_id = Some(context_id);
        self
    }

    /// Set the course students.
    #[must_use]
    pub fn students(mut self, students: impl IntoIterator<Item = ParticipantId>) -> Self {
        self.students = students.into_iter().collect();
        self.students.sort_unstable();
        self.students.dedup();
        self
    }

    /// Set the explicit start date.
    #[must_use]
    pub const fn start_date(mut self, start: Timestamp) -> Self {
        self.start_date = Some(start);
        self
    }

    /// Set the explicit end date.
    #[must_use]
    pub const fn end_date(mut self, end: Timestamp) -> Self {
        self.end_date = Some(end);
        self
    }

    /// Add a metadata variable.
    #[must_use]
    pub fn metadata(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((name.into(), value.into()));
        self
    }

    /// Override "now" (useful for testing).
    #[must_use]
    pub const fn now(mut self, now: Timestamp) -> Self {
        self.now = now;
        self
    }

    /// Build the `Course`.
    #[must_use]
    pub fn build(self) -> Course {
        Course {
            id: self.id,
            context_id: self.context_id.unwrap_or(self.id),
            students: self.students,
            start_date: self.start_date,
            end_date: self.end_date,
            metadata: self.metadata,
            now: self.now,
            estimator: self.estimator,
            start: OnceLock::new(),
            end: OnceLock::new(),
        }
    }
}
