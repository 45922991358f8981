//! Analyser port: which analysables and samples a model looks at
//!
//! The analyser is the host-side collaborator that enumerates analysables
//! and their samples. [`DatasetBuilder`] drives it through the calculation
//! pipeline to produce datasets.

mod builder;

pub use builder::{DatasetBuilder, DatasetOutcome, DatasetRequest};

use crate::analysable::Analysable;
use crate::calculable::{SampleId, SampleSet};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Supplies analysables and samples. Sample ids must be stable across calls.
pub trait Analyser: Send + Sync {
    /// Every analysable to process.
    ///
    /// # Errors
    /// Returns error if the host can not be queried
    fn analysables(&self) -> Result<Vec<Arc<dyn Analysable>>>;

    /// Samples of one analysable with their related data.
    ///
    /// # Errors
    /// Returns error if the host can not be queried
    fn enumerate_samples(&self, analysable: &dyn Analysable) -> Result<SampleSet>;

    /// Samples by id. Unknown ids are left out of the result.
    ///
    /// # Errors
    /// Returns error if the host can not be queried
    fn get_samples(&self, ids: &[SampleId]) -> Result<SampleSet>;

    /// Context predictions about a sample are attached to.
    ///
    /// # Errors
    /// Returns `Error::NotFound` for unknown samples
    fn sample_context(&self, sample_id: SampleId) -> Result<u64> {
        self.get_samples(&[sample_id])?
            .get(sample_id)
            .map(|sample| sample.context_id)
            .ok_or_else(|| Error::not_found(format!("sample {sample_id}")))
    }
}

/// In-memory analyser over a fixed set of analysables.
#[derive(Default)]
pub struct MemoryAnalyser {
    analysables: Vec<Arc<dyn Analysable>>,
    samples: BTreeMap<u64, SampleSet>,
}

impl std::fmt::Debug for MemoryAnalyser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAnalyser")
            .field("analysables", &self.analysables.iter().map(|a| a.id()).collect::<Vec<_>>())
            .field("samples", &self.samples)
            .finish()
    }
}

impl MemoryAnalyser {
    /// Create an empty analyser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an analysable and its samples.
    #[must_use]
    pub fn with_analysable(mut self, analysable: Arc<dyn Analysable>, samples: SampleSet) -> Self {
        self.samples.insert(analysable.id(), samples);
        self.analysables.push(analysable);
        self
    }

    /// Forget a sample, as if it was deleted from the host.
    pub fn remove_sample(&mut self, sample_id: SampleId) {
        for samples in self.samples.values_mut() {
            *samples = samples.iter().filter(|s| s.id != sample_id).cloned().collect();
        }
    }
}

impl Analyser for MemoryAnalyser {
    fn analysables(&self) -> Result<Vec<Arc<dyn Analysable>>> {
        Ok(self.analysables.clone())
    }

    fn enumerate_samples(&self, analysable: &dyn Analysable) -> Result<SampleSet> {
        Ok(self.samples.get(&analysable.id()).cloned().unwrap_or_default())
    }

    fn get_samples(&self, ids: &[SampleId]) -> Result<SampleSet> {
        Ok(self
            .samples
            .values()
            .flat_map(SampleSet::iter)
            .filter(|sample| ids.contains(&sample.id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysable::{BoundaryEstimator, BoundarySettings, Course, MemoryActivityStore};
    use crate::calculable::Sample;

    fn analyser() -> MemoryAnalyser {
        let store = Arc::new(MemoryActivityStore::new());
        let course = Course::builder(1, BoundaryEstimator::new(store, BoundarySettings::default())).build();
        MemoryAnalyser::new().with_analysable(
            Arc::new(course),
            [Sample::new(10, Some(1), 7), Sample::new(11, Some(2), 7)].into_iter().collect(),
        )
    }

    #[test]
    fn test_get_samples_skips_unknown() {
        let samples = analyser().get_samples(&[10, 99]).unwrap();
        assert_eq!(samples.ids().collect::<Vec<_>>(), vec![10]);
    }

    #[test]
    fn test_sample_context() {
        let analyser = analyser();
        assert_eq!(analyser.sample_context(11).unwrap(), 7);
        assert!(matches!(analyser.sample_context(99), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_remove_sample() {
        let mut analyser = analyser();
        analyser.remove_sample(10);
        assert!(analyser.get_samples(&[10]).unwrap().is_empty());
        let course = analyser.analysables().unwrap().remove(0);
        assert_eq!(analyser.enumerate_samples(course.as_ref()).unwrap().len(), 1);
    }
}
