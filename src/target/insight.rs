//! Insight delivery port.

use crate::Result;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// "Model X has new predictions in context Y".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    /// Model that produced the predictions
    pub model_id: u64,
    /// Target id
    pub target: String,
    /// Context with new predictions
    pub context_id: u64,
}

/// Delivers insights to whoever should act on them.
pub trait InsightNotifier: Send + Sync {
    /// Deliver one insight.
    ///
    /// # Errors
    /// Returns error if delivery fails
    fn notify(&self, insight: Insight) -> Result<()>;
}

/// In-memory notifier, keeps every insight by context.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    insights: DashMap<u64, Vec<Insight>>,
}

impl MemoryNotifier {
    /// Create an empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insights delivered to a context.
    #[must_use]
    pub fn for_context(&self, context_id: u64) -> Vec<Insight> {
        self.insights
            .get(&context_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Total number of delivered insights.
    #[must_use]
    pub fn len(&self) -> usize {
        self.insights.iter().map(|entry| entry.value().len()).sum()
    }

    /// Whether nothing was delivered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl InsightNotifier for MemoryNotifier {
    fn notify(&self, insight: Insight) -> Result<()> {
        self.insights.entry(insight.context_id).or_default().push(insight);
        Ok(())
    }
}
