//! Typed registry of calculables and time splitting methods
//!
//! Model definitions refer to indicators, targets and time splittings by
//! string id. The registry maps each id to a factory, checks at registration
//! time that the factory builds something carrying that id, and rejects
//! unknown ids when a model is resolved.

use crate::analysable::ActivityStore;
use crate::config::{ModelConfig, PipelineConfig};
use crate::indicator::{AnyAccessAfterEnd, AnyAccessBeforeStart, Indicator, ReadActions};
use crate::target::{EngagementLevel, NoAccessInLastQuarter, Target};
use crate::time_splitting::{Quarters, QuartersAccum, SingleRange, TimeSplitting};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Collaborators handed to every factory.
#[derive(Clone)]
pub struct FactoryContext {
    /// Host activity log
    pub store: Arc<dyn ActivityStore>,
    /// Pipeline settings
    pub config: PipelineConfig,
}

impl FactoryContext {
    /// Create a factory context.
    #[must_use]
    pub fn new(store: Arc<dyn ActivityStore>, config: PipelineConfig) -> Self {
        Self { store, config }
    }
}

type Factory<T> = Box<dyn Fn(&FactoryContext) -> Arc<T> + Send + Sync>;

/// A model definition with every id resolved.
#[derive(Clone)]
pub struct ResolvedModel {
    /// Target
    pub target: Arc<dyn Target>,
    /// Indicators, ordered by id
    pub indicators: Vec<Arc<dyn Indicator>>,
    /// Active time splitting, if any
    pub time_splitting: Option<Arc<dyn TimeSplitting>>,
}

impl fmt::Debug for ResolvedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedModel")
            .field("target", &self.target.id())
            .field("indicators", &self.indicators.iter().map(|i| i.id()).collect::<Vec<_>>())
            .field("time_splitting", &self.time_splitting.as_ref().map(|ts| ts.id()))
            .finish()
    }
}

/// Id to factory maps for indicators, targets and time splittings.
pub struct Registry {
    context: FactoryContext,
    indicators: BTreeMap<String, Factory<dyn Indicator>>,
    targets: BTreeMap<String, Factory<dyn Target>>,
    time_splittings: BTreeMap<String, Factory<dyn TimeSplitting>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("indicators", &self.indicators.keys().collect::<Vec<_>>())
            .field("targets", &self.targets.keys().collect::<Vec<_>>())
            .field("time_splittings", &self.time_splittings.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

fn check_id(kind: &str, expected: &str, built: &str) -> Result<()> {
    if expected.is_empty() {
        return Err(Error::config(format!("{kind} id can not be empty")));
    }
    if expected != built {
        return Err(Error::config(format!(
            "{kind} registered as {expected:?} reports id {built:?}"
        )));
    }
    Ok(())
}

fn insert<T: ?Sized>(
    map: &mut BTreeMap<String, Factory<T>>,
    kind: &str,
    id: &str,
    factory: Factory<T>,
) -> Result<()> {
    if map.contains_key(id) {
        return Err(Error::config(format!("{kind} {id:?} is already registered")));
    }
    map.insert(id.to_string(), factory);
    Ok(())
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(context: FactoryContext) -> Self {
        Self {
            context,
            indicators: BTreeMap::new(),
            targets: BTreeMap::new(),
            time_splittings: BTreeMap::new(),
        }
    }

    /// Registry with every built-in calculable and time splitting.
    ///
    /// # Errors
    /// Returns `Error::Config` if a built-in fails registration
    pub fn with_defaults(context: FactoryContext) -> Result<Self> {
        let mut registry = Self::new(context);
        registry.register_indicator(AnyAccessBeforeStart::ID, |ctx| {
            Arc::new(AnyAccessBeforeStart::new(ctx.store.clone()))
        })?;
        registry.register_indicator(AnyAccessAfterEnd::ID, |ctx| {
            Arc::new(AnyAccessAfterEnd::new(ctx.store.clone()))
        })?;
        registry.register_indicator(ReadActions::ID, |ctx| Arc::new(ReadActions::new(ctx.store.clone())))?;
        registry.register_target(NoAccessInLastQuarter::ID, |ctx| {
            let min_score = ctx.config.min_score_for(NoAccessInLastQuarter::ID);
            Arc::new(NoAccessInLastQuarter::new(ctx.store.clone()).with_min_score(min_score))
        })?;
        registry.register_target(EngagementLevel::ID, |ctx| {
            let min_score = ctx.config.min_score_for(EngagementLevel::ID);
            Arc::new(EngagementLevel::new(ctx.store.clone()).with_min_score(min_score))
        })?;
        registry.register_time_splitting("single_range", |_| Arc::new(SingleRange))?;
        registry.register_time_splitting("quarters", |_| Arc::new(Quarters))?;
        registry.register_time_splitting("quarters_accum", |_| Arc::new(QuartersAccum))?;
        Ok(registry)
    }

    /// Collaborators passed to factories.
    #[must_use]
    pub const fn context(&self) -> &FactoryContext {
        &self.context
    }

    /// Register an indicator factory.
    ///
    /// # Errors
    /// Returns `Error::Config` for empty, duplicate or mismatching ids
    pub fn register_indicator<F>(&mut self, id: &str, factory: F) -> Result<()>
    where
        F: Fn(&FactoryContext) -> Arc<dyn Indicator> + Send + Sync + 'static,
    {
        check_id("indicator", id, factory(&self.context).id())?;
        insert(&mut self.indicators, "indicator", id, Box::new(factory))
    }

    /// Register a target factory.
    ///
    /// # Errors
    /// Returns `Error::Config` for empty, duplicate or mismatching ids
    pub fn register_target<F>(&mut self, id: &str, factory: F) -> Result<()>
    where
        F: Fn(&FactoryContext) -> Arc<dyn Target> + Send + Sync + 'static,
    {
        check_id("target", id, factory(&self.context).id())?;
        insert(&mut self.targets, "target", id, Box::new(factory))
    }

    /// Register a time splitting factory.
    ///
    /// # Errors
    /// Returns `Error::Config` for empty, duplicate or mismatching ids
    pub fn register_time_splitting<F>(&mut self, id: &str, factory: F) -> Result<()>
    where
        F: Fn(&FactoryContext) -> Arc<dyn TimeSplitting> + Send + Sync + 'static,
    {
        check_id("time splitting", id, factory(&self.context).id())?;
        insert(&mut self.time_splittings, "time splitting", id, Box::new(factory))
    }

    /// Build an indicator.
    ///
    /// # Errors
    /// Returns `Error::Config` for unknown ids
    pub fn indicator(&self, id: &str) -> Result<Arc<dyn Indicator>> {
        self.indicators
            .get(id)
            .map(|factory| factory(&self.context))
            .ok_or_else(|| Error::config(format!("unknown indicator {id:?}")))
    }

    /// Build a target.
    ///
    /// # Errors
    /// Returns `Error::Config` for unknown ids
    pub fn target(&self, id: &str) -> Result<Arc<dyn Target>> {
        self.targets
            .get(id)
            .map(|factory| factory(&self.context))
            .ok_or_else(|| Error::config(format!("unknown target {id:?}")))
    }

    /// Build a time splitting.
    ///
    /// # Errors
    /// Returns `Error::Config` for unknown ids
    pub fn time_splitting(&self, id: &str) -> Result<Arc<dyn TimeSplitting>> {
        self.time_splittings
            .get(id)
            .map(|factory| factory(&self.context))
            .ok_or_else(|| Error::config(format!("unknown time splitting {id:?}")))
    }

    /// Whether an indicator id is registered.
    #[must_use]
    pub fn has_indicator(&self, id: &str) -> bool {
        self.indicators.contains_key(id)
    }

    /// Whether a time splitting id is registered.
    #[must_use]
    pub fn has_time_splitting(&self, id: &str) -> bool {
        self.time_splittings.contains_key(id)
    }

    /// Time splittings enabled in the pipeline config, in config order.
    ///
    /// # Errors
    /// Returns `Error::Config` if an enabled id is unknown
    pub fn enabled_time_splittings(&self) -> Result<Vec<Arc<dyn TimeSplitting>>> {
        self.context
            .config
            .enabled_time_splittings
            .iter()
            .map(|id| self.time_splitting(id))
            .collect()
    }

    /// Resolve every id of a model definition.
    ///
    /// # Errors
    /// Returns `Error::Config` for unknown ids or an empty indicator set
    pub fn resolve(&self, model: &ModelConfig) -> Result<ResolvedModel> {
        if model.indicators.is_empty() {
            return Err(Error::config("a model needs at least one indicator"));
        }
        let mut ids: Vec<&str> = model.indicators.iter().map(String::as_str).collect();
        ids.sort_unstable();
        ids.dedup();

        Ok(ResolvedModel {
            target: self.target(&model.target)?,
            indicators: ids.into_iter().map(|id| self.indicator(id)).collect::<Result<_>>()?,
            time_splitting: model
                .time_splitting
                .as_deref()
                .map(|id| self.time_splitting(id))
                .transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysable::MemoryActivityStore;

    fn registry() -> Registry {
        let context = FactoryContext::new(Arc::new(MemoryActivityStore::new()), PipelineConfig::default());
        Registry::with_defaults(context).unwrap()
    }

    fn model(target: &str, indicators: &[&str], ts: Option<&str>) -> ModelConfig {
        ModelConfig {
            target: target.to_string(),
            indicators: indicators.iter().map(ToString::to_string).collect(),
            time_splitting: ts.map(ToString::to_string),
        }
    }

    #[test]
    fn test_resolve_orders_and_dedups_indicators() {
        let resolved = registry()
            .resolve(&model(
                "no_access_in_last_quarter",
                &["read_actions", "any_access_after_end", "read_actions"],
                Some("quarters"),
            ))
            .unwrap();
        let ids: Vec<_> = resolved.indicators.iter().map(|i| i.id().to_string()).collect();
        assert_eq!(ids, vec!["any_access_after_end", "read_actions"]);
        assert_eq!(resolved.time_splitting.unwrap().id(), "quarters");
    }

    #[test]
    fn test_unknown_ids_fail_at_load() {
        let registry = registry();
        let err = registry.resolve(&model("nope", &["read_actions"], None)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = registry
            .resolve(&model("engagement_level", &["missing"], None))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = registry
            .resolve(&model("engagement_level", &["read_actions"], Some("weekly")))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = registry.resolve(&model("engagement_level", &[], None)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_registration_checks_ids() {
        let mut registry = registry();
        let err = registry
            .register_time_splitting("weekly", |_| Arc::new(SingleRange))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = registry
            .register_time_splitting("single_range", |_| Arc::new(SingleRange))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_targets_use_configured_min_score() {
        let config = PipelineConfig {
            min_prediction_score: 0.9,
            ..PipelineConfig::default()
        };
        let registry =
            Registry::with_defaults(FactoryContext::new(Arc::new(MemoryActivityStore::new()), config)).unwrap();
        let target = registry.target("no_access_in_last_quarter").unwrap();
        assert!((target.min_prediction_score() - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_target_override_wins_over_global_min_score() {
        let config = PipelineConfig {
            min_prediction_score: 0.9,
            target_min_scores: [(EngagementLevel::ID.to_string(), 0.5)].into_iter().collect(),
            ..PipelineConfig::default()
        };
        let registry =
            Registry::with_defaults(FactoryContext::new(Arc::new(MemoryActivityStore::new()), config)).unwrap();
        let engagement = registry.target(EngagementLevel::ID).unwrap();
        assert!((engagement.min_prediction_score() - 0.5).abs() < f64::EPSILON);
        let dropout = registry.target(NoAccessInLastQuarter::ID).unwrap();
        assert!((dropout.min_prediction_score() - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_enabled_time_splittings_follow_config() {
        let ids: Vec<_> = registry()
            .enabled_time_splittings()
            .unwrap()
            .iter()
            .map(|ts| ts.id().to_string())
            .collect();
        assert_eq!(ids, vec!["single_range", "quarters", "quarters_accum"]);
    }

    #[test]
    fn test_has_ids() {
        let registry = registry();
        assert!(registry.has_indicator("read_actions"));
        assert!(!registry.has_indicator("read_actions/mean"));
        assert!(registry.has_time_splitting("quarters_accum"));
        assert!(!registry.has_time_splitting("weekly"));
    }
}
