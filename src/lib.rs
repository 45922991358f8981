//! # Analytics Pipeline: Predictive Analytics over Activity Logs
//!
//! Turns time-stamped activity records of analysables (courses) into
//! labelled and unlabelled feature datasets, and drives an external
//! predictor through evaluate, train and predict runs.
//!
//! ## Pipeline
//!
//! ```text
//! ActivityStore ─► BoundaryEstimator ─► Analysable (start, end)
//!                                            │
//! Analyser ─► samples ─► TimeSplitting ranges ─► Indicators / Target
//!                                            │
//!                     DatasetManager (lock, store, merge)
//!                                            │
//!                     Model (evaluate | train | predict) ─► Predictor
//! ```
//!
//! ## Example
//!
//! ```rust
//! use analytics_pipeline::analysable::{BoundaryEstimator, BoundarySettings, Course, LogRecord, MemoryActivityStore};
//! use analytics_pipeline::analysable::Analysable;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryActivityStore::new());
//! store.extend([LogRecord::new(1, 7, 1_000), LogRecord::new(1, 7, 5_000)]);
//!
//! let estimator = BoundaryEstimator::new(store, BoundarySettings::default());
//! let course = Course::builder(1, estimator).students([7]).now(10_000_000).build();
//! assert_eq!(course.start()?, 1_000);
//! # Ok::<(), analytics_pipeline::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod analysable;
pub mod analyser;
pub mod calculable;
pub mod config;
pub mod dataset;
pub mod error;
pub mod indicator;
pub mod logging;
pub mod model;
pub mod registry;
pub mod target;
pub mod time_splitting;

pub use error::{Error, Result};
