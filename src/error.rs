//! Error types for the analytics pipeline
//!
//! Two channels are kept apart:
//! - [`Error`] for failures the caller has to deal with (configuration,
//!   storage, duplicate predictions, lock timeouts) and for contract
//!   violations, which are programmer errors and carry a [`ContractViolation`].
//! - Status values ([`crate::model::ProcessStatus`], [`crate::analysable::EndEstimate`])
//!   for expected business outcomes such as "no dataset".

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Analytics pipeline error types
#[derive(Error, Debug)]
pub enum Error {
    /// Missing target, indicators or time splitting, or an invalid setting
    #[error("Configuration error: {0}")]
    Config(String),

    /// A calculable broke its contract. Not recoverable at runtime.
    #[error("Contract violation: {0}\nThis is a programming error, please report it.")]
    Contract(ContractViolation),

    /// The artifact was already consumed by a predict run of this model
    #[error("Artifact {artifact} was already used for prediction by model {model_id}")]
    AlreadyPredicted {
        /// Model that already predicted on the artifact
        model_id: u64,
        /// Artifact identifier
        artifact: String,
    },

    /// Dataset lock could not be acquired in time
    #[error("Timed out waiting for dataset lock {0}")]
    LockTimeout(String),

    /// Unknown identifier or missing record
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Artifact storage or parse error
    #[error("Storage error: {0}")]
    Storage(String),

    /// The external predictor could not be reached
    #[error("Predictor error: {0}")]
    Predictor(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Calculation contract violations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContractViolation {
    /// Linear target value outside `[min, max]`
    #[error("calculated value {value} of {calculable} is outside [{min}, {max}]")]
    OutOfRange {
        /// Calculable id
        calculable: String,
        /// Offending value
        value: f64,
        /// Domain minimum
        min: f64,
        /// Domain maximum
        max: f64,
    },

    /// Discrete target value not in the declared class set
    #[error("calculated value {value} of {calculable} is not one of the classes {classes:?}")]
    UnknownClass {
        /// Calculable id
        calculable: String,
        /// Offending value
        value: f64,
        /// Declared classes
        classes: Vec<f64>,
    },

    /// No range predicate matched the value
    #[error("value {0} can not be fit into any of the provided ranges, ranges must cover all possible values")]
    UnclassifiedValue(f64),

    /// Range classification needs at least two ranges
    #[error("range classification needs at least 2 ranges, {0} provided")]
    TooFewRanges(usize),

    /// Range tuple is not a `(predicate, value)` pair
    #[error("malformed range {0}, expected a (predicate, value) pair")]
    MalformedRange(String),

    /// Predicate is not one of eq, ne, lt, le, gt, ge
    #[error("unrecognised predicate {0}, use eq, ne, lt, le, gt or ge")]
    UnknownPredicate(String),

    /// A time range whose end is not after its start
    #[error("end time {end} should be greater than start time {start}")]
    EmptyTimeRange {
        /// Range start
        start: i64,
        /// Range end
        end: i64,
    },
}

impl From<ContractViolation> for Error {
    fn from(violation: ContractViolation) -> Self {
        Self::Contract(violation)
    }
}

impl Error {
    /// Build a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Build a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Build an invalid-input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether this error is a contract violation (programmer error).
    #[must_use]
    pub const fn is_contract_violation(&self) -> bool {
        matches!(self, Self::Contract(_))
    }
}
