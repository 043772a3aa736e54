//! Reliability and validation analysis over coded results.
//!
//! Two entry points:
//! - [`compare`]: inter-rater reliability across two or more coding runs,
//!   computing the full statistically appropriate battery for the declared
//!   measurement level.
//! - [`validate`]: accuracy-style metrics for one coding run against a
//!   gold standard.
//!
//! Both fail fast on bad inputs; missing values are excluded from metric
//! computation with a logged warning.

mod align;
mod compare;
pub mod metrics;
mod validate;

pub use compare::compare;
pub use validate::{validate, GoldStandard};

/// Validation failures for compare/validate operations.
#[derive(Debug, thiserror::Error)]
pub enum ReliabilityError {
    /// Fewer than two coded results were supplied to a comparison.
    #[error("need at least 2 coded results to compare, got {n}")]
    NotEnoughRaters { n: usize },

    /// The `by` field is absent from one or more inputs.
    #[error("field '{field}' not found in {}; available fields: {}",
        runs.join(", "),
        if available.is_empty() { "(none)".to_string() } else { available.join(", ") })]
    MissingField {
        field: String,
        /// Which inputs lack the field.
        runs: Vec<String>,
        /// Fields that do exist across the offending inputs.
        available: Vec<String>,
    },

    /// The unit-id intersection across inputs is empty.
    #[error("no common units across inputs")]
    NoCommonUnits,

    /// Missing-value exclusion left nothing to compute on.
    #[error("no complete cases for field '{field}' after excluding missing values")]
    NoCompleteCases { field: String },

    /// Percent-agreement tolerance must be non-negative.
    #[error("tolerance must be non-negative, got {tolerance}")]
    NegativeTolerance { tolerance: f64 },

    /// The gold standard repeats a unit identifier.
    #[error("duplicate unit id '{id}' in gold standard")]
    DuplicateGoldUnit { id: String },
}

impl ReliabilityError {
    /// Short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotEnoughRaters { .. } => "not_enough_raters",
            Self::MissingField { .. } => "missing_field",
            Self::NoCommonUnits => "no_common_units",
            Self::NoCompleteCases { .. } => "no_complete_cases",
            Self::NegativeTolerance { .. } => "negative_tolerance",
            Self::DuplicateGoldUnit { .. } => "duplicate_gold_unit",
        }
    }
}
