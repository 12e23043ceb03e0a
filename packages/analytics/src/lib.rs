#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Socioeconomic clustering of neighbourhoods.
//!
//! Standardizes the four census indicators, fits K-means and
//! Gaussian-mixture models over a set of candidate cluster counts, scores
//! every fit with internal validation metrics, and, once the analyst has
//! chosen a configuration, ranks its clusters into ordinal opportunity
//! tiers and tabulates crime trends per tier.
//!
//! All algorithms are implemented directly on `ndarray` matrices and are
//! deterministic for a given [`AnalysisConfig::seed`](crime_trends_analytics_models::AnalysisConfig).

pub mod config;
pub mod engine;
pub mod kmeans;
pub mod label;
pub mod linalg;
pub mod mixture;
pub mod progress;
pub mod reduce;
pub mod select;
pub mod standardize;
pub mod summary;
pub mod trends;
pub mod validate;

use crime_trends_analytics_models::Candidate;
use thiserror::Error;

/// Errors that can occur during analytics operations.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// A feature column cannot be standardized.
    #[error("Degenerate feature '{feature}': {reason}")]
    DegenerateFeature {
        /// Feature column name.
        feature: String,
        /// Why the column was rejected.
        reason: String,
    },

    /// The requested cluster count is outside `2..N`.
    #[error("Invalid cluster count K = {k} for {n} observations (requires 2 <= K < N)")]
    InvalidK {
        /// Requested cluster count.
        k: usize,
        /// Number of observations.
        n: usize,
    },

    /// Two clusters' composite opportunity scores are indistinguishable.
    #[error(
        "Ambiguous opportunity ranking: clusters {first} and {second} have composite scores {first_score} and {second_score}"
    )]
    AmbiguousRanking {
        /// First tied cluster id.
        first: usize,
        /// Second tied cluster id.
        second: usize,
        /// Composite score of `first`.
        first_score: f64,
        /// Composite score of `second`.
        second_score: f64,
    },

    /// A validation score is mathematically undefined for this assignment.
    #[error("{metric} is undefined: {reason}")]
    UndefinedScore {
        /// Metric name.
        metric: &'static str,
        /// Why it is undefined.
        reason: String,
    },

    /// Clusters overlap so completely that a score would divide by zero.
    #[error("Degenerate clusters for {metric}: {reason}")]
    DegenerateClusters {
        /// Metric name.
        metric: &'static str,
        /// What collapsed.
        reason: String,
    },

    /// A mixture component's covariance lost positive definiteness.
    #[error("Covariance of mixture component {component} is not positive definite")]
    SingularCovariance {
        /// Component index.
        component: usize,
    },

    /// A neighbourhood lacks a crime rate its cluster peers report.
    #[error("Missing value for column '{column}' in neighbourhood '{neighbourhood}'")]
    MissingRate {
        /// Rate column name.
        column: String,
        /// Neighbourhood without the value.
        neighbourhood: String,
    },

    /// The selected configuration was never fitted and scored.
    #[error("Configuration {0} was not evaluated")]
    UnknownCandidate(Candidate),

    /// Input dimensions do not line up.
    #[error("Shape error: {message}")]
    Shape {
        /// Description of the mismatch.
        message: String,
    },

    /// The analysis configuration is invalid.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },

    /// Reading a configuration file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration file is not valid TOML for [`AnalysisConfig`](crime_trends_analytics_models::AnalysisConfig).
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
