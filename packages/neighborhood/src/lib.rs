#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Neighbourhood feature table construction.
//!
//! Reads the cleaned neighbourhood crime table and census profile table,
//! joins them one-to-one on the neighbourhood name, and produces the
//! [`FeatureTable`] consumed by the clustering core. Also provides a
//! seeded simulator that produces a table of the same shape for
//! exercising the pipeline without the real data.

pub mod join;
pub mod parse;
pub mod simulate;
pub mod table;

use std::fmt;

pub use join::join_tables;
pub use table::{FeatureTable, PlausibilityWarning};

use thiserror::Error;

/// Identifiers that broke the one-to-one join between the crime and
/// profile tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinMismatch {
    /// Names appearing more than once in the crime table.
    pub duplicate_crime: Vec<String>,
    /// Names appearing more than once in the profile table.
    pub duplicate_profile: Vec<String>,
    /// Crime-table names with no profile row.
    pub unmatched_crime: Vec<String>,
    /// Profile-table names with no crime row.
    pub unmatched_profile: Vec<String>,
    /// Number of neighbourhoods the study area is expected to have.
    pub expected: Option<usize>,
    /// Number of rows the join produced.
    pub actual: usize,
}

impl JoinMismatch {
    /// Whether the join satisfied every cardinality constraint.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.duplicate_crime.is_empty()
            && self.duplicate_profile.is_empty()
            && self.unmatched_crime.is_empty()
            && self.unmatched_profile.is_empty()
            && self.expected.is_none_or(|e| e == self.actual)
    }
}

impl fmt::Display for JoinMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.duplicate_crime.is_empty() {
            parts.push(format!("duplicate crime rows {:?}", self.duplicate_crime));
        }
        if !self.duplicate_profile.is_empty() {
            parts.push(format!("duplicate profile rows {:?}", self.duplicate_profile));
        }
        if !self.unmatched_crime.is_empty() {
            parts.push(format!("crime rows without profile {:?}", self.unmatched_crime));
        }
        if !self.unmatched_profile.is_empty() {
            parts.push(format!(
                "profile rows without crime data {:?}",
                self.unmatched_profile
            ));
        }
        match self.expected {
            Some(expected) if expected != self.actual => parts.push(format!(
                "expected {expected} neighbourhoods, found {}",
                self.actual
            )),
            _ => {}
        }
        write!(f, "{}", parts.join("; "))
    }
}

/// Errors that can occur while building the feature table.
#[derive(Debug, Error)]
pub enum NeighborhoodError {
    /// File I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reading or writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A required column is absent from a table header.
    #[error("{table} table is missing required column '{column}'")]
    MissingColumn {
        /// Which input table.
        table: &'static str,
        /// Column name.
        column: String,
    },

    /// A required cell is empty.
    #[error("Missing value in column '{column}' for neighbourhood '{neighbourhood}'")]
    MissingValue {
        /// Column name.
        column: String,
        /// Row identifier.
        neighbourhood: String,
    },

    /// A cell could not be parsed or is out of its domain.
    #[error("Invalid value '{value}' in column '{column}' for neighbourhood '{neighbourhood}': {reason}")]
    InvalidValue {
        /// Column name.
        column: String,
        /// Row identifier.
        neighbourhood: String,
        /// Raw cell contents.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The crime/profile join was not one-to-one.
    #[error("Join cardinality violated: {0}")]
    JoinCardinality(JoinMismatch),

    /// Simulation parameters were invalid.
    #[error("Simulation error: {message}")]
    Simulation {
        /// Description of what went wrong.
        message: String,
    },
}
