#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Crime type taxonomy and study-period definitions.
//!
//! The municipal neighbourhood crime dataset publishes one count column and
//! one rate-per-100k column for every (crime type, year) pair. This crate
//! owns the canonical crime types, the study years, and the column naming
//! scheme (`assault_2019`, `assault_rate_2019`, ...) shared by every other
//! crate in the workspace.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// First year covered by the study period.
pub const FIRST_YEAR: u16 = 2019;

/// Last year (inclusive) covered by the study period.
pub const LAST_YEAR: u16 = 2024;

/// Rates are published per this many residents.
pub const RATE_PER: f64 = 100_000.0;

/// Returns every year in the study period, in ascending order.
#[must_use]
pub fn study_years() -> Vec<u16> {
    (FIRST_YEAR..=LAST_YEAR).collect()
}

/// A crime type published in the neighbourhood crime rates dataset.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CrimeType {
    /// Assault (all levels)
    Assault,
    /// Break and enter
    BreakEnter,
    /// Robbery
    Robbery,
    /// Shootings and firearm discharges
    Shooting,
    /// Homicide
    Homicide,
}

impl CrimeType {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Assault,
            Self::BreakEnter,
            Self::Robbery,
            Self::Shooting,
            Self::Homicide,
        ]
    }

    /// Crime types whose trajectories are compared across opportunity
    /// clusters. Homicide counts are too sparse at the neighbourhood level
    /// and are carried through the merge but not analysed.
    #[must_use]
    pub const fn analyzed() -> &'static [Self] {
        &[Self::Assault, Self::BreakEnter, Self::Robbery, Self::Shooting]
    }

    /// Human-readable title (e.g., "Break and Enter").
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Assault => "Assault",
            Self::BreakEnter => "Break and Enter",
            Self::Robbery => "Robbery",
            Self::Shooting => "Shooting",
            Self::Homicide => "Homicide",
        }
    }

    /// Name of the raw count column for `year` (e.g., `assault_2019`).
    #[must_use]
    pub fn count_column(self, year: u16) -> String {
        format!("{}_{year}", self.as_ref())
    }

    /// Name of the rate-per-100k column for `year` (e.g.,
    /// `assault_rate_2019`).
    #[must_use]
    pub fn rate_column(self, year: u16) -> String {
        format!("{}_rate_{year}", self.as_ref())
    }

    /// Baseline incidence per 1,000 residents used when simulating counts.
    #[must_use]
    pub const fn simulated_incidence_per_thousand(self) -> f64 {
        match self {
            Self::Assault => 8.0,
            Self::Robbery => 4.0,
            Self::BreakEnter => 2.0,
            Self::Shooting => 0.075,
            Self::Homicide => 0.025,
        }
    }
}

/// Converts a raw incident count into a rate per 100,000 residents.
///
/// Returns `None` when the population is zero.
#[must_use]
pub fn rate_per_100k(count: u32, population: u32) -> Option<f64> {
    if population == 0 {
        return None;
    }
    Some(f64::from(count) / f64::from(population) * RATE_PER)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use super::*;

    #[test]
    fn analyzed_is_subset_of_all() {
        for crime in CrimeType::analyzed() {
            assert!(
                CrimeType::all().contains(crime),
                "{crime:?} is analysed but missing from all()"
            );
        }
        assert!(!CrimeType::analyzed().contains(&CrimeType::Homicide));
    }

    #[test]
    fn column_names_match_dataset_scheme() {
        assert_eq!(CrimeType::Assault.count_column(2019), "assault_2019");
        assert_eq!(CrimeType::BreakEnter.rate_column(2024), "breakenter_rate_2024");
        assert_eq!(CrimeType::Shooting.rate_column(2021), "shooting_rate_2021");
    }

    #[test]
    fn parses_from_lowercase_names() {
        assert_eq!(CrimeType::from_str("breakenter").unwrap(), CrimeType::BreakEnter);
        assert_eq!(CrimeType::from_str("robbery").unwrap(), CrimeType::Robbery);
        assert!(CrimeType::from_str("arson").is_err());
    }

    #[test]
    fn study_period_is_six_years() {
        let years = study_years();
        assert_eq!(years.len(), 6);
        assert_eq!(years.first(), Some(&2019));
        assert_eq!(years.last(), Some(&2024));
    }

    #[test]
    fn rate_conversion() {
        assert!((rate_per_100k(25, 10_000).unwrap() - 250.0).abs() < 1e-12);
        assert!(rate_per_100k(3, 0).is_none());
    }
}
