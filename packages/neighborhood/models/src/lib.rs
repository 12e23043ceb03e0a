#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Neighbourhood record types.
//!
//! A [`NeighbourhoodRecord`] is one row of the merged analysis table: the
//! census [`SocioeconomicProfile`] of a neighbourhood joined with its
//! [`CrimeHistory`] for the study period. The four clustering inputs are
//! enumerated by [`SesFeature`].

use crime_trends_crime_models::CrimeType;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Name of the join key column shared by the crime and profile tables.
pub const NEIGHBOURHOOD_COLUMN: &str = "neighbourhood";

/// One of the four socioeconomic indicators used as clustering features.
///
/// The declaration order is the column order of the feature matrix.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SesFeature {
    /// Median household income.
    MedianIncome,
    /// Share of adults with a bachelor's degree or higher.
    EducationRate,
    /// Share of the labour force that is unemployed.
    UnemploymentRate,
    /// Share of families headed by a single parent.
    #[serde(rename = "prop_single_parent")]
    #[strum(serialize = "prop_single_parent")]
    SingleParentRate,
}

impl SesFeature {
    /// All features in feature-matrix column order.
    pub const ALL: [Self; 4] = [
        Self::MedianIncome,
        Self::EducationRate,
        Self::UnemploymentRate,
        Self::SingleParentRate,
    ];

    /// Direction in which this feature moves the opportunity composite:
    /// `+1.0` when a higher value means more opportunity, `-1.0` otherwise.
    #[must_use]
    pub const fn opportunity_sign(self) -> f64 {
        match self {
            Self::MedianIncome | Self::EducationRate => 1.0,
            Self::UnemploymentRate | Self::SingleParentRate => -1.0,
        }
    }

    /// Column index of this feature in the feature matrix.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Raw census counts for a neighbourhood, as read from the profile table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileCounts {
    /// Total private households.
    pub total_households: u32,
    /// Census families headed by one parent.
    pub one_parent_families: u32,
    /// Census families headed by two parents.
    pub two_parent_families: u32,
    /// Median household income (dollars).
    pub median_income: f64,
    /// Unemployment rate of the labour force.
    pub unemployment_rate: f64,
    /// Population aged 25-64 covered by the education question.
    pub total_education: u32,
    /// Of `total_education`, those with a bachelor's degree or higher.
    pub bachelors_or_higher: u32,
}

/// Error returned when a derived rate cannot be computed from
/// [`ProfileCounts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDerivationError {
    /// Derived column that could not be computed.
    pub column: &'static str,
    /// Why the derivation failed.
    pub reason: &'static str,
}

impl std::fmt::Display for ProfileDerivationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot derive {}: {}", self.column, self.reason)
    }
}

impl std::error::Error for ProfileDerivationError {}

/// Socioeconomic profile of a neighbourhood with its derived rates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SocioeconomicProfile {
    /// Raw census counts.
    pub counts: ProfileCounts,
    /// `one_parent_families / (one_parent_families + two_parent_families)`.
    pub prop_single_parent: f64,
    /// `bachelors_or_higher / total_education`.
    pub education_rate: f64,
}

impl SocioeconomicProfile {
    /// Derives the rate columns from raw counts.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileDerivationError`] if a denominator is zero, a
    /// numerator exceeds its denominator, or the income/unemployment values
    /// are not finite non-negative numbers.
    pub fn from_counts(counts: ProfileCounts) -> Result<Self, ProfileDerivationError> {
        let families =
            u64::from(counts.one_parent_families) + u64::from(counts.two_parent_families);
        if families == 0 {
            return Err(ProfileDerivationError {
                column: "prop_single_parent",
                reason: "neighbourhood has no census families",
            });
        }
        if counts.total_education == 0 {
            return Err(ProfileDerivationError {
                column: "education_rate",
                reason: "total_education is zero",
            });
        }
        if counts.bachelors_or_higher > counts.total_education {
            return Err(ProfileDerivationError {
                column: "education_rate",
                reason: "bachelors_or_higher exceeds total_education",
            });
        }
        if !counts.median_income.is_finite() || counts.median_income < 0.0 {
            return Err(ProfileDerivationError {
                column: "median_income",
                reason: "must be a finite non-negative number",
            });
        }
        if !counts.unemployment_rate.is_finite() || counts.unemployment_rate < 0.0 {
            return Err(ProfileDerivationError {
                column: "unemployment_rate",
                reason: "must be a finite non-negative number",
            });
        }

        Ok(Self {
            counts,
            prop_single_parent: f64::from(counts.one_parent_families)
                / (f64::from(counts.one_parent_families) + f64::from(counts.two_parent_families)),
            education_rate: f64::from(counts.bachelors_or_higher)
                / f64::from(counts.total_education),
        })
    }

    /// Returns the raw value of a clustering feature.
    #[must_use]
    pub const fn feature(&self, feature: SesFeature) -> f64 {
        match feature {
            SesFeature::MedianIncome => self.counts.median_income,
            SesFeature::EducationRate => self.education_rate,
            SesFeature::UnemploymentRate => self.counts.unemployment_rate,
            SesFeature::SingleParentRate => self.prop_single_parent,
        }
    }
}

/// Crime count and rate for one (crime type, year) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrimeObservation {
    /// Crime type.
    pub crime: CrimeType,
    /// Calendar year.
    pub year: u16,
    /// Raw incident count, when the source table publishes one.
    pub count: Option<u32>,
    /// Incidents per 100,000 residents.
    pub rate: f64,
}

/// All crime observations for a neighbourhood.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrimeHistory {
    observations: Vec<CrimeObservation>,
}

impl CrimeHistory {
    /// Builds a history, keeping observations sorted by (crime, year).
    ///
    /// Later duplicates of the same (crime, year) pair replace earlier ones.
    #[must_use]
    pub fn new(observations: impl IntoIterator<Item = CrimeObservation>) -> Self {
        let mut history = Self::default();
        for obs in observations {
            history.insert(obs);
        }
        history
    }

    /// Inserts or replaces an observation.
    pub fn insert(&mut self, obs: CrimeObservation) {
        match self
            .observations
            .binary_search_by(|o| (o.crime, o.year).cmp(&(obs.crime, obs.year)))
        {
            Ok(idx) => self.observations[idx] = obs,
            Err(idx) => self.observations.insert(idx, obs),
        }
    }

    /// Looks up the observation for a (crime, year) pair.
    #[must_use]
    pub fn get(&self, crime: CrimeType, year: u16) -> Option<&CrimeObservation> {
        self.observations
            .binary_search_by(|o| (o.crime, o.year).cmp(&(crime, year)))
            .ok()
            .map(|idx| &self.observations[idx])
    }

    /// Rate per 100k for a (crime, year) pair.
    #[must_use]
    pub fn rate(&self, crime: CrimeType, year: u16) -> Option<f64> {
        self.get(crime, year).map(|o| o.rate)
    }

    /// Iterates observations in (crime, year) order.
    pub fn iter(&self) -> impl Iterator<Item = &CrimeObservation> {
        self.observations.iter()
    }

    /// Number of observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Whether the history holds no observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// One row of the merged analysis table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighbourhoodRecord {
    /// Neighbourhood name; the join key between the crime and profile
    /// tables.
    pub neighbourhood: String,
    /// Census socioeconomic profile.
    pub profile: SocioeconomicProfile,
    /// Crime counts and rates for the study period.
    pub crime: CrimeHistory,
}

impl NeighbourhoodRecord {
    /// Raw clustering feature values in [`SesFeature::ALL`] order.
    #[must_use]
    pub fn feature_vector(&self) -> [f64; 4] {
        SesFeature::ALL.map(|f| self.profile.feature(f))
    }
}
