//! The merged, row-per-neighbourhood feature table.

use std::io::{Read, Write};

use crime_trends_crime_models::{CrimeType, study_years};
use crime_trends_neighborhood_models::{NEIGHBOURHOOD_COLUMN, NeighbourhoodRecord, SesFeature};

use crate::NeighborhoodError;
use crate::join::join_records;
use crate::parse::RawTable;

/// Upper bound (exclusive) for a plausible rate per 100k residents.
pub const MAX_PLAUSIBLE_RATE: f64 = 10_000.0;

/// Plausible bounds for the single-parent family share.
pub const SINGLE_PARENT_BOUNDS: (f64, f64) = (0.05, 0.55);

/// A row-per-neighbourhood table of census profiles and crime histories.
///
/// Constructed only through the join (or the simulator), so every
/// neighbourhood name is unique and every required column is populated.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    records: Vec<NeighbourhoodRecord>,
}

/// A value that parsed correctly but looks implausible for the study area.
#[derive(Debug, Clone, PartialEq)]
pub struct PlausibilityWarning {
    /// Offending neighbourhood.
    pub neighbourhood: String,
    /// Offending column.
    pub column: String,
    /// Offending value.
    pub value: f64,
    /// Why it was flagged.
    pub reason: &'static str,
}

impl std::fmt::Display for PlausibilityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} = {}: {}",
            self.neighbourhood, self.column, self.value, self.reason
        )
    }
}

impl FeatureTable {
    pub(crate) const fn new(records: Vec<NeighbourhoodRecord>) -> Self {
        Self { records }
    }

    /// Reads a merged table (profile and crime columns in one file).
    ///
    /// # Errors
    ///
    /// Returns an error if the CSV is malformed, a required column or
    /// value is missing, or neighbourhood names are not unique.
    pub fn from_merged_csv<R: Read>(
        reader: R,
        expected: Option<usize>,
    ) -> Result<Self, NeighborhoodError> {
        let table = RawTable::read(reader, "merged")?;
        let profiles = table.profiles()?;
        let crime = table.crime_histories()?;
        join_records(crime, profiles, expected)
    }

    /// All records in table order.
    #[must_use]
    pub fn records(&self) -> &[NeighbourhoodRecord] {
        &self.records
    }

    /// Number of neighbourhoods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Neighbourhood names in table order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.neighbourhood.as_str())
    }

    /// Raw clustering features, one row per neighbourhood, columns in
    /// [`SesFeature::ALL`] order.
    #[must_use]
    pub fn feature_rows(&self) -> Vec<[f64; 4]> {
        self.records
            .iter()
            .map(NeighbourhoodRecord::feature_vector)
            .collect()
    }

    /// Writes the table in merged-CSV layout: profile columns first, then
    /// count/rate column pairs per crime type and year.
    ///
    /// A crime column is written only when every neighbourhood has a value
    /// for it.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_merged_csv<W: Write>(&self, writer: W) -> Result<(), NeighborhoodError> {
        let mut crime_columns = Vec::new();
        for &crime in CrimeType::all() {
            for year in study_years() {
                let obs: Vec<_> = self
                    .records
                    .iter()
                    .map(|r| r.crime.get(crime, year))
                    .collect();
                if self.records.is_empty() || obs.iter().any(Option::is_none) {
                    continue;
                }
                let has_counts = obs.iter().flatten().all(|o| o.count.is_some());
                crime_columns.push((crime, year, has_counts));
            }
        }

        let mut header = vec![
            NEIGHBOURHOOD_COLUMN.to_string(),
            "total_households".to_string(),
            "two_parent_families".to_string(),
            "one_parent_families".to_string(),
            SesFeature::SingleParentRate.to_string(),
            SesFeature::MedianIncome.to_string(),
            SesFeature::UnemploymentRate.to_string(),
            "total_education".to_string(),
            "bachelors_or_higher".to_string(),
            SesFeature::EducationRate.to_string(),
        ];
        for (crime, year, has_counts) in &crime_columns {
            if *has_counts {
                header.push(crime.count_column(*year));
            }
            header.push(crime.rate_column(*year));
        }

        let mut out = csv::Writer::from_writer(writer);
        out.write_record(&header)?;

        for record in &self.records {
            let p = &record.profile;
            let mut row = vec![
                record.neighbourhood.clone(),
                p.counts.total_households.to_string(),
                p.counts.two_parent_families.to_string(),
                p.counts.one_parent_families.to_string(),
                p.prop_single_parent.to_string(),
                p.counts.median_income.to_string(),
                p.counts.unemployment_rate.to_string(),
                p.counts.total_education.to_string(),
                p.counts.bachelors_or_higher.to_string(),
                p.education_rate.to_string(),
            ];
            for (crime, year, has_counts) in &crime_columns {
                let Some(obs) = record.crime.get(*crime, *year) else {
                    continue;
                };
                if *has_counts {
                    row.push(obs.count.map(|c| c.to_string()).unwrap_or_default());
                }
                row.push(obs.rate.to_string());
            }
            out.write_record(&row)?;
        }

        out.flush()?;
        Ok(())
    }

    /// Checks values that parse but fall outside what the study area
    /// plausibly produces. Each warning is also logged.
    #[must_use]
    pub fn check_plausibility(&self) -> Vec<PlausibilityWarning> {
        let mut warnings = Vec::new();

        for record in &self.records {
            let share = record.profile.prop_single_parent;
            if share < SINGLE_PARENT_BOUNDS.0 || share > SINGLE_PARENT_BOUNDS.1 {
                warnings.push(PlausibilityWarning {
                    neighbourhood: record.neighbourhood.clone(),
                    column: SesFeature::SingleParentRate.to_string(),
                    value: share,
                    reason: "single-parent share outside plausible bounds",
                });
            }

            for obs in record.crime.iter() {
                if obs.rate >= MAX_PLAUSIBLE_RATE {
                    warnings.push(PlausibilityWarning {
                        neighbourhood: record.neighbourhood.clone(),
                        column: obs.crime.rate_column(obs.year),
                        value: obs.rate,
                        reason: "rate per 100k is implausibly high",
                    });
                }
                if obs.count == Some(0) && obs.rate > 0.0 {
                    warnings.push(PlausibilityWarning {
                        neighbourhood: record.neighbourhood.clone(),
                        column: obs.crime.rate_column(obs.year),
                        value: obs.rate,
                        reason: "non-zero rate with a zero count",
                    });
                }
            }
        }

        for warning in &warnings {
            log::warn!("Implausible value: {warning}");
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use crime_trends_neighborhood_models::{
        CrimeHistory, CrimeObservation, ProfileCounts, SocioeconomicProfile,
    };

    use super::*;

    fn record(name: &str, one_parent: u32, rate: f64, count: Option<u32>) -> NeighbourhoodRecord {
        let profile = SocioeconomicProfile::from_counts(ProfileCounts {
            total_households: 2000,
            one_parent_families: one_parent,
            two_parent_families: 1000 - one_parent,
            median_income: 80_000.0,
            unemployment_rate: 0.06,
            total_education: 1000,
            bachelors_or_higher: 400,
        })
        .unwrap();

        let mut observations = Vec::new();
        for &crime in CrimeType::analyzed() {
            for year in study_years() {
                observations.push(CrimeObservation {
                    crime,
                    year,
                    count,
                    rate,
                });
            }
        }

        NeighbourhoodRecord {
            neighbourhood: name.to_string(),
            profile,
            crime: CrimeHistory::new(observations),
        }
    }

    #[test]
    fn merged_csv_round_trips_through_the_parser() {
        let table = FeatureTable::new(vec![
            record("Annex", 200, 150.5, Some(12)),
            record("Rexdale", 450, 410.0, Some(40)),
        ]);

        let mut buf = Vec::new();
        table.write_merged_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.starts_with("neighbourhood,total_households"));
        assert!(header.contains("assault_2019,assault_rate_2019"));
        assert!(!header.contains("homicide"));

        let parsed = FeatureTable::from_merged_csv(buf.as_slice(), Some(2)).unwrap();
        assert_eq!(parsed, table);
    }

    #[test]
    fn feature_rows_follow_feature_order() {
        let table = FeatureTable::new(vec![record("Annex", 250, 1.0, None)]);
        let rows = table.feature_rows();
        assert_eq!(rows.len(), 1);
        assert!((rows[0][SesFeature::MedianIncome.index()] - 80_000.0).abs() < 1e-9);
        assert!((rows[0][SesFeature::EducationRate.index()] - 0.4).abs() < 1e-12);
        assert!((rows[0][SesFeature::UnemploymentRate.index()] - 0.06).abs() < 1e-12);
        assert!((rows[0][SesFeature::SingleParentRate.index()] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn duplicate_rows_in_merged_csv_are_rejected() {
        let table = FeatureTable::new(vec![
            record("Annex", 200, 1.0, Some(1)),
            record("Annex", 200, 1.0, Some(1)),
        ]);
        let mut buf = Vec::new();
        table.write_merged_csv(&mut buf).unwrap();
        let err = FeatureTable::from_merged_csv(buf.as_slice(), None).unwrap_err();
        assert!(matches!(err, NeighborhoodError::JoinCardinality(_)));
    }

    #[test]
    fn plausibility_flags_outliers() {
        let table = FeatureTable::new(vec![
            record("Fine", 200, 300.0, Some(10)),
            record("SingleParents", 700, 300.0, Some(10)),
            record("HighRate", 200, 12_000.0, Some(10)),
            record("ZeroCount", 200, 5.0, Some(0)),
        ]);
        let warnings = table.check_plausibility();
        let flagged: std::collections::BTreeSet<_> =
            warnings.iter().map(|w| w.neighbourhood.as_str()).collect();
        assert!(!flagged.contains("Fine"));
        assert!(flagged.contains("SingleParents"));
        assert!(flagged.contains("HighRate"));
        assert!(flagged.contains("ZeroCount"));
    }
}
