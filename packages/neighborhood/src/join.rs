//! One-to-one join of the crime and profile tables.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;

use crime_trends_neighborhood_models::{CrimeHistory, NeighbourhoodRecord, SocioeconomicProfile};

use crate::parse::RawTable;
use crate::{FeatureTable, JoinMismatch, NeighborhoodError};

/// Reads the crime and profile CSV tables and joins them.
///
/// # Errors
///
/// Returns an error if either table fails to parse, or
/// [`NeighborhoodError::JoinCardinality`] if the join is not one-to-one
/// or does not produce `expected` rows.
pub fn join_tables<C: Read, P: Read>(
    crime: C,
    profiles: P,
    expected: Option<usize>,
) -> Result<FeatureTable, NeighborhoodError> {
    let crime = RawTable::read(crime, "crime")?.crime_histories()?;
    let profiles = RawTable::read(profiles, "profile")?.profiles()?;
    join_records(crime, profiles, expected)
}

/// Joins parsed crime histories with census profiles on the neighbourhood
/// name.
///
/// Rows keep the crime table's order. Every name must appear exactly once
/// on each side.
///
/// # Errors
///
/// Returns [`NeighborhoodError::JoinCardinality`] listing every duplicate
/// and unmatched name, or the row-count mismatch, if the join is not
/// clean.
pub fn join_records(
    crime: Vec<(String, CrimeHistory)>,
    profiles: Vec<(String, SocioeconomicProfile)>,
    expected: Option<usize>,
) -> Result<FeatureTable, NeighborhoodError> {
    let mut mismatch = JoinMismatch {
        duplicate_crime: duplicates(crime.iter().map(|(n, _)| n.as_str())),
        duplicate_profile: duplicates(profiles.iter().map(|(n, _)| n.as_str())),
        expected,
        ..JoinMismatch::default()
    };

    let mut by_name: BTreeMap<String, SocioeconomicProfile> = profiles.into_iter().collect();
    let crime_names: BTreeSet<String> = crime.iter().map(|(n, _)| n.clone()).collect();

    mismatch.unmatched_profile = by_name
        .keys()
        .filter(|name| !crime_names.contains(*name))
        .cloned()
        .collect();

    let mut records = Vec::with_capacity(crime.len());
    for (neighbourhood, history) in crime {
        match by_name.remove(&neighbourhood) {
            Some(profile) => records.push(NeighbourhoodRecord {
                neighbourhood,
                profile,
                crime: history,
            }),
            None => {
                // Second occurrences of a duplicate land here too; they are
                // already reported as duplicates.
                if !mismatch.duplicate_crime.contains(&neighbourhood) {
                    mismatch.unmatched_crime.push(neighbourhood);
                }
            }
        }
    }
    mismatch.actual = records.len();

    if !mismatch.is_clean() {
        log::error!("Crime/profile join rejected: {mismatch}");
        return Err(NeighborhoodError::JoinCardinality(mismatch));
    }

    log::info!("Joined {} neighbourhoods", records.len());
    Ok(FeatureTable::new(records))
}

/// Names occurring more than once, sorted and deduplicated.
fn duplicates<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut dups = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            dups.insert(name.to_string());
        }
    }
    dups.into_iter().collect()
}
