//! Seeded simulation of a merged neighbourhood table.
//!
//! Produces a table with the same columns and plausible value ranges as
//! the real merged data so the pipeline can be exercised end to end
//! without downloading anything. A latent disadvantage score per
//! neighbourhood shifts income, education, unemployment, single-parent
//! share, and crime incidence together, which gives the clustering step
//! real structure to find.

use crime_trends_crime_models::{CrimeType, rate_per_100k, study_years};
use crime_trends_neighborhood_models::{
    CrimeHistory, CrimeObservation, NeighbourhoodRecord, ProfileCounts, SocioeconomicProfile,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Beta, Distribution, Normal, Poisson, StandardNormal};

use crate::{FeatureTable, NeighborhoodError};

/// Number of neighbourhoods in the City of Toronto's 158-neighbourhood
/// model.
pub const TORONTO_NEIGHBOURHOODS: usize = 158;

/// Seed used by default so simulated tables are reproducible.
pub const DEFAULT_SEED: u64 = 838;

/// Parameters for [`simulate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationParams {
    /// RNG seed.
    pub seed: u64,
    /// Number of neighbourhoods to generate.
    pub neighbourhoods: usize,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            neighbourhoods: TORONTO_NEIGHBOURHOODS,
        }
    }
}

fn sim_error(e: impl std::fmt::Display) -> NeighborhoodError {
    NeighborhoodError::Simulation {
        message: e.to_string(),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_count(value: f64) -> u32 {
    value.round().max(0.0) as u32
}

/// Generates a reproducible synthetic feature table.
///
/// # Errors
///
/// Returns [`NeighborhoodError::Simulation`] if `neighbourhoods` is zero.
#[allow(clippy::similar_names)]
pub fn simulate(params: SimulationParams) -> Result<FeatureTable, NeighborhoodError> {
    if params.neighbourhoods == 0 {
        return Err(sim_error("at least one neighbourhood is required"));
    }

    log::info!(
        "Simulating {} neighbourhoods (seed {})",
        params.neighbourhoods,
        params.seed
    );

    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let single_parent_share = Beta::<f64>::new(4.0, 18.0).map_err(sim_error)?;
    let years = study_years();

    let mut records = Vec::with_capacity(params.neighbourhoods);

    for i in 1..=params.neighbourhoods {
        let disadvantage: f64 = rng.sample(StandardNormal);

        // Family and population sizes span the min/max of the real data.
        let total_families: u32 = rng.random_range(600..4290);
        let population: u32 = rng.random_range(6260..33_300);

        let share = (single_parent_share.sample(&mut rng) + 0.05 * disadvantage).clamp(0.15, 0.55);
        // Floor keeps the derived share from rounding past the upper clamp.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let one_parent_families = (share * f64::from(total_families)).floor() as u32;
        let two_parent_families = total_families - one_parent_families;

        let income = Normal::new(20_000.0f64.mul_add(-disadvantage, 95_000.0), 15_000.0)
            .map_err(sim_error)?
            .sample(&mut rng)
            .clamp(30_000.0, 250_000.0);
        let unemployment = Normal::new(0.02f64.mul_add(disadvantage, 0.08), 0.01)
            .map_err(sim_error)?
            .sample(&mut rng)
            .clamp(0.02, 0.25);
        let education_rate = Normal::new(0.1f64.mul_add(-disadvantage, 0.45), 0.05)
            .map_err(sim_error)?
            .sample(&mut rng)
            .clamp(0.05, 0.9);

        let total_education: u32 = rng.random_range(3000..20_000);
        let counts = ProfileCounts {
            total_households: total_families + rng.random_range(200..2000),
            one_parent_families,
            two_parent_families,
            median_income: income.round(),
            unemployment_rate: unemployment,
            total_education,
            bachelors_or_higher: round_count(education_rate * f64::from(total_education)),
        };
        let profile = SocioeconomicProfile::from_counts(counts).map_err(sim_error)?;

        let incidence_scale = 0.15f64.mul_add(disadvantage, 1.0).max(0.1);
        let mut history = CrimeHistory::default();
        for &crime in CrimeType::all() {
            for &year in &years {
                let lambda = crime.simulated_incidence_per_thousand()
                    * (f64::from(population) / 1000.0)
                    * incidence_scale;
                let count = round_count(Poisson::new(lambda).map_err(sim_error)?.sample(&mut rng));
                let rate = rate_per_100k(count, population)
                    .ok_or_else(|| sim_error("simulated population is zero"))?;
                history.insert(CrimeObservation {
                    crime,
                    year,
                    count: Some(count),
                    rate,
                });
            }
        }

        records.push(NeighbourhoodRecord {
            neighbourhood: format!("neighbourhood {i}"),
            profile,
            crime: history,
        });
    }

    Ok(FeatureTable::new(records))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn default_simulation_has_158_unique_neighbourhoods() {
        let table = simulate(SimulationParams::default()).unwrap();
        assert_eq!(table.len(), TORONTO_NEIGHBOURHOODS);
        let unique: BTreeSet<_> = table.names().collect();
        assert_eq!(unique.len(), TORONTO_NEIGHBOURHOODS);
    }

    #[test]
    fn simulation_is_reproducible_for_a_seed() {
        let params = SimulationParams {
            seed: 7,
            neighbourhoods: 20,
        };
        assert_eq!(simulate(params).unwrap(), simulate(params).unwrap());

        let other = SimulationParams { seed: 8, ..params };
        assert_ne!(simulate(params).unwrap(), simulate(other).unwrap());
    }

    #[test]
    fn simulated_values_are_plausible() {
        let table = simulate(SimulationParams::default()).unwrap();
        assert!(table.check_plausibility().is_empty());

        for record in table.records() {
            let p = &record.profile;
            assert!((0.14..=0.56).contains(&p.prop_single_parent));
            assert!((0.0..=1.0).contains(&p.education_rate));
            assert!(p.counts.median_income >= 30_000.0);
            assert_eq!(
                record.crime.len(),
                CrimeType::all().len() * study_years().len()
            );
            for obs in record.crime.iter() {
                assert!(obs.rate >= 0.0 && obs.rate < 10_000.0);
                assert!(obs.count.is_some());
            }
        }
    }

    #[test]
    fn zero_neighbourhoods_is_an_error() {
        let err = simulate(SimulationParams {
            seed: 1,
            neighbourhoods: 0,
        })
        .unwrap_err();
        assert!(matches!(err, NeighborhoodError::Simulation { .. }));
    }

    #[test]
    fn simulated_table_survives_a_csv_round_trip() {
        let table = simulate(SimulationParams {
            seed: 3,
            neighbourhoods: 12,
        })
        .unwrap();
        let mut buf = Vec::new();
        table.write_merged_csv(&mut buf).unwrap();
        let parsed = FeatureTable::from_merged_csv(buf.as_slice(), Some(12)).unwrap();
        assert_eq!(parsed, table);
    }
}
