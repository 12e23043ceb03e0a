//! Crime-rate trajectories per opportunity cluster.
//!
//! Produces the long table of mean rates per (crime, year, cluster) with
//! year-over-year percent change, and the per-crime "rate change" tables
//! that lay those trajectories side by side.

use crime_trends_analytics_models::TrendRow;
use crime_trends_crime_models::CrimeType;
use crime_trends_neighborhood_models::NeighbourhoodRecord;

use crate::AnalyticsError;
use crate::label::ClusterLabels;

/// Mean rate per (crime, year, cluster), ordered by crime, then cluster
/// rank, then year.
///
/// A (crime, year) pair that no neighbourhood reports is skipped. A pair
/// that only some neighbourhoods report is an error: gaps are never filled
/// in.
///
/// # Errors
///
/// * [`AnalyticsError::Shape`] if `assignments` does not have one entry
///   per record or names an unlabelled cluster.
/// * [`AnalyticsError::MissingRate`] for a partially reported pair.
pub fn crime_trends(
    records: &[NeighbourhoodRecord],
    assignments: &[usize],
    labels: &ClusterLabels,
    crimes: &[CrimeType],
    years: &[u16],
) -> Result<Vec<TrendRow>, AnalyticsError> {
    if records.len() != assignments.len() {
        return Err(AnalyticsError::Shape {
            message: format!(
                "{} records for {} assignments",
                records.len(),
                assignments.len()
            ),
        });
    }
    if let Some(&unknown) = assignments.iter().find(|&&c| labels.get(c).is_none()) {
        return Err(AnalyticsError::Shape {
            message: format!("cluster {unknown} has no label"),
        });
    }

    let mut rows = Vec::new();
    for &crime in crimes {
        let mut reported_years = Vec::with_capacity(years.len());
        for &year in years {
            let reported = records
                .iter()
                .filter(|r| r.crime.get(crime, year).is_some())
                .count();
            if reported == 0 {
                log::debug!("No neighbourhood reports {}", crime.rate_column(year));
                continue;
            }
            if let Some(missing) = records.iter().find(|r| r.crime.get(crime, year).is_none()) {
                return Err(AnalyticsError::MissingRate {
                    column: crime.rate_column(year),
                    neighbourhood: missing.neighbourhood.clone(),
                });
            }
            reported_years.push(year);
        }

        for label in labels.by_rank() {
            let mut previous: Option<f64> = None;
            for &year in &reported_years {
                let rates: Vec<f64> = records
                    .iter()
                    .zip(assignments)
                    .filter(|(_, c)| **c == label.cluster)
                    .filter_map(|(r, _)| r.crime.rate(crime, year))
                    .collect();
                if rates.is_empty() {
                    continue;
                }
                #[allow(clippy::cast_precision_loss)]
                let avg_rate = rates.iter().sum::<f64>() / rates.len() as f64;
                let pct_change = previous
                    .filter(|p| p.abs() > 0.0)
                    .map(|p| (avg_rate - p) / p * 100.0);

                rows.push(TrendRow {
                    crime,
                    year,
                    opportunity_index: label.label.to_string(),
                    avg_rate,
                    pct_change,
                });
                previous = Some(avg_rate);
            }
        }
    }

    Ok(rows)
}

/// One crime's rates side by side per cluster, one row per year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateChangeTable {
    /// Crime the table describes.
    pub crime: CrimeType,
    /// `Year` followed by the short tier names, least advantaged first.
    pub header: Vec<String>,
    /// Formatted cells, one row per year.
    pub rows: Vec<Vec<String>>,
}

fn format_cell(row: &TrendRow, first_year: bool) -> String {
    if first_year {
        return format!("{:.1}", row.avg_rate);
    }
    match row.pct_change {
        Some(pct) => {
            let sign = if pct >= 0.0 { "+" } else { "" };
            format!("{:.1} ({sign}{pct:.1})", row.avg_rate)
        }
        None => format!("{:.1} (n/a)", row.avg_rate),
    }
}

/// Builds the rate-change table of `crime`: the first year shows the base
/// rate, later years `"rate (+pct)"`.
#[must_use]
pub fn rate_change_table(
    trends: &[TrendRow],
    labels: &ClusterLabels,
    crime: CrimeType,
) -> RateChangeTable {
    let ranked = labels.by_rank();
    let mut header = vec!["Year".to_string()];
    header.extend(ranked.iter().map(|l| l.label.short()));

    let mut years: Vec<u16> = trends
        .iter()
        .filter(|t| t.crime == crime)
        .map(|t| t.year)
        .collect();
    years.sort_unstable();
    years.dedup();

    let rows = years
        .iter()
        .enumerate()
        .map(|(i, &year)| {
            let mut cells = vec![year.to_string()];
            for label in &ranked {
                let name = label.label.to_string();
                let cell = trends
                    .iter()
                    .find(|t| t.crime == crime && t.year == year && t.opportunity_index == name)
                    .map_or_else(String::new, |t| format_cell(t, i == 0));
                cells.push(cell);
            }
            cells
        })
        .collect();

    RateChangeTable {
        crime,
        header,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use crime_trends_neighborhood_models::{
        CrimeHistory, CrimeObservation, ProfileCounts, SocioeconomicProfile,
    };

    use super::*;
    use crate::label::rank_scores;

    fn record(name: &str, rates: &[(u16, f64)]) -> NeighbourhoodRecord {
        NeighbourhoodRecord {
            neighbourhood: name.to_string(),
            profile: SocioeconomicProfile::from_counts(ProfileCounts {
                total_households: 1500,
                one_parent_families: 200,
                two_parent_families: 800,
                median_income: 70_000.0,
                unemployment_rate: 0.07,
                total_education: 1000,
                bachelors_or_higher: 400,
            })
            .unwrap(),
            crime: CrimeHistory::new(rates.iter().map(|&(year, rate)| CrimeObservation {
                crime: CrimeType::Assault,
                year,
                count: None,
                rate,
            })),
        }
    }

    fn fixture() -> (Vec<NeighbourhoodRecord>, Vec<usize>, ClusterLabels) {
        let records = vec![
            record("A", &[(2019, 100.0), (2020, 110.0)]),
            record("B", &[(2019, 300.0), (2020, 330.0)]),
            record("C", &[(2019, 800.0), (2020, 600.0)]),
            record("D", &[(2019, 1000.0), (2020, 800.0)]),
        ];
        // Cluster 1 holds the advantaged pair.
        let labels = rank_scores(&[(0, -1.0), (1, 1.0)]).unwrap();
        (records, vec![1, 1, 0, 0], labels)
    }

    #[test]
    fn trend_rows_carry_means_and_percent_change() {
        let (records, assignments, labels) = fixture();
        let rows = crime_trends(
            &records,
            &assignments,
            &labels,
            &[CrimeType::Assault, CrimeType::Robbery],
            &[2019, 2020],
        )
        .unwrap();

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].opportunity_index, "Low Opportunity");
        assert!((rows[0].avg_rate - 900.0).abs() < 1e-9);
        assert!(rows[0].pct_change.is_none());
        assert!((rows[1].avg_rate - 700.0).abs() < 1e-9);
        assert!((rows[1].pct_change.unwrap() + 22.222_222).abs() < 1e-5);
        assert_eq!(rows[3].opportunity_index, "High Opportunity");
        assert!((rows[3].pct_change.unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn partially_reported_year_is_an_error() {
        let (mut records, assignments, labels) = fixture();
        records[2] = record("C", &[(2019, 800.0)]);
        let err = crime_trends(
            &records,
            &assignments,
            &labels,
            &[CrimeType::Assault],
            &[2019, 2020],
        )
        .unwrap_err();
        match err {
            AnalyticsError::MissingRate {
                column,
                neighbourhood,
            } => {
                assert_eq!(column, "assault_rate_2020");
                assert_eq!(neighbourhood, "C");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rate_change_table_formats_cells() {
        let (records, assignments, labels) = fixture();
        let rows = crime_trends(
            &records,
            &assignments,
            &labels,
            &[CrimeType::Assault],
            &[2019, 2020],
        )
        .unwrap();
        let table = rate_change_table(&rows, &labels, CrimeType::Assault);

        assert_eq!(table.header, vec!["Year", "Low", "High"]);
        assert_eq!(table.rows[0], vec!["2019", "900.0", "200.0"]);
        assert_eq!(table.rows[1], vec!["2020", "700.0 (-22.2)", "220.0 (+10.0)"]);
    }
}
