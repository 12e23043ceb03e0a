//! Per-cluster profile of the selected configuration in raw units.

use crime_trends_analytics_models::ClusterSummaryRow;
use crime_trends_neighborhood_models::{NeighbourhoodRecord, SesFeature};

use crate::AnalyticsError;
use crate::label::ClusterLabels;

/// Mean raw indicators of every labelled cluster, least advantaged first.
///
/// A labelled cluster with no members (a mixture component that wins no
/// hard assignment) has no means and is left out with a warning.
///
/// # Errors
///
/// Returns [`AnalyticsError::Shape`] if `assignments` does not have one
/// entry per record or names a cluster without a label.
pub fn cluster_summaries(
    records: &[NeighbourhoodRecord],
    assignments: &[usize],
    labels: &ClusterLabels,
) -> Result<Vec<ClusterSummaryRow>, AnalyticsError> {
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

    Ok(labels
        .by_rank()
        .into_iter()
        .filter_map(|label| {
            let members: Vec<[f64; 4]> = records
                .iter()
                .zip(assignments)
                .filter(|(_, c)| **c == label.cluster)
                .map(|(r, _)| r.feature_vector())
                .collect();

            if members.is_empty() {
                log::warn!(
                    "Cluster {} ({}) has no members; leaving it out of the summary",
                    label.cluster,
                    label.label
                );
                return None;
            }

            #[allow(clippy::cast_precision_loss)]
            let n = members.len() as f64;
            let average = |feature: SesFeature| {
                members.iter().map(|m| m[feature.index()]).sum::<f64>() / n
            };

            Some(ClusterSummaryRow {
                cluster: label.cluster,
                opportunity_index: label.label.to_string(),
                n: members.len(),
                composite_score: label.composite,
                average_median_income: average(SesFeature::MedianIncome),
                average_education_rate: average(SesFeature::EducationRate),
                average_unemployment_rate: average(SesFeature::UnemploymentRate),
                average_single_parent_share: average(SesFeature::SingleParentRate),
            })
        })
        .collect())
}
