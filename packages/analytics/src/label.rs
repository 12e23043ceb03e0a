//! Ordinal opportunity labels for the clusters of the selected model.
//!
//! Each centroid (in standardized feature space) is reduced to an
//! equal-weight composite: income and education count for opportunity,
//! unemployment and single-parent share against it. Clusters are sorted by
//! that composite and named from "Low" upward.

use crime_trends_analytics_models::{AssignmentRow, OpportunityLabel};
use crime_trends_neighborhood_models::SesFeature;
use ndarray::{ArrayView1, ArrayView2, Axis};

use crate::AnalyticsError;

/// Composite scores closer than this cannot be ordered meaningfully.
pub const RANKING_TOLERANCE: f64 = 1e-9;

/// A cluster's composite score and resulting label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterLabel {
    /// Cluster id in the selected model.
    pub cluster: usize,
    /// Composite opportunity score of the centroid.
    pub composite: f64,
    /// Ordinal label.
    pub label: OpportunityLabel,
}

/// Labels of every cluster, ordered by cluster id.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterLabels {
    labels: Vec<ClusterLabel>,
}

impl ClusterLabels {
    /// Label of `cluster`, if it exists.
    #[must_use]
    pub fn get(&self, cluster: usize) -> Option<&ClusterLabel> {
        self.labels.iter().find(|l| l.cluster == cluster)
    }

    /// All labels ordered by cluster id.
    #[must_use]
    pub fn as_slice(&self) -> &[ClusterLabel] {
        &self.labels
    }

    /// Labels ordered from least to most advantaged.
    #[must_use]
    pub fn by_rank(&self) -> Vec<ClusterLabel> {
        let mut ranked = self.labels.clone();
        ranked.sort_by_key(|l| l.label.rank);
        ranked
    }

    /// Per-neighbourhood assignment rows.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Shape`] if `names` and `assignments`
    /// differ in length or an assignment has no label.
    pub fn assignment_rows<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
        assignments: &[usize],
    ) -> Result<Vec<AssignmentRow>, AnalyticsError> {
        let names: Vec<&str> = names.into_iter().collect();
        if names.len() != assignments.len() {
            return Err(AnalyticsError::Shape {
                message: format!(
                    "{} neighbourhoods for {} assignments",
                    names.len(),
                    assignments.len()
                ),
            });
        }

        names
            .into_iter()
            .zip(assignments)
            .map(|(name, &cluster)| {
                let label = self.get(cluster).ok_or_else(|| AnalyticsError::Shape {
                    message: format!("cluster {cluster} has no label"),
                })?;
                Ok(AssignmentRow {
                    neighbourhood: name.to_string(),
                    cluster,
                    opportunity_index: label.label.to_string(),
                })
            })
            .collect()
    }
}

/// Equal-weight composite of a standardized centroid:
/// `z(income) + z(education) - z(unemployment) - z(single-parent share)`.
///
/// # Errors
///
/// Returns [`AnalyticsError::Shape`] if `centroid` does not have one entry
/// per [`SesFeature`].
pub fn composite_score(centroid: ArrayView1<'_, f64>) -> Result<f64, AnalyticsError> {
    if centroid.len() != SesFeature::ALL.len() {
        return Err(AnalyticsError::Shape {
            message: format!(
                "centroid has {} entries, expected {}",
                centroid.len(),
                SesFeature::ALL.len()
            ),
        });
    }
    Ok(SesFeature::ALL
        .iter()
        .map(|f| f.opportunity_sign() * centroid[f.index()])
        .sum())
}

/// Ranks clusters by composite score, ascending.
///
/// # Errors
///
/// Returns [`AnalyticsError::AmbiguousRanking`] if two scores differ by no
/// more than [`RANKING_TOLERANCE`] (or are not finite).
pub fn rank_scores(scores: &[(usize, f64)]) -> Result<ClusterLabels, AnalyticsError> {
    let mut order: Vec<(usize, f64)> = scores.to_vec();
    order.sort_by(|a, b| a.1.total_cmp(&b.1));

    for pair in order.windows(2) {
        let (first, first_score) = pair[0];
        let (second, second_score) = pair[1];
        let gap = second_score - first_score;
        if gap.is_nan() || gap <= RANKING_TOLERANCE {
            return Err(AnalyticsError::AmbiguousRanking {
                first,
                second,
                first_score,
                second_score,
            });
        }
    }

    let tiers = order.len();
    let mut labels: Vec<ClusterLabel> = order
        .into_iter()
        .enumerate()
        .map(|(rank, (cluster, composite))| ClusterLabel {
            cluster,
            composite,
            label: OpportunityLabel { rank, tiers },
        })
        .collect();
    labels.sort_by_key(|l| l.cluster);

    Ok(ClusterLabels { labels })
}

/// Labels every row of a `K x 4` standardized centroid matrix; row `i` is
/// cluster `i`.
///
/// # Errors
///
/// Returns [`AnalyticsError::Shape`] for a wrong column count and
/// [`AnalyticsError::AmbiguousRanking`] when two composites tie.
pub fn label_clusters(centroids: ArrayView2<'_, f64>) -> Result<ClusterLabels, AnalyticsError> {
    let scores = centroids
        .axis_iter(Axis(0))
        .enumerate()
        .map(|(cluster, centroid)| Ok((cluster, composite_score(centroid)?)))
        .collect::<Result<Vec<_>, AnalyticsError>>()?;

    let labels = rank_scores(&scores)?;
    for l in labels.by_rank() {
        log::info!(
            "Cluster {} -> {} (composite {:.3})",
            l.cluster,
            l.label,
            l.composite
        );
    }
    Ok(labels)
}
