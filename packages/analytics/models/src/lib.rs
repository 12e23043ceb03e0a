#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Clustering configuration and result record types.
//!
//! Defines the explicit [`AnalysisConfig`] handed to the clustering engine,
//! the (model family, K) [`Candidate`] key that identifies a fitted
//! configuration, and the flat record types written out for downstream
//! tables and figures.

use std::fmt;

use crime_trends_crime_models::CrimeType;
use crime_trends_neighborhood_models::SesFeature;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Clustering model family.
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
pub enum ModelFamily {
    /// Hard spherical partitioning (Lloyd's K-means).
    KMeans,
    /// Soft ellipsoidal partitioning (full-covariance Gaussian mixture
    /// fitted by EM).
    GaussianMixture,
}

impl ModelFamily {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::KMeans, Self::GaussianMixture]
    }

    /// Short label used in score tables.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::KMeans => "KMeans",
            Self::GaussianMixture => "GMM",
        }
    }
}

/// A (model family, K) configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Candidate {
    /// Model family.
    pub family: ModelFamily,
    /// Number of clusters.
    pub k: usize,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (K = {})", self.family.label(), self.k)
    }
}

/// Parameters for Lloyd's K-means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansParams {
    /// Number of independently seeded restarts; the lowest-WCSS run wins.
    pub n_init: usize,
    /// Maximum assign/update iterations per restart.
    pub max_iter: usize,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            n_init: 10,
            max_iter: 300,
        }
    }
}

/// Parameters for Gaussian-mixture EM.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixtureParams {
    /// Maximum EM iterations.
    pub max_iter: usize,
    /// Convergence threshold on the change in mean log-likelihood.
    pub tolerance: f64,
    /// Non-negative value added to each covariance diagonal.
    pub reg_covar: f64,
}

impl Default for MixtureParams {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tolerance: 1e-3,
            reg_covar: 1e-6,
        }
    }
}

/// Input-table expectations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Number of neighbourhoods the join must produce, if known.
    pub expected_neighbourhoods: Option<usize>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            expected_neighbourhoods: Some(158),
        }
    }
}

/// Every knob of a clustering run, passed explicitly to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Seed for every random initialisation.
    pub seed: u64,
    /// Model families to evaluate.
    pub families: Vec<ModelFamily>,
    /// Cluster counts to evaluate for every family.
    pub candidate_ks: Vec<usize>,
    /// Cluster counts for the exploratory K-means silhouette sweep.
    pub sweep_ks: Vec<usize>,
    /// K-means parameters.
    pub k_means: KMeansParams,
    /// Gaussian-mixture parameters.
    pub gaussian_mixture: MixtureParams,
    /// Input-table expectations.
    pub table: TableConfig,
    /// Analyst's final (family, K) choice, when decided ahead of time.
    pub selection: Option<Candidate>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            families: ModelFamily::all().to_vec(),
            candidate_ks: vec![2, 3],
            sweep_ks: (2..=6).collect(),
            k_means: KMeansParams::default(),
            gaussian_mixture: MixtureParams::default(),
            table: TableConfig::default(),
            selection: None,
        }
    }
}

impl AnalysisConfig {
    /// Every (family, K) pair to evaluate, families outermost.
    #[must_use]
    pub fn candidates(&self) -> Vec<Candidate> {
        self.families
            .iter()
            .flat_map(|&family| self.candidate_ks.iter().map(move |&k| Candidate { family, k }))
            .collect()
    }
}

/// The three internal validation scores for one fitted configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationScores {
    /// Mean silhouette coefficient, in `[-1, 1]`; higher is better.
    pub silhouette: f64,
    /// Davies-Bouldin index, `>= 0`; lower is better.
    pub davies_bouldin: f64,
    /// Calinski-Harabasz variance ratio; higher is better.
    pub calinski_harabasz: f64,
}

/// One row of the model-evaluation table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// Model family.
    pub model: ModelFamily,
    /// Number of clusters.
    pub k: usize,
    /// Mean silhouette coefficient.
    pub silhouette: f64,
    /// Davies-Bouldin index.
    pub davies_bouldin: f64,
    /// Calinski-Harabasz score.
    pub calinski_harabasz: f64,
}

impl ScoreRecord {
    /// Builds a record from a candidate and its scores.
    #[must_use]
    pub const fn new(candidate: Candidate, scores: ValidationScores) -> Self {
        Self {
            model: candidate.family,
            k: candidate.k,
            silhouette: scores.silhouette,
            davies_bouldin: scores.davies_bouldin,
            calinski_harabasz: scores.calinski_harabasz,
        }
    }

    /// The configuration this record scores.
    #[must_use]
    pub const fn candidate(&self) -> Candidate {
        Candidate {
            family: self.model,
            k: self.k,
        }
    }

    /// The three scores.
    #[must_use]
    pub const fn scores(&self) -> ValidationScores {
        ValidationScores {
            silhouette: self.silhouette,
            davies_bouldin: self.davies_bouldin,
            calinski_harabasz: self.calinski_harabasz,
        }
    }
}

/// One point of the exploratory K-means silhouette sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    /// Number of clusters.
    pub k: usize,
    /// Mean silhouette coefficient.
    pub silhouette: f64,
}

/// Ordinal socioeconomic-opportunity label of a cluster.
///
/// `rank` 0 is the least-advantaged cluster, `tiers - 1` the most.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpportunityLabel {
    /// Position in the ascending composite-score order.
    pub rank: usize,
    /// Total number of ranked clusters.
    pub tiers: usize,
}

impl OpportunityLabel {
    /// Tier name without the "Opportunity" suffix (e.g., "Medium").
    #[must_use]
    pub fn tier(&self) -> String {
        let names: &[&str] = match self.tiers {
            1 => &["Single"],
            2 => &["Low", "High"],
            3 => &["Low", "Medium", "High"],
            4 => &["Low", "Medium-Low", "Medium-High", "High"],
            5 => &["Low", "Medium-Low", "Medium", "Medium-High", "High"],
            _ => &[],
        };
        names
            .get(self.rank)
            .map_or_else(|| format!("Tier {}", self.rank + 1), |n| (*n).to_string())
    }

    /// Short column header used in rate-change tables ("Low", "Med",
    /// "High", ...).
    #[must_use]
    pub fn short(&self) -> String {
        self.tier().replace("Medium", "Med")
    }
}

impl fmt::Display for OpportunityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Opportunity", self.tier())
    }
}

/// Final per-neighbourhood cluster assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRow {
    /// Neighbourhood name.
    pub neighbourhood: String,
    /// Cluster id from the selected configuration.
    pub cluster: usize,
    /// Opportunity label of the cluster.
    pub opportunity_index: String,
}

/// Principal coordinates of a neighbourhood for diagnostic plotting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRow {
    /// Neighbourhood name.
    pub neighbourhood: String,
    /// Coordinate on the first principal axis.
    pub pc1: f64,
    /// Coordinate on the second principal axis.
    pub pc2: f64,
    /// Cluster id from the selected configuration.
    pub cluster: usize,
}

/// Variance diagnostics of the principal-component projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceDiagnostics {
    /// Explained-variance ratio of every component, descending.
    pub explained_variance_ratio: Vec<f64>,
    /// Running sum of `explained_variance_ratio`.
    pub cumulative_variance_ratio: Vec<f64>,
    /// Variance along each principal axis (eigenvalues, `n - 1`
    /// denominator).
    pub eigenvalues: Vec<f64>,
    /// Singular values of the centred data matrix.
    pub singular_values: Vec<f64>,
    /// Combined ratio of the two retained axes.
    pub retained_ratio: f64,
}

/// Per-cluster raw indicator means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummaryRow {
    /// Cluster id.
    pub cluster: usize,
    /// Opportunity label.
    pub opportunity_index: String,
    /// Number of neighbourhoods.
    pub n: usize,
    /// Composite opportunity score of the cluster centroid.
    pub composite_score: f64,
    /// Mean median household income.
    pub average_median_income: f64,
    /// Mean education rate.
    pub average_education_rate: f64,
    /// Mean unemployment rate.
    pub average_unemployment_rate: f64,
    /// Mean single-parent share.
    pub average_single_parent_share: f64,
}

impl ClusterSummaryRow {
    /// Mean of a single indicator.
    #[must_use]
    pub const fn average(&self, feature: SesFeature) -> f64 {
        match feature {
            SesFeature::MedianIncome => self.average_median_income,
            SesFeature::EducationRate => self.average_education_rate,
            SesFeature::UnemploymentRate => self.average_unemployment_rate,
            SesFeature::SingleParentRate => self.average_single_parent_share,
        }
    }
}

/// Mean crime rate of one opportunity cluster for one (crime, year).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendRow {
    /// Crime type.
    pub crime: CrimeType,
    /// Calendar year.
    pub year: u16,
    /// Opportunity label of the cluster.
    pub opportunity_index: String,
    /// Mean rate per 100k across the cluster's neighbourhoods.
    pub avg_rate: f64,
    /// Percent change from the previous year; empty for the first year or
    /// when the previous mean was zero.
    pub pct_change: Option<f64>,
}

/// Everything a run decided, written as a JSON summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    /// RFC 3339 timestamp of the run.
    pub generated_at: String,
    /// Configuration used.
    pub config: AnalysisConfig,
    /// Number of neighbourhoods analysed.
    pub neighbourhoods: usize,
    /// Principal-component diagnostics.
    pub variance: VarianceDiagnostics,
    /// Exploratory K-means silhouette sweep.
    pub sweep: Vec<SweepPoint>,
    /// Evaluation scores for every candidate.
    pub scores: Vec<ScoreRecord>,
    /// Best-balanced candidate according to the scores; advisory only.
    pub recommendation: Option<Candidate>,
    /// Configuration the analyst selected.
    pub selection: Candidate,
    /// Per-cluster summaries of the selected configuration.
    pub clusters: Vec<ClusterSummaryRow>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_are_family_major() {
        let config = AnalysisConfig::default();
        let candidates = config.candidates();
        assert_eq!(candidates.len(), 4);
        assert_eq!(
            candidates[0],
            Candidate {
                family: ModelFamily::KMeans,
                k: 2
            }
        );
        assert_eq!(
            candidates[3],
            Candidate {
                family: ModelFamily::GaussianMixture,
                k: 3
            }
        );
    }

    #[test]
    fn tier_names_for_common_k() {
        let names = |tiers| {
            (0..tiers)
                .map(|rank| OpportunityLabel { rank, tiers }.to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(2), vec!["Low Opportunity", "High Opportunity"]);
        assert_eq!(
            names(3),
            vec!["Low Opportunity", "Medium Opportunity", "High Opportunity"]
        );
        assert_eq!(names(4)[1], "Medium-Low Opportunity");
        assert_eq!(names(5)[2], "Medium Opportunity");
        assert_eq!(names(7)[6], "Tier 7 Opportunity");
    }

    #[test]
    fn short_labels() {
        assert_eq!(OpportunityLabel { rank: 1, tiers: 3 }.short(), "Med");
        assert_eq!(OpportunityLabel { rank: 3, tiers: 5 }.short(), "Med-High");
    }

    #[test]
    fn score_record_round_trips_candidate() {
        let candidate = Candidate {
            family: ModelFamily::GaussianMixture,
            k: 3,
        };
        let record = ScoreRecord::new(
            candidate,
            ValidationScores {
                silhouette: 0.4,
                davies_bouldin: 0.9,
                calinski_harabasz: 120.0,
            },
        );
        assert_eq!(record.candidate(), candidate);
        assert_eq!(candidate.to_string(), "GMM (K = 3)");
    }
}
