//! Scoring of fitted candidates and the analyst's final choice.
//!
//! The scores only inform the decision. [`Evaluation::recommend`] offers
//! the candidate with the best average rank across the three metrics, but
//! the configuration carried forward is whatever the analyst passes to
//! [`Evaluation::select`], which may weigh interpretability over raw
//! scores.

use std::sync::Arc;

use crime_trends_analytics_models::{Candidate, ModelFamily, ScoreRecord, SweepPoint};
use ndarray::ArrayView2;

use crate::AnalyticsError;
use crate::engine::{ClusteringEngine, FittedCandidate};
use crate::progress::ProgressCallback;
use crate::validate::{score, silhouette};

/// Fitted candidates and their validation scores, in candidate order.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    fits: Vec<FittedCandidate>,
    scores: Vec<ScoreRecord>,
}

/// Fits and scores every candidate.
///
/// # Errors
///
/// Returns the first fitting or scoring error. A candidate whose score is
/// undefined (for example, a mixture that leaves only one component in
/// use) fails the whole evaluation rather than being silently dropped.
pub fn evaluate(
    engine: &ClusteringEngine,
    data: ArrayView2<'_, f64>,
    candidates: &[Candidate],
    progress: &Arc<dyn ProgressCallback>,
) -> Result<Evaluation, AnalyticsError> {
    let fits = engine.fit_all(data, candidates, progress)?;
    let scores = fits
        .iter()
        .map(|fit| {
            let scores = score(data, fit.labels())?;
            log::info!(
                "{}: silhouette {:.3}, Davies-Bouldin {:.3}, Calinski-Harabasz {:.1}",
                fit.candidate,
                scores.silhouette,
                scores.davies_bouldin,
                scores.calinski_harabasz
            );
            Ok(ScoreRecord::new(fit.candidate, scores))
        })
        .collect::<Result<Vec<_>, AnalyticsError>>()?;

    Ok(Evaluation { fits, scores })
}

/// 1-based ranks of `values` (best first), ties sharing the lower rank.
fn ranks(values: &[f64], higher_is_better: bool) -> Vec<usize> {
    values
        .iter()
        .map(|v| {
            1 + values
                .iter()
                .filter(|other| {
                    if higher_is_better {
                        *other > v
                    } else {
                        *other < v
                    }
                })
                .count()
        })
        .collect()
}

impl Evaluation {
    /// Score table rows in candidate order.
    #[must_use]
    pub fn scores(&self) -> &[ScoreRecord] {
        &self.scores
    }

    /// Fitted models in candidate order.
    #[must_use]
    pub fn fits(&self) -> &[FittedCandidate] {
        &self.fits
    }

    /// Candidate with the lowest mean rank across silhouette (higher is
    /// better), Davies-Bouldin (lower is better) and Calinski-Harabasz
    /// (higher is better). The earliest candidate wins ties.
    #[must_use]
    pub fn recommend(&self) -> Option<Candidate> {
        let column = |f: fn(&ScoreRecord) -> f64| self.scores.iter().map(f).collect::<Vec<_>>();
        let silhouette = ranks(&column(|s| s.silhouette), true);
        let davies_bouldin = ranks(&column(|s| s.davies_bouldin), false);
        let calinski_harabasz = ranks(&column(|s| s.calinski_harabasz), true);

        let mut best: Option<(usize, usize)> = None;
        for i in 0..self.scores.len() {
            let total = silhouette[i] + davies_bouldin[i] + calinski_harabasz[i];
            if best.is_none_or(|(_, t)| total < t) {
                best = Some((i, total));
            }
        }
        best.map(|(i, _)| self.scores[i].candidate())
    }

    /// Returns the fitted model for the analyst's chosen configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::UnknownCandidate`] if `choice` was not
    /// evaluated.
    pub fn select(&self, choice: Candidate) -> Result<&FittedCandidate, AnalyticsError> {
        let fitted = self
            .fits
            .iter()
            .find(|f| f.candidate == choice)
            .ok_or(AnalyticsError::UnknownCandidate(choice))?;

        if let Some(recommended) = self.recommend()
            && recommended != choice
        {
            log::info!("Selected {choice} over the score-based recommendation {recommended}");
        } else {
            log::info!("Selected {choice}");
        }

        Ok(fitted)
    }
}

/// Exploratory K-means silhouette sweep over `ks`.
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidK`] for a `K` outside `2..N`, or a
/// scoring error.
pub fn silhouette_sweep(
    engine: &ClusteringEngine,
    data: ArrayView2<'_, f64>,
    ks: &[usize],
    progress: &Arc<dyn ProgressCallback>,
) -> Result<Vec<SweepPoint>, AnalyticsError> {
    let candidates: Vec<Candidate> = ks
        .iter()
        .map(|&k| Candidate {
            family: ModelFamily::KMeans,
            k,
        })
        .collect();

    engine
        .fit_all(data, &candidates, progress)?
        .iter()
        .map(|fit| {
            let point = SweepPoint {
                k: fit.candidate.k,
                silhouette: silhouette(data, fit.labels())?,
            };
            log::info!("K-means K={}: silhouette {:.3}", point.k, point.silhouette);
            Ok(point)
        })
        .collect()
}
