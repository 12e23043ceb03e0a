//! Fits configured clustering models on the standardized feature matrix.
//!
//! Every candidate gets its own RNG seeded from [`AnalysisConfig::seed`],
//! so a candidate's fit does not depend on which other candidates are
//! evaluated or in what order.

use std::sync::Arc;

use crime_trends_analytics_models::{
    AnalysisConfig, Candidate, KMeansParams, MixtureParams, ModelFamily,
};
use ndarray::{Array2, ArrayView2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::AnalyticsError;
use crate::kmeans::{KMeansFit, fit_kmeans};
use crate::mixture::{MixtureFit, fit_mixture};
use crate::progress::ProgressCallback;

/// A fitted model of either family.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterModel {
    /// Lloyd's K-means.
    KMeans(KMeansFit),
    /// Full-covariance Gaussian mixture.
    GaussianMixture(MixtureFit),
}

impl ClusterModel {
    /// Hard cluster assignment of every observation.
    #[must_use]
    pub fn labels(&self) -> &[usize] {
        match self {
            Self::KMeans(fit) => &fit.labels,
            Self::GaussianMixture(fit) => &fit.labels,
        }
    }

    /// `K x D` cluster centres: K-means centroids or mixture component
    /// means.
    #[must_use]
    pub fn centroids(&self) -> Array2<f64> {
        match self {
            Self::KMeans(fit) => fit.centroids.clone(),
            Self::GaussianMixture(fit) => {
                let d = fit.components.first().map_or(0, |c| c.mean.len());
                let mut centroids = Array2::<f64>::zeros((fit.components.len(), d));
                for (mut row, component) in centroids.rows_mut().into_iter().zip(&fit.components) {
                    row.assign(&component.mean);
                }
                centroids
            }
        }
    }

    /// Family of this model.
    #[must_use]
    pub const fn family(&self) -> ModelFamily {
        match self {
            Self::KMeans(_) => ModelFamily::KMeans,
            Self::GaussianMixture(_) => ModelFamily::GaussianMixture,
        }
    }
}

/// A candidate configuration together with its fitted model.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedCandidate {
    /// The (family, K) configuration.
    pub candidate: Candidate,
    /// The fitted model.
    pub model: ClusterModel,
}

impl FittedCandidate {
    /// Hard cluster assignment of every observation.
    #[must_use]
    pub fn labels(&self) -> &[usize] {
        self.model.labels()
    }
}

/// Fits (family, K) candidates with explicit, seeded parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteringEngine {
    seed: u64,
    k_means: KMeansParams,
    gaussian_mixture: MixtureParams,
}

impl ClusteringEngine {
    /// Creates an engine from the model parameters of `config`.
    #[must_use]
    pub const fn new(config: &AnalysisConfig) -> Self {
        Self {
            seed: config.seed,
            k_means: config.k_means,
            gaussian_mixture: config.gaussian_mixture,
        }
    }

    /// Fits one candidate.
    ///
    /// # Errors
    ///
    /// * [`AnalyticsError::InvalidK`] if `K < 2` or `K >= N`.
    /// * [`AnalyticsError::SingularCovariance`] if a mixture component
    ///   collapses.
    pub fn fit(
        &self,
        data: ArrayView2<'_, f64>,
        candidate: Candidate,
    ) -> Result<FittedCandidate, AnalyticsError> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let model = match candidate.family {
            ModelFamily::KMeans => {
                ClusterModel::KMeans(fit_kmeans(data, candidate.k, &self.k_means, &mut rng)?)
            }
            ModelFamily::GaussianMixture => ClusterModel::GaussianMixture(fit_mixture(
                data,
                candidate.k,
                &self.gaussian_mixture,
                &self.k_means,
                &mut rng,
            )?),
        };
        log::debug!("Fitted {candidate}");
        Ok(FittedCandidate { candidate, model })
    }

    /// Fits every candidate in order, reporting one unit of progress per
    /// fit.
    ///
    /// # Errors
    ///
    /// Returns the first fitting error.
    pub fn fit_all(
        &self,
        data: ArrayView2<'_, f64>,
        candidates: &[Candidate],
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<Vec<FittedCandidate>, AnalyticsError> {
        progress.begin(candidates.len() as u64);
        let mut fits = Vec::with_capacity(candidates.len());
        for &candidate in candidates {
            progress.set_message(format!("Fitting {candidate}"));
            fits.push(self.fit(data, candidate)?);
            progress.inc(1);
        }
        progress.finish(format!("Fitted {} models", fits.len()));
        Ok(fits)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use ndarray::array;

    use super::*;
    use crate::progress::null_progress;
    use crate::standardize::standardize;
    use crate::validate::silhouette;

    fn two_groups() -> Array2<f64> {
        array![
            [0.0, 0.0],
            [0.1, 0.0],
            [0.0, 0.1],
            [10.0, 10.0],
            [10.1, 10.0],
            [10.0, 10.1],
        ]
    }

    fn candidate(family: ModelFamily, k: usize) -> Candidate {
        Candidate { family, k }
    }

    #[test]
    fn both_families_recover_two_groups() {
        let engine = ClusteringEngine::new(&AnalysisConfig::default());
        let data = two_groups();
        for &family in ModelFamily::all() {
            let fitted = engine.fit(data.view(), candidate(family, 2)).unwrap();
            let labels = fitted.labels();
            assert_eq!(labels[0], labels[1], "{family}");
            assert_eq!(labels[0], labels[2], "{family}");
            assert_eq!(labels[3], labels[4], "{family}");
            assert_eq!(labels[3], labels[5], "{family}");
            assert_ne!(labels[0], labels[3], "{family}");
            assert!(silhouette(data.view(), labels).unwrap() > 0.8);
            assert_eq!(fitted.model.family(), family);
        }
    }

    #[test]
    fn six_neighbourhoods_in_two_groups_are_recovered_after_standardizing() {
        // income, education rate, unemployment rate, single-parent share
        let raw = array![
            [121_000.0, 0.62, 0.040, 0.15],
            [118_500.0, 0.60, 0.042, 0.16],
            [123_000.0, 0.63, 0.038, 0.14],
            [46_000.0, 0.21, 0.121, 0.41],
            [44_500.0, 0.19, 0.118, 0.43],
            [47_500.0, 0.22, 0.124, 0.40],
        ];
        let (scaled, _) = standardize(raw.view()).unwrap();

        let mut rng = ChaCha8Rng::seed_from_u64(AnalysisConfig::default().seed);
        let fit = fit_kmeans(scaled.view(), 2, &KMeansParams::default(), &mut rng).unwrap();

        let labels = &fit.labels;
        assert!(labels[..3].iter().all(|&l| l == labels[0]));
        assert!(labels[3..].iter().all(|&l| l == labels[3]));
        assert_ne!(labels[0], labels[3]);
        assert!(silhouette(scaled.view(), labels).unwrap() > 0.8);
    }

    #[test]
    fn fits_are_reproducible_and_order_independent() {
        let engine = ClusteringEngine::new(&AnalysisConfig::default());
        let data = two_groups();
        let forward = [
            candidate(ModelFamily::KMeans, 2),
            candidate(ModelFamily::GaussianMixture, 3),
        ];
        let backward = [forward[1], forward[0]];

        let a = engine.fit_all(data.view(), &forward, &null_progress()).unwrap();
        let b = engine.fit_all(data.view(), &backward, &null_progress()).unwrap();
        assert_eq!(a[0], b[1]);
        assert_eq!(a[1], b[0]);
    }

    #[test]
    fn invalid_k_surfaces_from_fit_all() {
        let engine = ClusteringEngine::new(&AnalysisConfig::default());
        let data = two_groups();
        let err = engine
            .fit_all(
                data.view(),
                &[candidate(ModelFamily::GaussianMixture, 6)],
                &null_progress(),
            )
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidK { k: 6, n: 6 }));
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ProgressCallback for Recorder {
        fn begin(&self, total: u64) {
            self.events.lock().unwrap().push(format!("begin {total}"));
        }
        fn inc(&self, delta: u64) {
            self.events.lock().unwrap().push(format!("inc {delta}"));
        }
        fn set_message(&self, msg: String) {
            self.events.lock().unwrap().push(msg);
        }
        fn finish(&self, msg: String) {
            self.events.lock().unwrap().push(format!("finish {msg}"));
        }
        fn finish_and_clear(&self) {}
    }

    #[test]
    fn fit_all_reports_one_unit_per_candidate() {
        let engine = ClusteringEngine::new(&AnalysisConfig::default());
        let recorder = Arc::new(Recorder::default());
        let progress: Arc<dyn ProgressCallback> = recorder.clone();
        engine
            .fit_all(
                two_groups().view(),
                &[
                    candidate(ModelFamily::KMeans, 2),
                    candidate(ModelFamily::KMeans, 3),
                ],
                &progress,
            )
            .unwrap();

        let events = recorder.events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                "begin 2",
                "Fitting KMeans (K = 2)",
                "inc 1",
                "Fitting KMeans (K = 3)",
                "inc 1",
                "finish Fitted 2 models",
            ]
        );
    }
}
