//! Full-covariance Gaussian mixture fitted by expectation-maximisation.
//!
//! Responsibilities are initialised from a single seeded K-means run, so
//! the fit is deterministic for a given RNG state. Hard labels are the
//! argmax of the final responsibilities.

use std::f64::consts::PI;

use crime_trends_analytics_models::{KMeansParams, MixtureParams};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;

use crate::AnalyticsError;
use crate::kmeans::{check_k, fit_kmeans};
use crate::linalg::{cholesky, forward_substitute};

/// Keeps component weights strictly positive when a component loses all
/// of its responsibility mass.
const WEIGHT_FLOOR: f64 = 10.0 * f64::EPSILON;

/// One fitted mixture component.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// Mixing weight.
    pub weight: f64,
    /// Component mean.
    pub mean: Array1<f64>,
    /// Full covariance, including the diagonal regularisation.
    pub covariance: Array2<f64>,
    cholesky: Array2<f64>,
}

/// Result of a Gaussian-mixture fit.
#[derive(Debug, Clone, PartialEq)]
pub struct MixtureFit {
    /// Fitted components in cluster-id order.
    pub components: Vec<Component>,
    /// `N x K` posterior membership probabilities.
    pub responsibilities: Array2<f64>,
    /// Argmax of each responsibility row.
    pub labels: Vec<usize>,
    /// Mean per-observation log-likelihood of the final model.
    pub log_likelihood: f64,
    /// EM iterations performed.
    pub n_iter: usize,
    /// Whether the log-likelihood change fell below the tolerance.
    pub converged: bool,
}

fn m_step(
    data: ArrayView2<'_, f64>,
    responsibilities: &Array2<f64>,
    reg_covar: f64,
) -> Result<Vec<Component>, AnalyticsError> {
    #[allow(clippy::cast_precision_loss)]
    let n = data.nrows() as f64;
    let d = data.ncols();

    responsibilities
        .axis_iter(Axis(1))
        .enumerate()
        .map(|(component, r)| {
            let mass = r.sum() + WEIGHT_FLOOR;
            let mean = r.dot(&data) / mass;

            let mut covariance = Array2::<f64>::zeros((d, d));
            for (x, &w) in data.axis_iter(Axis(0)).zip(r.iter()) {
                let diff = &x - &mean;
                for i in 0..d {
                    for j in 0..d {
                        covariance[[i, j]] += w * diff[i] * diff[j];
                    }
                }
            }
            covariance /= mass;
            for i in 0..d {
                covariance[[i, i]] += reg_covar;
            }

            let cholesky = cholesky(covariance.view())
                .ok_or(AnalyticsError::SingularCovariance { component })?;

            Ok(Component {
                weight: mass / n,
                mean,
                covariance,
                cholesky,
            })
        })
        .collect()
}

/// Returns the responsibilities and the mean log-likelihood.
fn e_step(data: ArrayView2<'_, f64>, components: &[Component]) -> (Array2<f64>, f64) {
    let (n, d) = data.dim();
    let k = components.len();
    #[allow(clippy::cast_precision_loss)]
    let log_norm = 0.5 * d as f64 * (2.0 * PI).ln();

    let mut log_prob = Array2::<f64>::zeros((n, k));
    for (c, component) in components.iter().enumerate() {
        let log_det: f64 = component.cholesky.diag().iter().copied().map(f64::ln).sum();
        let log_weight = component.weight.ln();
        for (i, x) in data.axis_iter(Axis(0)).enumerate() {
            let diff = &x - &component.mean;
            let y = forward_substitute(component.cholesky.view(), diff.view());
            let mahalanobis = y.dot(&y);
            log_prob[[i, c]] = log_weight - log_norm - log_det - 0.5 * mahalanobis;
        }
    }

    let mut total = 0.0;
    for mut row in log_prob.axis_iter_mut(Axis(0)) {
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let lse = max + row.iter().map(|v| (v - max).exp()).sum::<f64>().ln();
        total += lse;
        row.mapv_inplace(|v| (v - lse).exp());
    }

    #[allow(clippy::cast_precision_loss)]
    let mean = total / n as f64;
    (log_prob, mean)
}

/// Index of the largest entry of each row; the lowest index wins ties.
#[must_use]
pub fn argmax_rows(matrix: &Array2<f64>) -> Vec<usize> {
    matrix
        .axis_iter(Axis(0))
        .map(|row| {
            let mut best = 0;
            for (j, &v) in row.iter().enumerate() {
                if v > row[best] {
                    best = j;
                }
            }
            best
        })
        .collect()
}

/// Fits a `k`-component full-covariance Gaussian mixture.
///
/// `init` controls the single K-means run that seeds the responsibilities.
///
/// # Errors
///
/// * [`AnalyticsError::InvalidK`] if `k < 2` or `k >= N`.
/// * [`AnalyticsError::SingularCovariance`] if a component covariance is
///   not positive definite even after regularisation.
pub fn fit_mixture<R: Rng>(
    data: ArrayView2<'_, f64>,
    k: usize,
    params: &MixtureParams,
    init: &KMeansParams,
    rng: &mut R,
) -> Result<MixtureFit, AnalyticsError> {
    check_k(k, data.nrows())?;

    let seeding = fit_kmeans(
        data,
        k,
        &KMeansParams {
            n_init: 1,
            max_iter: init.max_iter,
        },
        rng,
    )?;
    let mut responsibilities = Array2::<f64>::zeros((data.nrows(), k));
    for (i, &label) in seeding.labels.iter().enumerate() {
        responsibilities[[i, label]] = 1.0;
    }

    let mut components = m_step(data, &responsibilities, params.reg_covar)?;
    let mut previous = f64::NEG_INFINITY;
    let mut converged = false;
    let mut n_iter = 0;

    while n_iter < params.max_iter {
        n_iter += 1;
        let (r, log_likelihood) = e_step(data, &components);
        responsibilities = r;
        components = m_step(data, &responsibilities, params.reg_covar)?;

        if (log_likelihood - previous).abs() < params.tolerance {
            converged = true;
            break;
        }
        previous = log_likelihood;
    }

    if !converged {
        log::warn!(
            "Gaussian mixture K={k} did not converge within {} iterations",
            params.max_iter
        );
    }

    let (responsibilities, log_likelihood) = e_step(data, &components);
    let labels = argmax_rows(&responsibilities);

    log::debug!(
        "Gaussian mixture K={k}: mean log-likelihood {log_likelihood:.4} after {n_iter} iterations"
    );

    Ok(MixtureFit {
        components,
        responsibilities,
        labels,
        log_likelihood,
        n_iter,
        converged,
    })
}
