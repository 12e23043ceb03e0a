//! Lloyd's K-means with k-means++ seeding and multiple restarts.

use crime_trends_analytics_models::KMeansParams;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;

use crate::AnalyticsError;
use crate::linalg::squared_distance;

/// Result of a K-means fit.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    /// `K x D` cluster centroids.
    pub centroids: Array2<f64>,
    /// Cluster id of every observation, in input row order.
    pub labels: Vec<usize>,
    /// Within-cluster sum of squared distances to the assigned centroid.
    pub inertia: f64,
    /// Lloyd iterations used by the winning restart.
    pub n_iter: usize,
}

/// Rejects cluster counts outside `2..n`.
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidK`] if `k < 2` or `k >= n`.
pub const fn check_k(k: usize, n: usize) -> Result<(), AnalyticsError> {
    if k < 2 || k >= n {
        Err(AnalyticsError::InvalidK { k, n })
    } else {
        Ok(())
    }
}

/// Index of the centroid nearest to `point`; the lowest index wins ties.
#[must_use]
pub fn nearest(point: ArrayView1<'_, f64>, centroids: ArrayView2<'_, f64>) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (c, centroid) in centroids.axis_iter(Axis(0)).enumerate() {
        let d = squared_distance(point, centroid);
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

fn assign(data: ArrayView2<'_, f64>, centroids: ArrayView2<'_, f64>) -> (Vec<usize>, f64) {
    let mut inertia = 0.0;
    let labels = data
        .axis_iter(Axis(0))
        .map(|point| {
            let (c, d) = nearest(point, centroids);
            inertia += d;
            c
        })
        .collect();
    (labels, inertia)
}

/// k-means++ seeding: the first centre is drawn uniformly, each further
/// centre with probability proportional to its squared distance from the
/// nearest centre chosen so far.
fn seed_centroids<R: Rng>(data: ArrayView2<'_, f64>, k: usize, rng: &mut R) -> Array2<f64> {
    let n = data.nrows();
    let mut centroids = Array2::<f64>::zeros((k, data.ncols()));
    centroids.row_mut(0).assign(&data.row(rng.random_range(0..n)));

    let mut closest: Vec<f64> = data
        .axis_iter(Axis(0))
        .map(|p| squared_distance(p, centroids.row(0)))
        .collect();

    for c in 1..k {
        let total: f64 = closest.iter().sum();
        let chosen = if total > 0.0 {
            let mut target = rng.random::<f64>() * total;
            let mut pick = n - 1;
            for (i, d) in closest.iter().enumerate() {
                if target < *d {
                    pick = i;
                    break;
                }
                target -= d;
            }
            pick
        } else {
            rng.random_range(0..n)
        };

        centroids.row_mut(c).assign(&data.row(chosen));
        for (i, p) in data.axis_iter(Axis(0)).enumerate() {
            closest[i] = closest[i].min(squared_distance(p, centroids.row(c)));
        }
    }

    centroids
}

/// Recomputes centroids as member means. An empty cluster takes over the
/// point farthest from its current centroid among clusters that can spare
/// one.
fn update_centroids(data: ArrayView2<'_, f64>, labels: &mut [usize], centroids: &mut Array2<f64>) {
    let k = centroids.nrows();
    let mut sizes = vec![0_usize; k];
    for &l in labels.iter() {
        sizes[l] += 1;
    }

    for empty in 0..k {
        if sizes[empty] > 0 {
            continue;
        }
        let farthest = data
            .axis_iter(Axis(0))
            .enumerate()
            .filter(|(i, _)| sizes[labels[*i]] > 1)
            .map(|(i, p)| (i, squared_distance(p, centroids.row(labels[i]))))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((i, _)) = farthest {
            sizes[labels[i]] -= 1;
            labels[i] = empty;
            sizes[empty] = 1;
        }
    }

    centroids.fill(0.0);
    for (point, &l) in data.axis_iter(Axis(0)).zip(labels.iter()) {
        let mut row = centroids.row_mut(l);
        row += &point;
    }
    for (mut row, &size) in centroids.axis_iter_mut(Axis(0)).zip(&sizes) {
        if size > 0 {
            #[allow(clippy::cast_precision_loss)]
            let size = size as f64;
            row /= size;
        }
    }
}

fn within_cluster_ss(
    data: ArrayView2<'_, f64>,
    labels: &[usize],
    centroids: ArrayView2<'_, f64>,
) -> f64 {
    data.axis_iter(Axis(0))
        .zip(labels)
        .map(|(point, &l)| squared_distance(point, centroids.row(l)))
        .sum()
}

fn lloyd<R: Rng>(
    data: ArrayView2<'_, f64>,
    k: usize,
    max_iter: usize,
    rng: &mut R,
) -> KMeansFit {
    let mut centroids = seed_centroids(data, k, rng);
    let (mut labels, mut inertia) = assign(data, centroids.view());
    let mut n_iter = 0;
    let mut converged = false;

    while n_iter < max_iter {
        n_iter += 1;
        update_centroids(data, &mut labels, &mut centroids);
        let (next, next_inertia) = assign(data, centroids.view());
        inertia = next_inertia;
        if next == labels {
            converged = true;
            break;
        }
        labels = next;
    }

    // Out of iterations: centroids still belong to the previous assignment.
    if !converged {
        update_centroids(data, &mut labels, &mut centroids);
        inertia = within_cluster_ss(data, &labels, centroids.view());
    }

    KMeansFit {
        centroids,
        labels,
        inertia,
        n_iter,
    }
}

/// Fits K-means `params.n_init` times from successive draws of `rng` and
/// keeps the run with the lowest inertia; the earliest run wins ties.
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidK`] if `k < 2` or `k >= N`.
pub fn fit_kmeans<R: Rng>(
    data: ArrayView2<'_, f64>,
    k: usize,
    params: &KMeansParams,
    rng: &mut R,
) -> Result<KMeansFit, AnalyticsError> {
    check_k(k, data.nrows())?;

    let mut best: Option<KMeansFit> = None;
    for run in 0..params.n_init.max(1) {
        let fit = lloyd(data, k, params.max_iter, rng);
        log::trace!(
            "K-means K={k} restart {run}: inertia {:.6} after {} iterations",
            fit.inertia,
            fit.n_iter
        );
        if best.as_ref().is_none_or(|b| fit.inertia < b.inertia) {
            best = Some(fit);
        }
    }

    best.ok_or(AnalyticsError::InvalidK { k, n: data.nrows() })
}
