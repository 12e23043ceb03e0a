//! Internal cluster-validation scores.
//!
//! All three scores are computed in the space the model was fitted in
//! (the standardized features) using Euclidean geometry. Only non-empty
//! clusters participate, so a model that leaves a component unused is
//! scored on the partition it actually produced.

use std::collections::BTreeMap;

use crime_trends_analytics_models::ValidationScores;
use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::AnalyticsError;
use crate::linalg::squared_distance;

/// Centroid distances at or below this are treated as coincident.
const COINCIDENT_DISTANCE: f64 = 1e-12;

/// Row indices of every non-empty cluster, keyed by cluster id.
fn members(
    data: ArrayView2<'_, f64>,
    labels: &[usize],
) -> Result<BTreeMap<usize, Vec<usize>>, AnalyticsError> {
    if labels.len() != data.nrows() {
        return Err(AnalyticsError::Shape {
            message: format!(
                "{} labels for {} observations",
                labels.len(),
                data.nrows()
            ),
        });
    }
    let mut clusters: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        clusters.entry(label).or_default().push(i);
    }
    Ok(clusters)
}

fn centroid(data: ArrayView2<'_, f64>, rows: &[usize]) -> Array1<f64> {
    let mut sum = Array1::<f64>::zeros(data.ncols());
    for &i in rows {
        sum += &data.row(i);
    }
    #[allow(clippy::cast_precision_loss)]
    let n = rows.len() as f64;
    sum / n
}

fn distance(data: ArrayView2<'_, f64>, i: usize, j: usize) -> f64 {
    squared_distance(data.row(i), data.row(j)).sqrt()
}

/// Silhouette coefficient of every observation.
///
/// A singleton cluster contributes a coefficient of 0.
///
/// # Errors
///
/// Returns [`AnalyticsError::UndefinedScore`] unless the labels form
/// between 2 and `N - 1` non-empty clusters.
pub fn silhouette_samples(
    data: ArrayView2<'_, f64>,
    labels: &[usize],
) -> Result<Vec<f64>, AnalyticsError> {
    let clusters = members(data, labels)?;
    let n = labels.len();
    let c = clusters.len();
    if c < 2 || c >= n {
        return Err(AnalyticsError::UndefinedScore {
            metric: "silhouette",
            reason: format!("{c} non-empty clusters for {n} observations"),
        });
    }

    let mean_distance = |i: usize, rows: &[usize], exclude_self: bool| {
        let (sum, count) = rows
            .iter()
            .filter(|&&j| !exclude_self || j != i)
            .fold((0.0, 0_usize), |(sum, count), &j| {
                (sum + distance(data, i, j), count + 1)
            });
        #[allow(clippy::cast_precision_loss)]
        let count = count as f64;
        sum / count
    };

    Ok(labels
        .iter()
        .enumerate()
        .map(|(i, &own)| {
            let own_rows = &clusters[&own];
            if own_rows.len() == 1 {
                return 0.0;
            }
            let a = mean_distance(i, own_rows, true);
            let b = clusters
                .iter()
                .filter(|(id, _)| **id != own)
                .map(|(_, rows)| mean_distance(i, rows, false))
                .fold(f64::INFINITY, f64::min);
            let scale = a.max(b);
            if scale > 0.0 { (b - a) / scale } else { 0.0 }
        })
        .collect())
}

/// Mean silhouette coefficient over all observations.
///
/// # Errors
///
/// Same conditions as [`silhouette_samples`].
pub fn silhouette(data: ArrayView2<'_, f64>, labels: &[usize]) -> Result<f64, AnalyticsError> {
    let samples = silhouette_samples(data, labels)?;
    #[allow(clippy::cast_precision_loss)]
    let n = samples.len() as f64;
    Ok(samples.iter().sum::<f64>() / n)
}

/// Davies-Bouldin index: the mean, over clusters, of the worst ratio of
/// summed within-cluster scatter to centroid separation.
///
/// # Errors
///
/// * [`AnalyticsError::UndefinedScore`] with fewer than 2 non-empty
///   clusters.
/// * [`AnalyticsError::DegenerateClusters`] if two centroids coincide.
pub fn davies_bouldin(data: ArrayView2<'_, f64>, labels: &[usize]) -> Result<f64, AnalyticsError> {
    let clusters = members(data, labels)?;
    let c = clusters.len();
    if c < 2 {
        return Err(AnalyticsError::UndefinedScore {
            metric: "Davies-Bouldin",
            reason: format!("{c} non-empty clusters"),
        });
    }

    let ids: Vec<usize> = clusters.keys().copied().collect();
    let mut centroids = Array2::<f64>::zeros((c, data.ncols()));
    let mut scatter = Vec::with_capacity(c);
    for (row, rows) in clusters.values().enumerate() {
        let center = centroid(data, rows);
        #[allow(clippy::cast_precision_loss)]
        let spread = rows
            .iter()
            .map(|&i| squared_distance(data.row(i), center.view()).sqrt())
            .sum::<f64>()
            / rows.len() as f64;
        centroids.row_mut(row).assign(&center);
        scatter.push(spread);
    }

    let mut total = 0.0;
    for i in 0..c {
        let mut worst = 0.0_f64;
        for j in 0..c {
            if i == j {
                continue;
            }
            let separation = squared_distance(centroids.row(i), centroids.row(j)).sqrt();
            if separation <= COINCIDENT_DISTANCE {
                return Err(AnalyticsError::DegenerateClusters {
                    metric: "Davies-Bouldin",
                    reason: format!("clusters {} and {} share a centroid", ids[i], ids[j]),
                });
            }
            worst = worst.max((scatter[i] + scatter[j]) / separation);
        }
        total += worst;
    }

    #[allow(clippy::cast_precision_loss)]
    let c = c as f64;
    Ok(total / c)
}

/// Calinski-Harabasz variance ratio: between-cluster dispersion over
/// within-cluster dispersion, each normalised by its degrees of freedom.
///
/// # Errors
///
/// * [`AnalyticsError::UndefinedScore`] unless there are between 2 and
///   `N - 1` non-empty clusters.
/// * [`AnalyticsError::DegenerateClusters`] if every cluster has zero
///   within-cluster dispersion.
pub fn calinski_harabasz(
    data: ArrayView2<'_, f64>,
    labels: &[usize],
) -> Result<f64, AnalyticsError> {
    let clusters = members(data, labels)?;
    let n = labels.len();
    let c = clusters.len();
    if c < 2 || c >= n {
        return Err(AnalyticsError::UndefinedScore {
            metric: "Calinski-Harabasz",
            reason: format!("{c} non-empty clusters for {n} observations"),
        });
    }

    let overall = data.mean_axis(Axis(0)).ok_or_else(|| AnalyticsError::Shape {
        message: "empty data".to_string(),
    })?;

    let mut between = 0.0;
    let mut within = 0.0;
    for rows in clusters.values() {
        let center = centroid(data, rows);
        #[allow(clippy::cast_precision_loss)]
        let size = rows.len() as f64;
        between += size * squared_distance(center.view(), overall.view());
        within += rows
            .iter()
            .map(|&i| squared_distance(data.row(i), center.view()))
            .sum::<f64>();
    }

    if within <= 0.0 {
        return Err(AnalyticsError::DegenerateClusters {
            metric: "Calinski-Harabasz",
            reason: "within-cluster dispersion is zero".to_string(),
        });
    }

    #[allow(clippy::cast_precision_loss)]
    let (between_dof, within_dof) = ((c - 1) as f64, (n - c) as f64);
    Ok((between / between_dof) / (within / within_dof))
}

/// Computes all three validation scores for one assignment.
///
/// # Errors
///
/// Propagates the first error of [`silhouette`], [`davies_bouldin`], or
/// [`calinski_harabasz`].
pub fn score(data: ArrayView2<'_, f64>, labels: &[usize]) -> Result<ValidationScores, AnalyticsError> {
    Ok(ValidationScores {
        silhouette: silhouette(data, labels)?,
        davies_bouldin: davies_bouldin(data, labels)?,
        calinski_harabasz: calinski_harabasz(data, labels)?,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn line() -> Array2<f64> {
        array![[0.0], [1.0], [10.0], [11.0]]
    }

    #[test]
    fn known_values_on_a_line() {
        let data = line();
        let labels = [0, 0, 1, 1];

        let expected = (2.0 * 9.5 / 10.5 + 2.0 * 8.5 / 9.5) / 4.0;
        assert_abs_diff_eq!(silhouette(data.view(), &labels).unwrap(), expected, epsilon = 1e-12);
        assert_abs_diff_eq!(davies_bouldin(data.view(), &labels).unwrap(), 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(
            calinski_harabasz(data.view(), &labels).unwrap(),
            200.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn cluster_ids_need_not_be_contiguous() {
        let data = line();
        let a = score(data.view(), &[0, 0, 1, 1]).unwrap();
        let b = score(data.view(), &[7, 7, 3, 3]).unwrap();
        assert_abs_diff_eq!(a.silhouette, b.silhouette, epsilon = 1e-12);
        assert_abs_diff_eq!(a.davies_bouldin, b.davies_bouldin, epsilon = 1e-12);
        assert_abs_diff_eq!(a.calinski_harabasz, b.calinski_harabasz, epsilon = 1e-9);
    }

    #[test]
    fn separated_blobs_score_near_perfect_silhouette() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut data = Array2::<f64>::zeros((100, 2));
        let mut labels = Vec::with_capacity(100);
        for i in 0..100 {
            let center = if i < 50 { 0.0 } else { 20.0 };
            data[[i, 0]] = center + rng.random_range(-0.5..0.5);
            data[[i, 1]] = center + rng.random_range(-0.5..0.5);
            labels.push(usize::from(i >= 50));
        }
        let scores = score(data.view(), &labels).unwrap();
        assert!(scores.silhouette > 0.9);
        assert!(scores.davies_bouldin < 0.1);
        assert!(scores.calinski_harabasz > 1000.0);
    }

    #[test]
    fn singleton_cluster_contributes_zero() {
        let data = array![[0.0], [0.1], [5.0]];
        let samples = silhouette_samples(data.view(), &[0, 0, 1]).unwrap();
        assert_abs_diff_eq!(samples[2], 0.0);
        assert!(samples[0] > 0.9);
        let mean = silhouette(data.view(), &[0, 0, 1]).unwrap();
        assert_abs_diff_eq!(mean, samples.iter().sum::<f64>() / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn coincident_centroids_are_degenerate_for_davies_bouldin() {
        let data = array![[-1.0, 0.0], [1.0, 0.0], [0.0, -1.0], [0.0, 1.0]];
        let err = davies_bouldin(data.view(), &[0, 0, 1, 1]).unwrap_err();
        assert!(matches!(err, AnalyticsError::DegenerateClusters { .. }));
    }

    #[test]
    fn single_cluster_is_undefined() {
        let data = line();
        for result in [
            silhouette(data.view(), &[0, 0, 0, 0]),
            davies_bouldin(data.view(), &[0, 0, 0, 0]),
            calinski_harabasz(data.view(), &[0, 0, 0, 0]),
        ] {
            assert!(matches!(result, Err(AnalyticsError::UndefinedScore { .. })));
        }
    }

    #[test]
    fn one_cluster_per_point_is_undefined() {
        let data = line();
        assert!(matches!(
            silhouette(data.view(), &[0, 1, 2, 3]),
            Err(AnalyticsError::UndefinedScore { .. })
        ));
        assert!(matches!(
            calinski_harabasz(data.view(), &[0, 1, 2, 3]),
            Err(AnalyticsError::UndefinedScore { .. })
        ));
    }

    #[test]
    fn zero_within_dispersion_is_degenerate_for_calinski_harabasz() {
        let data = array![[0.0], [0.0], [3.0], [3.0]];
        assert!(matches!(
            calinski_harabasz(data.view(), &[0, 0, 1, 1]),
            Err(AnalyticsError::DegenerateClusters { .. })
        ));
    }

    #[test]
    fn label_count_must_match_rows() {
        assert!(matches!(
            score(line().view(), &[0, 1]),
            Err(AnalyticsError::Shape { .. })
        ));
    }
}
