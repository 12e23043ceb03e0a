//! Principal-component projection for visual diagnostics.
//!
//! The projection is never fed back into clustering: models are fitted on
//! the full standardized feature space and the 2-D coordinates exist only
//! to plot and sanity-check the result.

use crime_trends_analytics_models::VarianceDiagnostics;
use ndarray::{Array2, ArrayView2, Axis, s};

use crate::AnalyticsError;
use crate::linalg::symmetric_eigen;

/// Number of axes kept for plotting.
pub const PLOT_COMPONENTS: usize = 2;

/// A fitted principal-component projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// `N x n_components` coordinates of every observation.
    pub coordinates: Array2<f64>,
    /// `D x n_components` loadings; column `j` is the unit direction of
    /// axis `j`.
    pub components: Array2<f64>,
    /// Variance diagnostics over all `D` axes.
    pub diagnostics: VarianceDiagnostics,
}

/// Projects `data` onto its leading principal axes.
///
/// Axes are ordered by decreasing explained variance. Each loading vector
/// is oriented so that its largest-magnitude entry is positive, which makes
/// the output deterministic.
///
/// # Errors
///
/// Returns [`AnalyticsError::Shape`] if there are fewer than two rows, if
/// `n_components` is zero or exceeds the column count, or if the data has
/// no variance at all.
pub fn principal_components(
    data: ArrayView2<'_, f64>,
    n_components: usize,
) -> Result<Projection, AnalyticsError> {
    let (rows, columns) = data.dim();
    if rows < 2 {
        return Err(AnalyticsError::Shape {
            message: format!("principal components need at least 2 rows, got {rows}"),
        });
    }
    if n_components == 0 || n_components > columns {
        return Err(AnalyticsError::Shape {
            message: format!("cannot keep {n_components} of {columns} components"),
        });
    }

    let mean = data.mean_axis(Axis(0)).ok_or_else(|| AnalyticsError::Shape {
        message: "empty data".to_string(),
    })?;
    let centred = &data - &mean;

    #[allow(clippy::cast_precision_loss)]
    let dof = (rows - 1) as f64;
    let covariance = centred.t().dot(&centred) / dof;

    let (values, vectors) = symmetric_eigen(covariance.view());
    let eigenvalues: Vec<f64> = values.iter().map(|v| v.max(0.0)).collect();
    let total: f64 = eigenvalues.iter().sum();
    if total <= 0.0 {
        return Err(AnalyticsError::Shape {
            message: "data has zero total variance".to_string(),
        });
    }

    let explained_variance_ratio: Vec<f64> = eigenvalues.iter().map(|v| v / total).collect();
    let cumulative_variance_ratio: Vec<f64> = explained_variance_ratio
        .iter()
        .scan(0.0, |acc, r| {
            *acc += r;
            Some(*acc)
        })
        .collect();
    let singular_values = eigenvalues.iter().map(|v| (v * dof).sqrt()).collect();
    let retained_ratio = cumulative_variance_ratio[n_components - 1];

    let components = vectors.slice(s![.., ..n_components]).to_owned();
    let coordinates = centred.dot(&components);

    log::info!(
        "First {n_components} principal components explain {:.1}% of variance",
        retained_ratio * 100.0
    );

    Ok(Projection {
        coordinates,
        components,
        diagnostics: VarianceDiagnostics {
            explained_variance_ratio,
            cumulative_variance_ratio,
            eigenvalues,
            singular_values,
            retained_ratio,
        },
    })
}
