//! Column-wise z-score standardization of the feature matrix.

use crime_trends_neighborhood_models::{NeighbourhoodRecord, SesFeature};
use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::AnalyticsError;

/// A column is degenerate when its standard deviation falls below this
/// fraction of its magnitude.
const RELATIVE_STD_FLOOR: f64 = 1e-12;

/// Builds the `N x 4` raw feature matrix, columns in [`SesFeature::ALL`]
/// order.
#[must_use]
pub fn feature_matrix(records: &[NeighbourhoodRecord]) -> Array2<f64> {
    let mut matrix = Array2::<f64>::zeros((records.len(), SesFeature::ALL.len()));
    for (mut row, record) in matrix.axis_iter_mut(Axis(0)).zip(records) {
        for (cell, value) in row.iter_mut().zip(record.feature_vector()) {
            *cell = value;
        }
    }
    matrix
}

fn column_name(column: usize, columns: usize) -> String {
    if columns == SesFeature::ALL.len() {
        SesFeature::ALL[column].to_string()
    } else {
        format!("column {column}")
    }
}

/// Per-column means and population standard deviations of a fitted
/// matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Scaler {
    /// Column means.
    pub means: Array1<f64>,
    /// Column standard deviations (`N` denominator).
    pub stds: Array1<f64>,
}

impl Scaler {
    /// Learns column means and standard deviations.
    ///
    /// # Errors
    ///
    /// * [`AnalyticsError::Shape`] if the matrix has no rows or columns.
    /// * [`AnalyticsError::DegenerateFeature`] if a column contains a
    ///   non-finite value or has (near-)zero variance.
    pub fn fit(data: ArrayView2<'_, f64>) -> Result<Self, AnalyticsError> {
        let (rows, columns) = data.dim();
        if rows == 0 || columns == 0 {
            return Err(AnalyticsError::Shape {
                message: format!("cannot standardize a {rows} x {columns} matrix"),
            });
        }

        let mut means = Array1::<f64>::zeros(columns);
        let mut stds = Array1::<f64>::zeros(columns);

        for (j, column) in data.axis_iter(Axis(1)).enumerate() {
            if let Some(bad) = column.iter().find(|v| !v.is_finite()) {
                return Err(AnalyticsError::DegenerateFeature {
                    feature: column_name(j, columns),
                    reason: format!("non-finite value {bad}"),
                });
            }

            #[allow(clippy::cast_precision_loss)]
            let n = rows as f64;
            let mean = column.sum() / n;
            let variance = column.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
            let std = variance.sqrt();

            if std <= RELATIVE_STD_FLOOR * mean.abs().max(1.0) {
                return Err(AnalyticsError::DegenerateFeature {
                    feature: column_name(j, columns),
                    reason: format!("zero variance (every value is {mean})"),
                });
            }

            means[j] = mean;
            stds[j] = std;
        }

        Ok(Self { means, stds })
    }

    /// Applies `(x - mean) / std` column-wise.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Shape`] if the column count differs from
    /// the fitted matrix.
    pub fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>, AnalyticsError> {
        self.check_columns(data)?;
        Ok((&data - &self.means) / &self.stds)
    }

    /// Maps standardized values back to the original units.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Shape`] if the column count differs from
    /// the fitted matrix.
    pub fn inverse_transform(
        &self,
        data: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>, AnalyticsError> {
        self.check_columns(data)?;
        Ok(&data * &self.stds + &self.means)
    }

    fn check_columns(&self, data: ArrayView2<'_, f64>) -> Result<(), AnalyticsError> {
        if data.ncols() == self.means.len() {
            Ok(())
        } else {
            Err(AnalyticsError::Shape {
                message: format!(
                    "expected {} columns, got {}",
                    self.means.len(),
                    data.ncols()
                ),
            })
        }
    }
}

/// Standardizes every column to mean 0 and unit population variance.
///
/// # Errors
///
/// See [`Scaler::fit`].
pub fn standardize(data: ArrayView2<'_, f64>) -> Result<(Array2<f64>, Scaler), AnalyticsError> {
    let scaler = Scaler::fit(data)?;
    let standardized = scaler.transform(data)?;
    log::debug!(
        "Standardized {} x {} feature matrix",
        data.nrows(),
        data.ncols()
    );
    Ok((standardized, scaler))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    use super::*;

    fn sample() -> Array2<f64> {
        array![
            [52_000.0, 0.31, 0.07, 0.22],
            [118_000.0, 0.62, 0.04, 0.12],
            [41_000.0, 0.19, 0.11, 0.41],
            [76_500.0, 0.44, 0.06, 0.18],
            [63_250.0, 0.35, 0.09, 0.30],
        ]
    }

    #[test]
    fn standardized_columns_have_zero_mean_and_unit_std() {
        let (z, _) = standardize(sample().view()).unwrap();
        #[allow(clippy::cast_precision_loss)]
        let n = z.nrows() as f64;
        for column in z.axis_iter(Axis(1)) {
            let mean = column.sum() / n;
            let std = (column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
            assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-9);
            assert_abs_diff_eq!(std, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn inverse_transform_recovers_raw_values() {
        let raw = sample();
        let (z, scaler) = standardize(raw.view()).unwrap();
        let back = scaler.inverse_transform(z.view()).unwrap();
        for (a, b) in back.iter().zip(raw.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn constant_column_is_degenerate() {
        let mut raw = sample();
        raw.column_mut(2).fill(0.08);
        let err = standardize(raw.view()).unwrap_err();
        match err {
            AnalyticsError::DegenerateFeature { feature, .. } => {
                assert_eq!(feature, "unemployment_rate");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn non_finite_value_is_degenerate() {
        let mut raw = sample();
        raw[[1, 0]] = f64::NAN;
        assert!(matches!(
            standardize(raw.view()),
            Err(AnalyticsError::DegenerateFeature { .. })
        ));
    }

    #[test]
    fn empty_matrix_is_rejected() {
        let raw = Array2::<f64>::zeros((0, 4));
        assert!(matches!(
            standardize(raw.view()),
            Err(AnalyticsError::Shape { .. })
        ));
    }

    #[test]
    fn transform_checks_column_count() {
        let (_, scaler) = standardize(sample().view()).unwrap();
        let narrow = Array2::<f64>::zeros((2, 3));
        assert!(matches!(
            scaler.transform(narrow.view()),
            Err(AnalyticsError::Shape { .. })
        ));
    }
}
