//! Small dense linear-algebra kernels on `ndarray` matrices.
//!
//! The feature space has four dimensions, so cyclic Jacobi and a plain
//! Cholesky factorisation are both exact enough and fast enough.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

const JACOBI_MAX_SWEEPS: usize = 100;
const JACOBI_TOLERANCE: f64 = 1e-14;

/// Eigen-decomposition of a symmetric matrix.
///
/// Returns eigenvalues in descending order and the matching unit
/// eigenvectors as the columns of the second matrix. Each eigenvector is
/// oriented so that its largest-magnitude entry is positive.
#[must_use]
pub fn symmetric_eigen(matrix: ArrayView2<'_, f64>) -> (Array1<f64>, Array2<f64>) {
    let n = matrix.nrows();
    let mut a = matrix.to_owned();
    let mut v = Array2::<f64>::eye(n);

    for _ in 0..JACOBI_MAX_SWEEPS {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += a[[p, q]] * a[[p, q]];
            }
        }
        let scale: f64 = a.diag().iter().map(|x| x * x).sum::<f64>().max(1.0);
        if off <= JACOBI_TOLERANCE * JACOBI_TOLERANCE * scale {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq.abs() < f64::MIN_POSITIVE {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + theta.hypot(1.0));
                let c = 1.0 / t.hypot(1.0);
                let s = t * c;

                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| a[[j, j]].total_cmp(&a[[i, i]]));

    let values = Array1::from_iter(order.iter().map(|&i| a[[i, i]]));
    let mut vectors = Array2::<f64>::zeros((n, n));
    for (dst, &src) in order.iter().enumerate() {
        let column = v.column(src);
        let pivot = column
            .iter()
            .copied()
            .max_by(|x, y| x.abs().total_cmp(&y.abs()))
            .unwrap_or(1.0);
        let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
        vectors.column_mut(dst).assign(&(&column * sign));
    }

    (values, vectors)
}

/// Lower-triangular Cholesky factor `L` with `L Lᵀ = matrix`.
///
/// Returns `None` if the matrix is not positive definite.
#[must_use]
pub fn cholesky(matrix: ArrayView2<'_, f64>) -> Option<Array2<f64>> {
    let n = matrix.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = matrix[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if !(sum.is_finite() && sum > 0.0) {
                    return None;
                }
                l[[i, i]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }

    Some(l)
}

/// Solves `L x = b` for lower-triangular `L`.
#[must_use]
pub fn forward_substitute(l: ArrayView2<'_, f64>, b: ArrayView1<'_, f64>) -> Array1<f64> {
    let n = b.len();
    let mut x = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * x[k];
        }
        x[i] = sum / l[[i, i]];
    }
    x
}

/// Squared Euclidean distance between two vectors.
#[must_use]
pub fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::{Axis, array};

    use super::*;

    #[test]
    fn eigen_of_diagonal_matrix_is_sorted() {
        let m = array![[1.0, 0.0, 0.0], [0.0, 3.0, 0.0], [0.0, 0.0, 2.0]];
        let (values, vectors) = symmetric_eigen(m.view());
        assert_abs_diff_eq!(values[0], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(values[1], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(values[2], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(vectors[[1, 0]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn eigen_reconstructs_symmetric_matrix() {
        let m = array![
            [4.0, 1.0, 0.5, 0.2],
            [1.0, 3.0, 0.3, 0.1],
            [0.5, 0.3, 2.0, 0.4],
            [0.2, 0.1, 0.4, 1.0]
        ];
        let (values, vectors) = symmetric_eigen(m.view());
        let lambda = Array2::from_diag(&values);
        let rebuilt = vectors.dot(&lambda).dot(&vectors.t());
        for (a, b) in rebuilt.iter().zip(m.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
        }
        let gram = vectors.t().dot(&vectors);
        for (a, b) in gram.iter().zip(Array2::<f64>::eye(4).iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
        }
        for column in vectors.axis_iter(Axis(1)) {
            let pivot = column
                .iter()
                .copied()
                .max_by(|x, y| x.abs().total_cmp(&y.abs()))
                .unwrap();
            assert!(pivot > 0.0);
        }
    }

    #[test]
    fn cholesky_factors_positive_definite_matrix() {
        let m = array![[4.0, 2.0], [2.0, 3.0]];
        let l = cholesky(m.view()).unwrap();
        let rebuilt = l.dot(&l.t());
        for (a, b) in rebuilt.iter().zip(m.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
        let x = forward_substitute(l.view(), array![2.0, 1.0].view());
        let back = l.dot(&x);
        assert_abs_diff_eq!(back[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(back[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn cholesky_rejects_singular_matrix() {
        let m = array![[1.0, 1.0], [1.0, 1.0]];
        assert!(cholesky(m.view()).is_none());
    }
}
