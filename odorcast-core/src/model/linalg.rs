//! Small dense linear-algebra helpers for the linear estimators.

use crate::frame::Matrix;

/// Solve `a · x = b` for square `a` (row-major, `n × n`) by Gaussian
/// elimination with partial pivoting. `None` if `a` is singular.
pub(crate) fn solve(mut a: Vec<f64>, mut b: Vec<f64>, n: usize) -> Option<Vec<f64>> {
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i * n + col].abs().total_cmp(&a[j * n + col].abs()))?;
        if a[pivot * n + col].abs() < 1e-300 {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap(col * n + k, pivot * n + k);
            }
            b.swap(col, pivot);
        }
        let diag = a[col * n + col];
        for row in col + 1..n {
            let factor = a[row * n + col] / diag;
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row * n + k] -= factor * a[col * n + k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row * n + k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row * n + row];
    }
    Some(x)
}

/// Weighted ridge least squares with an unpenalised intercept.
///
/// Columns are centred on their weighted means, so the intercept never
/// competes with constant columns. Returns `(coef, intercept)`.
pub(crate) fn weighted_least_squares(
    x: &Matrix,
    y: &[f64],
    weights: Option<&[f64]>,
    ridge: f64,
) -> Option<(Vec<f64>, f64)> {
    let n = x.rows();
    let d = x.cols();
    let w = |i: usize| weights.map_or(1.0, |ws| ws[i]);
    let total: f64 = (0..n).map(w).sum();
    if total <= 0.0 {
        return None;
    }

    let mut xm = vec![0.0; d];
    let mut ym = 0.0;
    for i in 0..n {
        let wi = w(i);
        for (m, v) in xm.iter_mut().zip(x.row(i)) {
            *m += wi * v;
        }
        ym += wi * y[i];
    }
    xm.iter_mut().for_each(|m| *m /= total);
    ym /= total;

    let mut a = vec![0.0; d * d];
    let mut b = vec![0.0; d];
    let mut centred = vec![0.0; d];
    for i in 0..n {
        let wi = w(i);
        for (c, (v, m)) in centred.iter_mut().zip(x.row(i).iter().zip(&xm)) {
            *c = v - m;
        }
        let yi = y[i] - ym;
        for j in 0..d {
            b[j] += wi * centred[j] * yi;
            for k in j..d {
                a[j * d + k] += wi * centred[j] * centred[k];
            }
        }
    }
    for j in 0..d {
        for k in 0..j {
            a[j * d + k] = a[k * d + j];
        }
        a[j * d + j] += ridge + 1e-12 * (1.0 + a[j * d + j]);
    }

    let coef = solve(a, b, d)?;
    let intercept = ym - xm.iter().zip(&coef).map(|(m, c)| m * c).sum::<f64>();
    Some((coef, intercept))
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Median of `values` (reorders the slice). `None` when empty.
pub(crate) fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Soft-thresholding operator `sign(z) · max(|z| - gamma, 0)`.
pub(crate) fn soft_threshold(z: f64, gamma: f64) -> f64 {
    if z > gamma {
        z - gamma
    } else if z < -gamma {
        z + gamma
    } else {
        0.0
    }
}
