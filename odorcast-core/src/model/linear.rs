//! Linear regressors: ordinary least squares, elastic net / lasso, Huber.
//!
//! All three are single-output; the factory wraps them in
//! [`MultiOutput`](super::MultiOutput) for multi-column labels.

use serde::{Deserialize, Serialize};

use super::linalg::{dot, median, soft_threshold, weighted_least_squares};
use super::{
    check_predict, check_training, require_single_output, Estimator, FitContext, FitReport,
    ModelError,
};
use crate::frame::Matrix;

/// Fitted linear coefficients shared by the estimators below.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub coef: Vec<f64>,
    pub intercept: f64,
}

impl LinearFit {
    fn predict(&self, x: &Matrix) -> Matrix {
        Matrix::column_vector(
            (0..x.rows())
                .map(|r| dot(x.row(r), &self.coef) + self.intercept)
                .collect(),
        )
    }
}

fn predict_fitted(fit: &Option<LinearFit>, x: &Matrix) -> Result<Matrix, ModelError> {
    let fit = fit.as_ref().ok_or(ModelError::NotFitted)?;
    check_predict(Some(fit.coef.len()), x)?;
    Ok(fit.predict(x))
}

// ─── Ordinary least squares ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinearRegression {
    fit: Option<LinearFit>,
}

impl LinearRegression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coefficients(&self) -> Option<&LinearFit> {
        self.fit.as_ref()
    }
}

impl Estimator for LinearRegression {
    fn fit(
        &mut self,
        x: &Matrix,
        y: &Matrix,
        _ctx: &FitContext<'_>,
    ) -> Result<FitReport, ModelError> {
        check_training(x, y)?;
        require_single_output("linear_regression", y)?;
        let mut report = FitReport::default();
        let (coef, intercept) = match weighted_least_squares(x, &y.column(0), None, 0.0) {
            Some(solution) => solution,
            None => {
                report.warn("normal equations are singular; fitted the mean only");
                (vec![0.0; x.cols()], y.column(0).iter().sum::<f64>() / x.rows() as f64)
            }
        };
        self.fit = Some(LinearFit { coef, intercept });
        Ok(report)
    }

    fn predict(&self, x: &Matrix) -> Result<Matrix, ModelError> {
        predict_fitted(&self.fit, x)
    }
}

// ─── Elastic net / lasso ─────────────────────────────────────────────

/// Coordinate-descent elastic net minimising
/// `1/(2n)·‖y − Xw − b‖² + α·ρ·‖w‖₁ + α·(1−ρ)/2·‖w‖²`.
///
/// `l1_ratio = 1` is the lasso.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticNet {
    pub alpha: f64,
    pub l1_ratio: f64,
    pub max_iter: usize,
    pub tol: f64,
    fit: Option<LinearFit>,
}

impl ElasticNet {
    pub fn new(alpha: f64, l1_ratio: f64, max_iter: usize) -> Self {
        Self {
            alpha,
            l1_ratio,
            max_iter,
            tol: 1e-4,
            fit: None,
        }
    }

    pub fn lasso(alpha: f64, max_iter: usize) -> Self {
        Self::new(alpha, 1.0, max_iter)
    }

    pub fn coefficients(&self) -> Option<&LinearFit> {
        self.fit.as_ref()
    }
}

impl Estimator for ElasticNet {
    fn fit(
        &mut self,
        x: &Matrix,
        y: &Matrix,
        _ctx: &FitContext<'_>,
    ) -> Result<FitReport, ModelError> {
        check_training(x, y)?;
        require_single_output("elastic_net", y)?;
        let n = x.rows();
        let d = x.cols();
        let mut report = FitReport::default();

        let y0 = y.column(0);
        let ym = y0.iter().sum::<f64>() / n as f64;
        let xm: Vec<f64> = (0..d)
            .map(|j| (0..n).map(|i| x.get(i, j)).sum::<f64>() / n as f64)
            .collect();
        let cols: Vec<Vec<f64>> = (0..d)
            .map(|j| (0..n).map(|i| x.get(i, j) - xm[j]).collect())
            .collect();
        let norms: Vec<f64> = cols.iter().map(|c| dot(c, c)).collect();

        let l1 = n as f64 * self.alpha * self.l1_ratio;
        let l2 = n as f64 * self.alpha * (1.0 - self.l1_ratio);
        let mut w = vec![0.0; d];
        let mut residual: Vec<f64> = y0.iter().map(|v| v - ym).collect();
        let mut converged = false;

        for _ in 0..self.max_iter {
            let mut max_step = 0.0_f64;
            let mut max_w = 0.0_f64;
            for j in 0..d {
                if norms[j] == 0.0 {
                    continue;
                }
                let old = w[j];
                let rho = dot(&cols[j], &residual) + norms[j] * old;
                let new = soft_threshold(rho, l1) / (norms[j] + l2);
                if new != old {
                    let delta = new - old;
                    for (r, c) in residual.iter_mut().zip(&cols[j]) {
                        *r -= c * delta;
                    }
                    w[j] = new;
                }
                max_step = max_step.max((new - old).abs());
                max_w = max_w.max(new.abs());
            }
            if max_w == 0.0 || max_step / max_w < self.tol {
                converged = true;
                break;
            }
        }
        if !converged {
            report.warn(format!(
                "elastic net did not converge within max_iter={}",
                self.max_iter
            ));
        }

        let intercept = ym - dot(&xm, &w);
        self.fit = Some(LinearFit { coef: w, intercept });
        Ok(report)
    }

    fn predict(&self, x: &Matrix) -> Result<Matrix, ModelError> {
        predict_fitted(&self.fit, x)
    }
}

// ─── Huber ───────────────────────────────────────────────────────────

/// Robust regression with the Huber loss, fitted by iteratively
/// reweighted least squares. The scale is re-estimated each iteration as
/// the normalised median absolute deviation of the residuals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HuberRegressor {
    pub epsilon: f64,
    pub alpha: f64,
    pub max_iter: usize,
    pub tol: f64,
    fit: Option<LinearFit>,
}

impl HuberRegressor {
    pub fn new(max_iter: usize) -> Self {
        Self {
            epsilon: 1.35,
            alpha: 1e-4,
            max_iter,
            tol: 1e-5,
            fit: None,
        }
    }

    pub fn coefficients(&self) -> Option<&LinearFit> {
        self.fit.as_ref()
    }
}

impl Estimator for HuberRegressor {
    fn fit(
        &mut self,
        x: &Matrix,
        y: &Matrix,
        _ctx: &FitContext<'_>,
    ) -> Result<FitReport, ModelError> {
        check_training(x, y)?;
        require_single_output("huber", y)?;
        let n = x.rows();
        let y0 = y.column(0);
        let mut report = FitReport::default();
        let mut weights = vec![1.0; n];
        let mut current = weighted_least_squares(x, &y0, Some(&weights), self.alpha)
            .map(|(coef, intercept)| LinearFit { coef, intercept })
            .unwrap_or_else(|| LinearFit {
                coef: vec![0.0; x.cols()],
                intercept: 0.0,
            });
        let mut converged = false;

        for _ in 0..self.max_iter {
            let residuals: Vec<f64> = (0..n)
                .map(|i| y0[i] - dot(x.row(i), &current.coef) - current.intercept)
                .collect();
            let centre = median(&mut residuals.clone()).unwrap_or(0.0);
            let mut deviations: Vec<f64> = residuals.iter().map(|r| (r - centre).abs()).collect();
            let sigma = median(&mut deviations).unwrap_or(0.0) / 0.6745;
            if sigma < 1e-12 {
                converged = true;
                break;
            }
            for (w, r) in weights.iter_mut().zip(&residuals) {
                let z = r.abs() / sigma;
                *w = if z <= self.epsilon { 1.0 } else { self.epsilon / z };
            }
            let Some((coef, intercept)) =
                weighted_least_squares(x, &y0, Some(&weights), self.alpha)
            else {
                report.warn("weighted normal equations became singular");
                break;
            };
            let step = coef
                .iter()
                .zip(&current.coef)
                .map(|(a, b)| (a - b).abs())
                .fold((intercept - current.intercept).abs(), f64::max);
            let scale = coef
                .iter()
                .fold(intercept.abs(), |m, c| m.max(c.abs()));
            current = LinearFit { coef, intercept };
            if step <= self.tol * (1.0 + scale) {
                converged = true;
                break;
            }
        }
        if !converged {
            report.warn(format!(
                "huber regression did not converge within max_iter={}",
                self.max_iter
            ));
        }

        self.fit = Some(current);
        Ok(report)
    }

    fn predict(&self, x: &Matrix) -> Result<Matrix, ModelError> {
        predict_fitted(&self.fit, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> (Matrix, Matrix) {
        let x = Matrix::from_rows(&(0..30).map(|i| vec![i as f64, (i % 5) as f64]).collect::<Vec<_>>())
            .unwrap();
        let y = Matrix::column_vector((0..30).map(|i| 3.0 * i as f64 - 2.0 * (i % 5) as f64 + 1.0).collect());
        (x, y)
    }

    #[test]
    fn ols_recovers_coefficients() {
        let (x, y) = line();
        let mut m = LinearRegression::new();
        let report = m.fit(&x, &y, &FitContext::sequential()).unwrap();
        assert!(report.is_clean());
        let fit = m.coefficients().unwrap();
        assert!((fit.coef[0] - 3.0).abs() < 1e-6);
        assert!((fit.coef[1] + 2.0).abs() < 1e-6);
        assert!((fit.intercept - 1.0).abs() < 1e-6);
    }

    #[test]
    fn lasso_shrinks_irrelevant_feature_to_zero() {
        let x = Matrix::from_rows(&(0..40).map(|i| vec![i as f64, ((i * 13) % 7) as f64]).collect::<Vec<_>>())
            .unwrap();
        let y = Matrix::column_vector((0..40).map(|i| 0.5 * i as f64).collect());
        let mut m = ElasticNet::lasso(0.5, 1000);
        m.fit(&x, &y, &FitContext::sequential()).unwrap();
        let fit = m.coefficients().unwrap();
        assert!(fit.coef[0] > 0.4);
        assert_eq!(fit.coef[1], 0.0);
    }

    #[test]
    fn elastic_net_warns_when_iteration_cap_hit() {
        let (x, y) = line();
        let mut m = ElasticNet::new(0.1, 0.5, 1);
        let report = m.fit(&x, &y, &FitContext::sequential()).unwrap();
        assert!(!report.is_clean());
        assert!(m.predict(&x).is_ok());
    }

    #[test]
    fn huber_ignores_outlier() {
        let x = Matrix::column_vector((0..20).map(|i| i as f64).collect());
        let mut values: Vec<f64> = (0..20).map(|i| 2.0 * i as f64).collect();
        values[19] = 500.0;
        let y = Matrix::column_vector(values);

        let mut robust = HuberRegressor::new(1000);
        robust.fit(&x, &y, &FitContext::sequential()).unwrap();
        let mut ols = LinearRegression::new();
        ols.fit(&x, &y, &FitContext::sequential()).unwrap();

        let robust_slope = robust.coefficients().unwrap().coef[0];
        let ols_slope = ols.coefficients().unwrap().coef[0];
        assert!((robust_slope - 2.0).abs() < (ols_slope - 2.0).abs());
    }

    #[test]
    fn single_output_only() {
        let (x, _) = line();
        let y = Matrix::zeros(30, 2);
        let mut m = LinearRegression::new();
        assert!(matches!(
            m.fit(&x, &y, &FitContext::sequential()),
            Err(ModelError::MultiOutputUnsupported { .. })
        ));
    }
}
