//! L1-penalised logistic regression, fitted with FISTA.
//!
//! Minimises `mean log-loss + ‖w‖₁ / (C·n)` (the intercept is not
//! penalised). More than two classes are handled one-vs-rest.

use serde::{Deserialize, Serialize};

use super::linalg::{dot, soft_threshold};
use super::linear::LinearFit;
use super::{
    check_predict, check_training, require_single_output, ClassIndex, Estimator, FitContext,
    FitReport, ModelError,
};
use crate::frame::Matrix;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub c: f64,
    pub max_iter: usize,
    pub tol: f64,
    classes: Option<ClassIndex>,
    /// One model for binary problems, one per class for one-vs-rest.
    models: Vec<LinearFit>,
    n_features: Option<usize>,
}

impl LogisticRegression {
    pub fn l1(c: f64) -> Self {
        Self {
            c,
            max_iter: 1000,
            tol: 1e-4,
            classes: None,
            models: Vec::new(),
            n_features: None,
        }
    }

    /// Decision values per fitted model for one row.
    fn decision(&self, row: &[f64]) -> Vec<f64> {
        self.models
            .iter()
            .map(|m| dot(row, &m.coef) + m.intercept)
            .collect()
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Gradient of the mean log-loss; the last entry is the intercept.
fn gradient(x: &Matrix, z: &[f64], params: &[f64]) -> Vec<f64> {
    let d = x.cols();
    let mut grad = vec![0.0; d + 1];
    for (i, target) in z.iter().enumerate() {
        let row = x.row(i);
        let err = sigmoid(dot(row, &params[..d]) + params[d]) - target;
        for (g, v) in grad.iter_mut().zip(row) {
            *g += err * v;
        }
        grad[d] += err;
    }
    let n = x.rows() as f64;
    grad.iter_mut().for_each(|g| *g /= n);
    grad
}

/// Fit one binary problem (`z` in {0, 1}). Returns the fit and whether it
/// converged.
fn fit_binary(x: &Matrix, z: &[f64], lambda: f64, max_iter: usize, tol: f64) -> (LinearFit, bool) {
    let n = x.rows() as f64;
    let d = x.cols();
    let trace: f64 = (0..x.rows())
        .map(|i| x.row(i).iter().map(|v| v * v).sum::<f64>())
        .sum::<f64>()
        / n;
    let step = 1.0 / (0.25 * (1.0 + trace));

    let mut params = vec![0.0; d + 1];
    let mut momentum = params.clone();
    let mut t = 1.0_f64;
    let mut converged = false;

    for _ in 0..max_iter {
        let grad = gradient(x, z, &momentum);
        let mut next: Vec<f64> = momentum
            .iter()
            .zip(&grad)
            .map(|(p, g)| p - step * g)
            .collect();
        for w in next.iter_mut().take(d) {
            *w = soft_threshold(*w, step * lambda);
        }

        let t_next = (1.0 + (1.0 + 4.0 * t * t).sqrt()) / 2.0;
        let change = next
            .iter()
            .zip(&params)
            .fold(0.0_f64, |m, (a, b)| m.max((a - b).abs()));
        let scale = next.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        momentum = next
            .iter()
            .zip(&params)
            .map(|(a, b)| a + (t - 1.0) / t_next * (a - b))
            .collect();
        params = next;
        t = t_next;

        if change <= tol * (1.0 + scale) {
            converged = true;
            break;
        }
    }

    let intercept = params[d];
    params.truncate(d);
    (
        LinearFit {
            coef: params,
            intercept,
        },
        converged,
    )
}

impl Estimator for LogisticRegression {
    fn fit(
        &mut self,
        x: &Matrix,
        y: &Matrix,
        _ctx: &FitContext<'_>,
    ) -> Result<FitReport, ModelError> {
        check_training(x, y)?;
        require_single_output("logistic_regression", y)?;
        let labels = y.column(0);
        let classes = ClassIndex::from_labels(&labels);
        let lambda = 1.0 / (self.c * x.rows() as f64);
        let mut report = FitReport::default();

        let targets: Vec<f64> = match classes.len() {
            1 => {
                report.warn("only one class present in training labels; predicting it everywhere");
                Vec::new()
            }
            2 => vec![classes.value(1)],
            _ => classes.values().to_vec(),
        };

        let mut models = Vec::with_capacity(targets.len());
        for target in targets {
            let z: Vec<f64> = labels
                .iter()
                .map(|&l| if l == target { 1.0 } else { 0.0 })
                .collect();
            let (fit, converged) = fit_binary(x, &z, lambda, self.max_iter, self.tol);
            if !converged {
                report.warn(format!(
                    "logistic regression did not converge within max_iter={}",
                    self.max_iter
                ));
            }
            models.push(fit);
        }

        self.models = models;
        self.classes = Some(classes);
        self.n_features = Some(x.cols());
        Ok(report)
    }

    fn predict(&self, x: &Matrix) -> Result<Matrix, ModelError> {
        check_predict(self.n_features, x)?;
        let classes = self.classes.as_ref().ok_or(ModelError::NotFitted)?;
        let out = (0..x.rows())
            .map(|r| {
                let scores = self.decision(x.row(r));
                match classes.len() {
                    1 => classes.value(0),
                    2 => classes.value(usize::from(scores[0] >= 0.0)),
                    _ => classes.argmax(&scores),
                }
            })
            .collect();
        Ok(Matrix::column_vector(out))
    }
}
