//! RBF support-vector machines trained by greedy dual coordinate descent.
//!
//! The bias is absorbed into the kernel (`K(a, b) = exp(-γ‖a − b‖²) + 1`),
//! which removes the equality constraint from the dual so each step is a
//! closed-form single-coordinate update. Each step picks the coordinate with
//! the largest optimality gap. `max_iter` counts coordinate updates.

use serde::{Deserialize, Serialize};

use super::linalg::soft_threshold;
use super::{
    check_predict, check_training, require_single_output, ClassIndex, Estimator, FitContext,
    FitReport, ModelError,
};
use crate::frame::Matrix;

/// Kernel value of a row with itself.
const DIAG: f64 = 2.0;

/// RBF kernel width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum Gamma {
    /// `1 / (n_features · var(X))`, computed at fit time.
    Scale,
    Value(f64),
}

impl Gamma {
    fn resolve(&self, x: &Matrix) -> f64 {
        match *self {
            Gamma::Value(g) => g,
            Gamma::Scale => {
                let values = x.as_slice();
                let n = values.len() as f64;
                let mean = values.iter().sum::<f64>() / n;
                let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                if var > 0.0 {
                    1.0 / (x.cols() as f64 * var)
                } else {
                    1.0
                }
            }
        }
    }
}

fn kernel(gamma: f64, a: &[f64], b: &[f64]) -> f64 {
    let dist: f64 = a.iter().zip(b).map(|(p, q)| (p - q).powi(2)).sum();
    (-gamma * dist).exp() + 1.0
}

/// Kernel expansion `f(x) = Σ coef_i · K(support_i, x)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Expansion {
    support: Vec<Vec<f64>>,
    coef: Vec<f64>,
}

impl Expansion {
    fn decision(&self, gamma: f64, row: &[f64]) -> f64 {
        self.support
            .iter()
            .zip(&self.coef)
            .map(|(sv, c)| c * kernel(gamma, sv, row))
            .sum()
    }

    fn n_support(&self) -> usize {
        self.coef.len()
    }
}

/// Greedy coordinate descent over the signed dual coefficients.
///
/// `update(i, current, f_i)` returns the optimal new value of coordinate
/// `i` given the current decision value `f_i` at training row `i`.
/// Returns the expansion and whether the gap fell below `tol`.
fn coordinate_descent(
    x: &Matrix,
    gamma: f64,
    max_iter: usize,
    tol: f64,
    update: impl Fn(usize, f64, f64) -> f64,
) -> (Expansion, bool) {
    let n = x.rows();
    let mut coef = vec![0.0; n];
    let mut f = vec![0.0; n];
    let mut converged = false;

    for _ in 0..max_iter {
        let mut best: Option<(usize, f64)> = None;
        let mut best_gap = tol;
        for i in 0..n {
            let next = update(i, coef[i], f[i]);
            let gap = (next - coef[i]).abs() * DIAG;
            if gap > best_gap {
                best_gap = gap;
                best = Some((i, next));
            }
        }
        let Some((i, next)) = best else {
            converged = true;
            break;
        };

        let delta = next - coef[i];
        coef[i] = next;
        let xi = x.row(i);
        for (j, fj) in f.iter_mut().enumerate() {
            *fj += delta * kernel(gamma, xi, x.row(j));
        }
    }

    let mut expansion = Expansion::default();
    for (i, c) in coef.into_iter().enumerate() {
        if c != 0.0 {
            expansion.support.push(x.row(i).to_vec());
            expansion.coef.push(c);
        }
    }
    (expansion, converged)
}

// ─── Classifier ──────────────────────────────────────────────────────

/// C-SVC with an RBF kernel; more than two classes are one-vs-rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportVectorClassifier {
    pub c: f64,
    pub gamma: Gamma,
    pub max_iter: usize,
    pub tol: f64,
    fitted_gamma: f64,
    classes: Option<ClassIndex>,
    machines: Vec<Expansion>,
    n_features: Option<usize>,
}

impl SupportVectorClassifier {
    pub fn new(c: f64, gamma: Gamma, max_iter: usize) -> Self {
        Self {
            c,
            gamma,
            max_iter,
            tol: 1e-3,
            fitted_gamma: 0.0,
            classes: None,
            machines: Vec::new(),
            n_features: None,
        }
    }

    pub fn n_support(&self) -> usize {
        self.machines.iter().map(Expansion::n_support).sum()
    }
}

impl Estimator for SupportVectorClassifier {
    fn fit(
        &mut self,
        x: &Matrix,
        y: &Matrix,
        _ctx: &FitContext<'_>,
    ) -> Result<FitReport, ModelError> {
        check_training(x, y)?;
        require_single_output("svc", y)?;
        let labels = y.column(0);
        let classes = ClassIndex::from_labels(&labels);
        let gamma = self.gamma.resolve(x);
        let c = self.c;
        let mut report = FitReport::default();

        let targets: Vec<f64> = match classes.len() {
            1 => {
                report.warn("only one class present in training labels; predicting it everywhere");
                Vec::new()
            }
            2 => vec![classes.value(1)],
            _ => classes.values().to_vec(),
        };

        let mut machines = Vec::with_capacity(targets.len());
        for target in targets {
            let signs: Vec<f64> = labels
                .iter()
                .map(|&l| if l == target { 1.0 } else { -1.0 })
                .collect();
            let (machine, converged) =
                coordinate_descent(x, gamma, self.max_iter, self.tol, |i, coef, f| {
                    let t = signs[i];
                    let alpha = t * coef;
                    t * (alpha + (1.0 - t * f) / DIAG).clamp(0.0, c)
                });
            if !converged {
                report.warn(format!(
                    "svc did not converge within max_iter={}",
                    self.max_iter
                ));
            }
            machines.push(machine);
        }

        self.fitted_gamma = gamma;
        self.machines = machines;
        self.classes = Some(classes);
        self.n_features = Some(x.cols());
        Ok(report)
    }

    fn predict(&self, x: &Matrix) -> Result<Matrix, ModelError> {
        check_predict(self.n_features, x)?;
        let classes = self.classes.as_ref().ok_or(ModelError::NotFitted)?;
        let out = (0..x.rows())
            .map(|r| {
                let scores: Vec<f64> = self
                    .machines
                    .iter()
                    .map(|m| m.decision(self.fitted_gamma, x.row(r)))
                    .collect();
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

// ─── Regressor ───────────────────────────────────────────────────────

/// ε-SVR with an RBF kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportVectorRegressor {
    pub c: f64,
    pub gamma: Gamma,
    pub epsilon: f64,
    pub max_iter: usize,
    pub tol: f64,
    fitted_gamma: f64,
    machine: Option<Expansion>,
    n_features: Option<usize>,
}

impl SupportVectorRegressor {
    pub fn new(c: f64, gamma: Gamma, max_iter: usize) -> Self {
        Self {
            c,
            gamma,
            epsilon: 0.1,
            max_iter,
            tol: 1e-3,
            fitted_gamma: 0.0,
            machine: None,
            n_features: None,
        }
    }

    pub fn n_support(&self) -> usize {
        self.machine.as_ref().map_or(0, Expansion::n_support)
    }
}

impl Estimator for SupportVectorRegressor {
    fn fit(
        &mut self,
        x: &Matrix,
        y: &Matrix,
        _ctx: &FitContext<'_>,
    ) -> Result<FitReport, ModelError> {
        check_training(x, y)?;
        require_single_output("svr", y)?;
        let targets = y.column(0);
        let gamma = self.gamma.resolve(x);
        let (c, epsilon) = (self.c, self.epsilon);
        let mut report = FitReport::default();

        let (machine, converged) =
            coordinate_descent(x, gamma, self.max_iter, self.tol, |i, coef, f| {
                let residual = targets[i] - (f - DIAG * coef);
                (soft_threshold(residual, epsilon) / DIAG).clamp(-c, c)
            });
        if !converged {
            report.warn(format!(
                "svr did not converge within max_iter={}",
                self.max_iter
            ));
        }

        self.fitted_gamma = gamma;
        self.machine = Some(machine);
        self.n_features = Some(x.cols());
        Ok(report)
    }

    fn predict(&self, x: &Matrix) -> Result<Matrix, ModelError> {
        check_predict(self.n_features, x)?;
        let machine = self.machine.as_ref().ok_or(ModelError::NotFitted)?;
        Ok(Matrix::column_vector(
            (0..x.rows())
                .map(|r| machine.decision(self.fitted_gamma, x.row(r)))
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_clusters() -> (Matrix, Matrix) {
        let rows: Vec<Vec<f64>> = (0..20)
            .map(|i| {
                let centre = if i < 10 { -2.0 } else { 2.0 };
                vec![centre + (i % 5) as f64 * 0.1, centre - (i % 3) as f64 * 0.1]
            })
            .collect();
        let y = (0..20).map(|i| if i < 10 { 0.0 } else { 1.0 }).collect();
        (Matrix::from_rows(&rows).unwrap(), Matrix::column_vector(y))
    }

    #[test]
    fn gamma_scale_uses_feature_variance() {
        let x = Matrix::column_vector(vec![-1.0, 1.0, -1.0, 1.0]);
        assert!((Gamma::Scale.resolve(&x) - 1.0).abs() < 1e-12);
        let x = Matrix::from_rows(&[vec![0.0, 2.0], vec![2.0, 0.0]]).unwrap();
        assert!((Gamma::Scale.resolve(&x) - 0.5).abs() < 1e-12);
        assert_eq!(Gamma::Value(0.01).resolve(&x), 0.01);
    }

    #[test]
    fn svc_separates_clusters() {
        let (x, y) = two_clusters();
        let mut m = SupportVectorClassifier::new(1.0, Gamma::Scale, 5000);
        let report = m.fit(&x, &y, &FitContext::sequential()).unwrap();
        assert!(report.is_clean());
        assert!(m.n_support() > 0);
        let pred = m.predict(&x).unwrap();
        assert_eq!(pred.as_slice(), y.as_slice());
    }

    #[test]
    fn svc_warns_when_update_cap_hit() {
        let (x, y) = two_clusters();
        let mut m = SupportVectorClassifier::new(1.0, Gamma::Scale, 1);
        let report = m.fit(&x, &y, &FitContext::sequential()).unwrap();
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn svr_follows_monotone_trend() {
        let x = Matrix::column_vector((0..21).map(|i| i as f64 * 0.5).collect());
        let y = Matrix::column_vector((0..21).map(|i| i as f64 * 0.5).collect());
        let mut m = SupportVectorRegressor::new(100.0, Gamma::Value(0.5), 20_000);
        m.fit(&x, &y, &FitContext::sequential()).unwrap();
        let pred = m.predict(&Matrix::column_vector(vec![2.0, 5.0, 8.0])).unwrap();
        assert!(pred.get(0, 0) < pred.get(1, 0));
        assert!(pred.get(1, 0) < pred.get(2, 0));
        assert!((pred.get(1, 0) - 5.0).abs() < 1.5);
    }

    #[test]
    fn svr_inside_epsilon_tube_has_no_support() {
        let x = Matrix::column_vector(vec![0.0, 1.0, 2.0]);
        let y = Matrix::column_vector(vec![0.05, -0.05, 0.0]);
        let mut m = SupportVectorRegressor::new(100.0, Gamma::Value(0.01), 1000);
        m.fit(&x, &y, &FitContext::sequential()).unwrap();
        assert_eq!(m.n_support(), 0);
    }
}
