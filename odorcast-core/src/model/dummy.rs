//! Baseline classifiers that ignore the features.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{
    check_predict, check_training, require_single_output, ClassIndex, Estimator, FitContext,
    FitReport, ModelError,
};
use crate::frame::Matrix;
use crate::seed::SeedHierarchy;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "value", rename_all = "snake_case")]
pub enum DummyStrategy {
    /// Draw labels from the training class distribution.
    Stratified,
    /// Draw labels uniformly from the training classes.
    Uniform,
    Constant(f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DummyClassifier {
    pub strategy: DummyStrategy,
    seed: Option<u64>,
    classes: Option<ClassIndex>,
    /// Class frequencies aligned with `classes`.
    priors: Vec<f64>,
    n_features: Option<usize>,
}

impl DummyClassifier {
    pub fn new(strategy: DummyStrategy) -> Self {
        Self {
            strategy,
            seed: None,
            classes: None,
            priors: Vec::new(),
            n_features: None,
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
}

impl Estimator for DummyClassifier {
    fn fit(
        &mut self,
        x: &Matrix,
        y: &Matrix,
        _ctx: &FitContext<'_>,
    ) -> Result<FitReport, ModelError> {
        check_training(x, y)?;
        require_single_output("dummy", y)?;
        let labels = y.column(0);
        let classes = ClassIndex::from_labels(&labels);
        let mut counts = vec![0.0; classes.len()];
        for &l in &labels {
            counts[classes.index_of(l)] += 1.0;
        }
        let mut report = FitReport::default();
        if let DummyStrategy::Constant(c) = self.strategy {
            if !classes.values().contains(&c) {
                report.warn(format!("constant {c} does not occur in the training labels"));
            }
        }

        // Unseeded baselines still predict consistently once fitted.
        self.seed = Some(self.seed.unwrap_or_else(rand::random));
        self.priors = counts.iter().map(|c| c / labels.len() as f64).collect();
        self.classes = Some(classes);
        self.n_features = Some(x.cols());
        Ok(report)
    }

    fn predict(&self, x: &Matrix) -> Result<Matrix, ModelError> {
        check_predict(self.n_features, x)?;
        let classes = self.classes.as_ref().ok_or(ModelError::NotFitted)?;
        let mut rng = SeedHierarchy::from_option(self.seed).rng_for("dummy", 0);

        let out = (0..x.rows())
            .map(|_| match self.strategy {
                DummyStrategy::Constant(c) => c,
                DummyStrategy::Uniform => classes.value(rng.gen_range(0..classes.len())),
                DummyStrategy::Stratified => {
                    let draw: f64 = rng.gen();
                    let mut acc = 0.0;
                    let mut pick = classes.len() - 1;
                    for (i, p) in self.priors.iter().enumerate() {
                        acc += p;
                        if draw < acc {
                            pick = i;
                            break;
                        }
                    }
                    classes.value(pick)
                }
            })
            .collect();
        Ok(Matrix::column_vector(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> (Matrix, Matrix) {
        let x = Matrix::zeros(100, 1);
        let y = Matrix::column_vector((0..100).map(|i| if i % 10 == 0 { 1.0 } else { 0.0 }).collect());
        (x, y)
    }

    #[test]
    fn constant_predicts_constant() {
        let (x, y) = data();
        let mut m = DummyClassifier::new(DummyStrategy::Constant(1.0));
        let report = m.fit(&x, &y, &FitContext::sequential()).unwrap();
        assert!(report.is_clean());
        assert!(m.predict(&x).unwrap().as_slice().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn stratified_follows_class_frequencies() {
        let (x, y) = data();
        let mut m = DummyClassifier::new(DummyStrategy::Stratified).with_seed(Some(0));
        m.fit(&x, &y, &FitContext::sequential()).unwrap();
        let big = Matrix::zeros(5000, 1);
        let positives = m.predict(&big).unwrap().as_slice().iter().filter(|&&v| v == 1.0).count();
        assert!((300..700).contains(&positives), "{positives} positives");
    }

    #[test]
    fn uniform_draws_both_classes_and_is_repeatable() {
        let (x, y) = data();
        let mut m = DummyClassifier::new(DummyStrategy::Uniform);
        m.fit(&x, &y, &FitContext::sequential()).unwrap();
        let first = m.predict(&x).unwrap();
        assert_eq!(first, m.predict(&x).unwrap());
        let ones = first.as_slice().iter().filter(|&&v| v == 1.0).count();
        assert!(ones > 20 && ones < 80);
    }
}
