//! Estimators and the uniform fit/predict contract.
//!
//! Every estimator implements [`Estimator`]. The closed [`Model`] enum is
//! what the factory hands out and what gets persisted: one variant per
//! concrete estimator, dispatching the trait by `match`.

pub mod crowd;
pub mod dummy;
pub mod forest;
pub mod isolation;
pub mod knn;
pub mod linear;
pub mod logistic;
pub mod mlp;
pub mod multi_output;
pub mod svm;
pub mod tree;

mod linalg;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::Matrix;

pub use crowd::HybridCrowdClassifier;
pub use dummy::{DummyClassifier, DummyStrategy};
pub use forest::{Forest, ForestKind};
pub use isolation::IsolationForest;
pub use knn::KNeighbors;
pub use linear::{ElasticNet, HuberRegressor, LinearRegression};
pub use logistic::LogisticRegression;
pub use mlp::Mlp;
pub use multi_output::MultiOutput;
pub use svm::{Gamma, SupportVectorClassifier, SupportVectorRegressor};
pub use tree::{DecisionTree, MaxFeatures, Splitter, TreeParams};

// ─── Contract ────────────────────────────────────────────────────────

/// Regression or classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Regression,
    Classification,
}

impl Task {
    pub fn from_is_regression(is_regression: bool) -> Self {
        if is_regression {
            Task::Regression
        } else {
            Task::Classification
        }
    }
}

/// Per-call fitting context.
#[derive(Debug, Clone, Copy)]
pub struct FitContext<'a> {
    /// Row-aligned crowd metadata, for crowd-aware estimators.
    pub crowd: Option<&'a Matrix>,
    /// Thread budget for this fit (1 = run inline).
    pub threads: usize,
}

impl<'a> FitContext<'a> {
    pub fn sequential() -> Self {
        Self {
            crowd: None,
            threads: 1,
        }
    }

    pub fn with_threads(threads: usize) -> Self {
        Self {
            crowd: None,
            threads,
        }
    }

    pub fn crowd(mut self, crowd: Option<&'a Matrix>) -> Self {
        self.crowd = crowd;
        self
    }
}

/// Non-fatal diagnostics collected while fitting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub warnings: Vec<String>,
}

impl FitReport {
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn merge(&mut self, other: FitReport) {
        self.warnings.extend(other.warnings);
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Errors raised by estimators.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("training set is empty")]
    EmptyTrainingSet,
    #[error("X has {x_rows} rows but y has {y_rows}")]
    RowMismatch { x_rows: usize, y_rows: usize },
    #[error("{what} contains a non-finite value at row {row}, column {col}")]
    NonFinite {
        what: &'static str,
        row: usize,
        col: usize,
    },
    #[error("estimator has not been fitted")]
    NotFitted,
    #[error("expected {expected} features, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },
    #[error("{estimator} supports a single output, got {outputs}")]
    MultiOutputUnsupported {
        estimator: &'static str,
        outputs: usize,
    },
    #[error("crowd-aware estimator requires crowd info")]
    MissingCrowdInfo,
    #[error("crowd info has {crowd_rows} rows but X has {x_rows}")]
    CrowdRowMismatch { crowd_rows: usize, x_rows: usize },
    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Uniform training contract shared by every estimator.
pub trait Estimator {
    /// Fit on `x` (rows × features) and `y` (rows × outputs).
    fn fit(&mut self, x: &Matrix, y: &Matrix, ctx: &FitContext<'_>)
        -> Result<FitReport, ModelError>;

    /// Predict one row of outputs per input row.
    fn predict(&self, x: &Matrix) -> Result<Matrix, ModelError>;

    /// Whether `fit` accepts more than one output column.
    fn supports_multi_output(&self) -> bool {
        false
    }
}

// ─── Closed model enum ───────────────────────────────────────────────

/// Every estimator the factory can produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Model {
    Tree(DecisionTree),
    Forest(Forest),
    LinearRegression(LinearRegression),
    ElasticNet(ElasticNet),
    Huber(HuberRegressor),
    Logistic(LogisticRegression),
    Svc(SupportVectorClassifier),
    Svr(SupportVectorRegressor),
    Mlp(Mlp),
    KNeighbors(KNeighbors),
    Dummy(DummyClassifier),
    IsolationForest(IsolationForest),
    HybridCrowd(HybridCrowdClassifier),
    MultiOutput(MultiOutput),
}

macro_rules! dispatch {
    ($model:expr, $inner:ident => $body:expr) => {
        match $model {
            Model::Tree($inner) => $body,
            Model::Forest($inner) => $body,
            Model::LinearRegression($inner) => $body,
            Model::ElasticNet($inner) => $body,
            Model::Huber($inner) => $body,
            Model::Logistic($inner) => $body,
            Model::Svc($inner) => $body,
            Model::Svr($inner) => $body,
            Model::Mlp($inner) => $body,
            Model::KNeighbors($inner) => $body,
            Model::Dummy($inner) => $body,
            Model::IsolationForest($inner) => $body,
            Model::HybridCrowd($inner) => $body,
            Model::MultiOutput($inner) => $body,
        }
    };
}

impl Model {
    /// Short human-readable estimator name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Model::Tree(_) => "decision_tree",
            Model::Forest(f) => match f.kind() {
                ForestKind::RandomForest => "random_forest",
                ForestKind::ExtraTrees => "extra_trees",
            },
            Model::LinearRegression(_) => "linear_regression",
            Model::ElasticNet(_) => "elastic_net",
            Model::Huber(_) => "huber",
            Model::Logistic(_) => "logistic_regression",
            Model::Svc(_) => "svc",
            Model::Svr(_) => "svr",
            Model::Mlp(_) => "mlp",
            Model::KNeighbors(_) => "k_neighbors",
            Model::Dummy(_) => "dummy",
            Model::IsolationForest(_) => "isolation_forest",
            Model::HybridCrowd(_) => "hybrid_crowd",
            Model::MultiOutput(_) => "multi_output",
        }
    }
}

impl Estimator for Model {
    fn fit(
        &mut self,
        x: &Matrix,
        y: &Matrix,
        ctx: &FitContext<'_>,
    ) -> Result<FitReport, ModelError> {
        dispatch!(self, m => m.fit(x, y, ctx))
    }

    fn predict(&self, x: &Matrix) -> Result<Matrix, ModelError> {
        dispatch!(self, m => m.predict(x))
    }

    fn supports_multi_output(&self) -> bool {
        dispatch!(self, m => m.supports_multi_output())
    }
}

// ─── Shared helpers ──────────────────────────────────────────────────

/// Validate a training pair: non-empty, same row count, finite values.
pub(crate) fn check_training(x: &Matrix, y: &Matrix) -> Result<(), ModelError> {
    if x.rows() == 0 {
        return Err(ModelError::EmptyTrainingSet);
    }
    if x.rows() != y.rows() {
        return Err(ModelError::RowMismatch {
            x_rows: x.rows(),
            y_rows: y.rows(),
        });
    }
    if let Some((row, col)) = x.first_non_finite() {
        return Err(ModelError::NonFinite { what: "X", row, col });
    }
    if let Some((row, col)) = y.first_non_finite() {
        return Err(ModelError::NonFinite { what: "y", row, col });
    }
    Ok(())
}

/// Reject multi-column targets for single-output estimators.
pub(crate) fn require_single_output(
    estimator: &'static str,
    y: &Matrix,
) -> Result<(), ModelError> {
    if y.cols() != 1 {
        return Err(ModelError::MultiOutputUnsupported {
            estimator,
            outputs: y.cols(),
        });
    }
    Ok(())
}

/// Validate prediction input against the fitted feature count.
pub(crate) fn check_predict(expected: Option<usize>, x: &Matrix) -> Result<(), ModelError> {
    let expected = expected.ok_or(ModelError::NotFitted)?;
    if x.cols() != expected {
        return Err(ModelError::FeatureMismatch {
            expected,
            actual: x.cols(),
        });
    }
    if let Some((row, col)) = x.first_non_finite() {
        return Err(ModelError::NonFinite { what: "X", row, col });
    }
    Ok(())
}

/// Sorted distinct label values of one output column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassIndex {
    values: Vec<f64>,
}

impl ClassIndex {
    pub fn from_labels(labels: &[f64]) -> Self {
        let mut values = labels.to_vec();
        values.sort_by(|a, b| a.total_cmp(b));
        values.dedup();
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Position of `label`. Labels must come from the fitted set.
    pub fn index_of(&self, label: f64) -> usize {
        self.values
            .binary_search_by(|v| v.total_cmp(&label))
            .unwrap_or_else(|i| i.min(self.values.len().saturating_sub(1)))
    }

    pub fn value(&self, index: usize) -> f64 {
        self.values[index]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Label with the highest score; ties go to the smaller label.
    pub fn argmax(&self, scores: &[f64]) -> f64 {
        let mut best = 0;
        for (i, s) in scores.iter().enumerate() {
            if *s > scores[best] {
                best = i;
            }
        }
        self.values[best]
    }
}

/// Least frequent value of `labels`; ties go to the smaller value.
pub fn least_common(labels: &[f64]) -> Option<f64> {
    let classes = ClassIndex::from_labels(labels);
    if classes.is_empty() {
        return None;
    }
    let mut counts = vec![0usize; classes.len()];
    for &l in labels {
        counts[classes.index_of(l)] += 1;
    }
    let mut best = 0;
    for (i, &c) in counts.iter().enumerate() {
        if c < counts[best] {
            best = i;
        }
    }
    Some(classes.value(best))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_index_sorts_and_dedups() {
        let idx = ClassIndex::from_labels(&[1.0, 0.0, 1.0, 2.0]);
        assert_eq!(idx.values(), &[0.0, 1.0, 2.0]);
        assert_eq!(idx.index_of(2.0), 2);
        assert_eq!(idx.argmax(&[0.2, 0.5, 0.3]), 1.0);
    }

    #[test]
    fn argmax_ties_take_smaller_label() {
        let idx = ClassIndex::from_labels(&[0.0, 1.0]);
        assert_eq!(idx.argmax(&[0.5, 0.5]), 0.0);
    }

    #[test]
    fn least_common_picks_minority() {
        assert_eq!(least_common(&[0.0, 0.0, 0.0, 1.0]), Some(1.0));
        assert_eq!(least_common(&[1.0, 0.0]), Some(0.0));
        assert_eq!(least_common(&[]), None);
    }

    #[test]
    fn check_training_reports_problems() {
        let x = Matrix::column_vector(vec![1.0, 2.0]);
        let y = Matrix::column_vector(vec![1.0]);
        assert!(matches!(
            check_training(&x, &y),
            Err(ModelError::RowMismatch { .. })
        ));
        let y = Matrix::column_vector(vec![1.0, f64::NAN]);
        assert!(matches!(
            check_training(&x, &y),
            Err(ModelError::NonFinite { what: "y", row: 1, col: 0 })
        ));
    }

    #[test]
    fn model_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Model>();
        assert_send_sync::<FitReport>();
    }
}
