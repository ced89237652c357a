//! Crowd-aware classifier.
//!
//! Positive rows are only trusted when the crowd reports behind them are
//! confident enough: before fitting the base estimator, positive rows whose
//! first crowd column is below `min_confidence` are dropped. Negative rows
//! are always kept. Prediction delegates to the base estimator.

use serde::{Deserialize, Serialize};

use super::{
    check_training, Estimator, FitContext, FitReport, Forest, ForestKind, MaxFeatures, Model,
    ModelError, Task, TreeParams,
};
use crate::frame::Matrix;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridCrowdClassifier {
    pub min_confidence: f64,
    base: Box<Model>,
}

impl Default for HybridCrowdClassifier {
    /// Extra trees (100 trees, sqrt features) as the base estimator.
    fn default() -> Self {
        let params = TreeParams {
            max_features: MaxFeatures::Sqrt,
            min_samples_split: 2,
            ..TreeParams::default()
        };
        Self::new(Model::Forest(Forest::new(
            ForestKind::ExtraTrees,
            Task::Classification,
            100,
            params,
        )))
    }
}

impl HybridCrowdClassifier {
    pub fn new(base: Model) -> Self {
        Self {
            min_confidence: 0.5,
            base: Box::new(base),
        }
    }

    pub fn base(&self) -> &Model {
        &self.base
    }

    /// Training rows kept after crowd filtering.
    fn trusted_rows(&self, y: &Matrix, crowd: &Matrix) -> Vec<usize> {
        (0..y.rows())
            .filter(|&r| y.get(r, 0) <= 0.0 || crowd.get(r, 0) >= self.min_confidence)
            .collect()
    }
}

impl Estimator for HybridCrowdClassifier {
    fn fit(
        &mut self,
        x: &Matrix,
        y: &Matrix,
        ctx: &FitContext<'_>,
    ) -> Result<FitReport, ModelError> {
        check_training(x, y)?;
        let crowd = ctx.crowd.ok_or(ModelError::MissingCrowdInfo)?;
        if crowd.rows() != x.rows() || crowd.cols() == 0 {
            return Err(ModelError::CrowdRowMismatch {
                crowd_rows: crowd.rows(),
                x_rows: x.rows(),
            });
        }

        let keep = self.trusted_rows(y, crowd);
        let mut report = FitReport::default();
        let dropped = x.rows() - keep.len();
        if dropped > 0 {
            tracing::debug!(dropped, "dropped low-confidence positive rows");
        }
        if keep.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        let inner = FitContext {
            crowd: None,
            threads: ctx.threads,
        };
        report.merge(self.base.fit(&x.select_rows(&keep), &y.select_rows(&keep), &inner)?);
        Ok(report)
    }

    fn predict(&self, x: &Matrix) -> Result<Matrix, ModelError> {
        self.base.predict(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DummyClassifier, DummyStrategy};

    #[test]
    fn requires_crowd_info() {
        let x = Matrix::column_vector(vec![0.0, 1.0]);
        let y = Matrix::column_vector(vec![0.0, 1.0]);
        let mut m = HybridCrowdClassifier::default();
        assert!(matches!(
            m.fit(&x, &y, &FitContext::sequential()),
            Err(ModelError::MissingCrowdInfo)
        ));
    }

    #[test]
    fn low_confidence_positives_are_dropped() {
        let y = Matrix::column_vector(vec![0.0, 1.0, 1.0, 0.0]);
        let crowd = Matrix::column_vector(vec![0.0, 0.9, 0.1, 0.0]);
        let m = HybridCrowdClassifier::new(Model::Dummy(DummyClassifier::new(
            DummyStrategy::Constant(1.0),
        )));
        assert_eq!(m.trusted_rows(&y, &crowd), vec![0, 1, 3]);
    }

    #[test]
    fn fits_base_with_crowd_frame() {
        let x = Matrix::column_vector((0..40).map(|i| i as f64).collect());
        let y = Matrix::column_vector((0..40).map(|i| if i >= 20 { 1.0 } else { 0.0 }).collect());
        let crowd = Matrix::column_vector(vec![1.0; 40]);
        let mut m = HybridCrowdClassifier::default();
        m.fit(&x, &y, &FitContext::sequential().crowd(Some(&crowd)))
            .unwrap();
        let pred = m.predict(&Matrix::column_vector(vec![2.0, 38.0])).unwrap();
        assert_eq!(pred.as_slice(), &[0.0, 1.0]);
    }

    #[test]
    fn crowd_row_count_must_match() {
        let x = Matrix::column_vector(vec![0.0, 1.0]);
        let y = Matrix::column_vector(vec![0.0, 1.0]);
        let crowd = Matrix::column_vector(vec![1.0]);
        let mut m = HybridCrowdClassifier::default();
        assert!(matches!(
            m.fit(&x, &y, &FitContext::sequential().crowd(Some(&crowd))),
            Err(ModelError::CrowdRowMismatch { .. })
        ));
    }
}
