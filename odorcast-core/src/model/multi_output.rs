//! Per-column adapter for single-output estimators.

use serde::{Deserialize, Serialize};

use super::{check_training, Estimator, FitContext, FitReport, Model, ModelError};
use crate::frame::Matrix;
use crate::parallel::map_indexed;

/// Fits one clone of `template` per output column and concatenates the
/// per-column predictions in column order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiOutput {
    template: Box<Model>,
    fitted: Vec<Model>,
}

impl MultiOutput {
    pub fn new(template: Model) -> Self {
        Self {
            template: Box::new(template),
            fitted: Vec::new(),
        }
    }

    pub fn template(&self) -> &Model {
        &self.template
    }

    /// Settings changed here apply to every column fitted afterwards.
    pub fn template_mut(&mut self) -> &mut Model {
        &mut self.template
    }

    pub fn n_outputs(&self) -> usize {
        self.fitted.len()
    }
}

impl Estimator for MultiOutput {
    fn fit(
        &mut self,
        x: &Matrix,
        y: &Matrix,
        ctx: &FitContext<'_>,
    ) -> Result<FitReport, ModelError> {
        check_training(x, y)?;
        // Column fits share the thread budget; each inner fit runs inline.
        let inner = FitContext {
            crowd: ctx.crowd,
            threads: 1,
        };
        let template = &self.template;
        let results = map_indexed(y.cols(), ctx.threads, |c| {
            let mut model = (**template).clone();
            let column = Matrix::column_vector(y.column(c));
            model.fit(x, &column, &inner).map(|report| (model, report))
        })?;

        let mut report = FitReport::default();
        let mut fitted = Vec::with_capacity(results.len());
        for (c, result) in results.into_iter().enumerate() {
            let (model, column_report) = result?;
            for warning in column_report.warnings {
                report.warn(format!("output {c}: {warning}"));
            }
            fitted.push(model);
        }
        self.fitted = fitted;
        Ok(report)
    }

    fn predict(&self, x: &Matrix) -> Result<Matrix, ModelError> {
        if self.fitted.is_empty() {
            return Err(ModelError::NotFitted);
        }
        let columns = self
            .fitted
            .iter()
            .map(|m| m.predict(x))
            .collect::<Result<Vec<_>, _>>()?;
        Matrix::hstack(&columns).ok_or(ModelError::NotFitted)
    }

    fn supports_multi_output(&self) -> bool {
        true
    }
}
