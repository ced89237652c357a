//! Training entry point: build, optionally filter to one class, fit, and
//! optionally save.

use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};

use crate::factory::{build_model, FactoryError};
use crate::frame::Matrix;
use crate::method::MethodSpec;
use crate::model::{
    least_common, ClassIndex, Estimator, FitContext, FitReport, IsolationForest, Model, ModelError,
};
use crate::persist::{save_model, ModelArtifact};

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("cannot build estimator: {0}")]
    Factory(#[from] FactoryError),
    #[error("fit failed: {0}")]
    Model(#[from] ModelError),
}

/// Row-aligned training inputs.
#[derive(Debug, Clone, Copy)]
pub struct TrainingSet<'a> {
    pub x: &'a Matrix,
    pub y: &'a Matrix,
    pub crowd: Option<&'a Matrix>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TrainOptions<'a> {
    /// Thread budget handed to the estimator.
    pub threads: usize,
    /// Advisory save location for the fitted artifact.
    pub save_to: Option<&'a Path>,
}

#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub model: Model,
    pub report: FitReport,
    /// Rows actually used for fitting.
    pub train_rows: usize,
}

/// Rows whose first label column holds the least frequent value.
///
/// Returns the minority value and its row indices; `None` for empty labels.
pub fn filter_minority(y: &Matrix) -> Option<(f64, Vec<usize>)> {
    if y.cols() == 0 {
        return None;
    }
    let labels = y.column(0);
    let minority = least_common(&labels)?;
    let rows = labels
        .iter()
        .enumerate()
        .filter(|(_, &l)| l == minority)
        .map(|(i, _)| i)
        .collect();
    Some((minority, rows))
}

/// The isolation forest in `model`, looking through a per-column wrapper.
fn isolation_forest_mut(model: &mut Model) -> Option<&mut IsolationForest> {
    match model {
        Model::IsolationForest(forest) => Some(forest),
        Model::MultiOutput(wrapper) => isolation_forest_mut(wrapper.template_mut()),
        _ => None,
    }
}

/// Train `method` on `set`.
///
/// One-class methods fit on the minority rows only and label everything
/// else with the smallest other class. A failed save is logged and
/// otherwise ignored.
pub fn train(
    method: &MethodSpec,
    is_regression: bool,
    set: TrainingSet<'_>,
    options: TrainOptions<'_>,
) -> Result<TrainedModel, TrainError> {
    let mut model = build_model(method, is_regression, set.y.cols())?;
    info!(
        method = %method,
        estimator = model.name(),
        features = set.x.cols(),
        rows = set.x.rows(),
        "training model"
    );

    let ctx = FitContext {
        crowd: set.crowd,
        threads: options.threads.max(1),
    };

    let one_class = if method.is_one_class() {
        filter_minority(set.y)
    } else {
        None
    };
    let (report, train_rows) = match one_class {
        Some((minority, rows)) => {
            let outlier = ClassIndex::from_labels(&set.y.column(0))
                .values()
                .iter()
                .copied()
                .find(|&v| v != minority)
                .unwrap_or(minority);
            if let Some(forest) = isolation_forest_mut(&mut model) {
                forest.inlier_label = minority;
                forest.outlier_label = outlier;
            }
            let x = set.x.select_rows(&rows);
            let y = set.y.select_rows(&rows);
            (model.fit(&x, &y, &ctx)?, rows.len())
        }
        None => (model.fit(set.x, set.y, &ctx)?, set.x.rows()),
    };

    for warning in &report.warnings {
        warn!(method = %method, "{warning}");
    }

    if let Some(path) = options.save_to {
        let artifact = ModelArtifact {
            method: method.clone(),
            is_regression,
            model,
        };
        match save_model(path, &artifact) {
            Ok(()) => info!(path = %path.display(), "saved model"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to save model"),
        }
        model = artifact.model;
    }

    Ok(TrainedModel {
        model,
        report,
        train_rows,
    })
}
