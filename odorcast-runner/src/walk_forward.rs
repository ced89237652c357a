//! Walk-forward validation with a causal gap between train and test.
//!
//! Rows are split into fixed-size training windows followed, after
//! `skip_folds` rows, by one test window of `rows / num_folds` rows. Each
//! fold trains a fresh estimator from the method tag and scores it on its
//! test window:
//!
//! ```text
//!   |<--- train_size --->|<- skip ->|<-- width -->|
//!   train_start   train_end    test_start    test_end
//! ```
//!
//! Fold `k` shifts the whole layout forward by `k * width` rows. Folds whose
//! test window would run past the data are dropped.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use odorcast_core::parallel::map_indexed;
use odorcast_core::{
    build_model, train, CrowdFrame, Estimator, FactoryError, FeatureFrame, FrameError, LabelFrame,
    MethodSpec, ModelError, Parallelism, TrainError, TrainOptions, TrainingSet,
};

use crate::balance::ClassBalance;
use crate::metric_log::{MetricLog, MetricRecord};
use crate::metrics::{binarize, ConfusionCounts, RegressionSummary};

/// Default regression event threshold (smell rating sum).
pub const DEFAULT_EVENT_THRESHOLD: f64 = 40.0;

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardConfig {
    /// Upper bound on folds; also sets the test width.
    pub num_folds: usize,
    /// Rows left out between the end of training and the start of testing.
    pub skip_folds: usize,
    /// Rows in every training window.
    pub train_size: usize,
    /// Regression outputs at or above this value count as events.
    pub event_threshold: f64,
    pub parallelism: Parallelism,
    /// When set, each fold's fitted estimator is saved here.
    pub model_dir: Option<PathBuf>,
}

impl WalkForwardConfig {
    /// Defaults for the hourly odor data: 48-row gap, 8000 training rows.
    pub fn new(num_folds: usize) -> Self {
        Self {
            num_folds,
            skip_folds: 48,
            train_size: 8000,
            event_threshold: DEFAULT_EVENT_THRESHOLD,
            parallelism: Parallelism::default(),
            model_dir: None,
        }
    }
}

// ─── Fold layout ─────────────────────────────────────────────────────

/// Row ranges of one fold; all ends are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldSpec {
    pub fold_index: usize,
    pub train_start: usize,
    pub train_end: usize,
    pub test_start: usize,
    pub test_end: usize,
}

impl FoldSpec {
    pub fn train_range(&self) -> std::ops::Range<usize> {
        self.train_start..self.train_end
    }

    pub fn test_range(&self) -> std::ops::Range<usize> {
        self.test_start..self.test_end
    }

    pub fn test_width(&self) -> usize {
        self.test_end - self.test_start
    }
}

/// Errors from walk-forward validation.
#[derive(Debug, Error)]
pub enum WalkForwardError {
    #[error("num_folds must be at least 1")]
    ZeroFolds,
    #[error("train_size must be at least 1")]
    ZeroTrainSize,
    #[error("train_size {train_size} + skip_folds {skip_folds} leaves no rows to test out of {rows}")]
    NoRoomToTest {
        train_size: usize,
        skip_folds: usize,
        rows: usize,
    },
    #[error("{rows} rows split into {num_folds} folds gives an empty test window")]
    EmptyTestWindow { rows: usize, num_folds: usize },
    #[error(transparent)]
    Method(#[from] FactoryError),
    #[error("method {method} needs a crowd frame")]
    MissingCrowdFrame { method: String },
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("training failed on fold {fold}: {source}")]
    Train {
        fold: usize,
        #[source]
        source: TrainError,
    },
    #[error("prediction failed on fold {fold}: {source}")]
    Predict {
        fold: usize,
        #[source]
        source: ModelError,
    },
    #[error("cannot build fold thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("cannot append to metric log: {0}")]
    Log(#[source] std::io::Error),
}

impl WalkForwardError {
    /// Bad method tags and fold sizing, as opposed to data or runtime
    /// failures.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ZeroFolds
                | Self::ZeroTrainSize
                | Self::NoRoomToTest { .. }
                | Self::EmptyTestWindow { .. }
                | Self::Method(_)
        )
    }
}

/// Lay out the folds for `rows` rows.
///
/// Returns at most `num_folds` folds; the list may be empty when even the
/// first test window runs past the data.
pub fn create_folds(
    rows: usize,
    num_folds: usize,
    skip_folds: usize,
    train_size: usize,
) -> Result<Vec<FoldSpec>, WalkForwardError> {
    if num_folds == 0 {
        return Err(WalkForwardError::ZeroFolds);
    }
    if train_size == 0 {
        return Err(WalkForwardError::ZeroTrainSize);
    }
    if train_size + skip_folds >= rows {
        return Err(WalkForwardError::NoRoomToTest {
            train_size,
            skip_folds,
            rows,
        });
    }
    let width = rows / num_folds;
    if width == 0 {
        return Err(WalkForwardError::EmptyTestWindow { rows, num_folds });
    }

    let mut folds = Vec::with_capacity(num_folds);
    for k in 0..num_folds {
        let test_start = train_size + skip_folds + k * width;
        let test_end = test_start + width;
        if test_end > rows {
            break;
        }
        let train_end = test_start - skip_folds;
        folds.push(FoldSpec {
            fold_index: k,
            train_start: train_end - train_size,
            train_end,
            test_start,
            test_end,
        });
    }
    Ok(folds)
}

// ─── Evaluation ──────────────────────────────────────────────────────

/// Row-aligned frames for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationData<'a> {
    pub x: &'a FeatureFrame,
    pub y: &'a LabelFrame,
    pub crowd: Option<&'a CrowdFrame>,
}

/// Run walk-forward validation of `method` and return one record per fold
/// in fold order.
///
/// The tag is parsed and the estimator built once before any fold runs, so
/// an unknown or invalid method fails without producing records. When `log`
/// is given, records are appended in fold order; if a later fold fails, the
/// records before it are already in the log.
pub fn evaluate(
    data: EvaluationData<'_>,
    method: &str,
    is_regression: bool,
    config: &WalkForwardConfig,
    log: Option<&MetricLog>,
) -> Result<Vec<MetricRecord>, WalkForwardError> {
    let spec: MethodSpec = method.parse().map_err(FactoryError::from)?;
    build_model(&spec, is_regression, data.y.n_columns())?;

    data.x.ensure_aligned("features", data.y, "labels")?;
    let crowd = if spec.is_crowd_aware() {
        let crowd = data.crowd.ok_or_else(|| WalkForwardError::MissingCrowdFrame {
            method: spec.to_string(),
        })?;
        data.x.ensure_aligned("features", crowd, "crowd")?;
        Some(crowd)
    } else {
        None
    };

    let folds = create_folds(
        data.x.len(),
        config.num_folds,
        config.skip_folds,
        config.train_size,
    )?;
    if !is_regression && data.y.n_columns() > 0 {
        let balance = ClassBalance::of(data.y.column_at(0));
        info!(
            positives = balance.positives,
            negatives = balance.negatives,
            positive_ratio = balance.positive_ratio,
            "label balance"
        );
    }
    if folds.is_empty() {
        warn!(
            rows = data.x.len(),
            num_folds = config.num_folds,
            "no complete fold fits the data"
        );
        return Ok(Vec::new());
    }
    info!(method = %spec, folds = folds.len(), "starting walk-forward evaluation");

    let fold_data = EvaluationData { crowd, ..data };
    let outcomes = map_indexed(folds.len(), config.parallelism.fold_threads(), |i| {
        run_fold(fold_data, &spec, is_regression, config, &folds[i])
    })?;

    let mut records = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        let record = outcome?;
        if let Some(log) = log {
            log.append(&record).map_err(WalkForwardError::Log)?;
        }
        records.push(record);
    }
    Ok(records)
}

fn run_fold(
    data: EvaluationData<'_>,
    spec: &MethodSpec,
    is_regression: bool,
    config: &WalkForwardConfig,
    fold: &FoldSpec,
) -> Result<MetricRecord, WalkForwardError> {
    let k = fold.fold_index;
    let x_train = data.x.slice(fold.train_range())?.to_matrix();
    let y_train = data.y.slice(fold.train_range())?.to_matrix();
    let c_train = data
        .crowd
        .map(|c| c.slice(fold.train_range()).map(|c| c.to_matrix()))
        .transpose()?;
    let x_test = data.x.slice(fold.test_range())?.to_matrix();
    let y_test = data.y.slice(fold.test_range())?.to_matrix();

    let save_to = config
        .model_dir
        .as_ref()
        .map(|dir| dir.join(format!("{spec}-fold{k}.json")));
    let trained = train(
        spec,
        is_regression,
        TrainingSet {
            x: &x_train,
            y: &y_train,
            crowd: c_train.as_ref(),
        },
        TrainOptions {
            threads: config.parallelism.fit_threads(),
            save_to: save_to.as_deref(),
        },
    )
    .map_err(|source| WalkForwardError::Train { fold: k, source })?;

    let predicted = trained
        .model
        .predict(&x_test)
        .map_err(|source| WalkForwardError::Predict { fold: k, source })?;

    let mut warnings = trained.report.warnings;
    let (counts, regression) = if is_regression {
        let summary = loggable_summary(
            RegressionSummary::compute(&y_test, &predicted),
            k,
            &mut warnings,
        );
        let counts = ConfusionCounts::from_predictions(
            &binarize(&y_test, config.event_threshold),
            &binarize(&predicted, config.event_threshold),
        );
        (counts, summary)
    } else {
        (ConfusionCounts::from_predictions(&y_test, &predicted), None)
    };
    let scores = counts.scores();
    info!(
        method = %spec,
        fold = k,
        true_positives = counts.tp,
        false_positives = counts.fp,
        false_negatives = counts.fn_,
        fscore = scores.fscore,
        "fold complete"
    );

    Ok(MetricRecord {
        method: spec.to_string(),
        fold: *fold,
        counts,
        scores,
        regression,
        warnings,
    })
}

/// Drop a summary whose errors overflowed, noting it on the record instead.
fn loggable_summary(
    summary: Option<RegressionSummary>,
    fold: usize,
    warnings: &mut Vec<String>,
) -> Option<RegressionSummary> {
    match summary {
        Some(s) if !s.is_finite() => {
            let message = format!(
                "regression error summary is not finite (mse={}, mae={}); omitted",
                s.mse, s.mae
            );
            warn!(fold, "{message}");
            warnings.push(message);
            None
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use odorcast_core::Matrix;

    fn start() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2017, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    /// One feature that flags the label exactly.
    fn step_frames(rows: usize) -> (FeatureFrame, LabelFrame) {
        let label: Vec<f64> = (0..rows).map(|i| if i % 10 == 0 { 1.0 } else { 0.0 }).collect();
        let x = FeatureFrame::hourly(start(), vec![("signal".into(), label.clone())]).unwrap();
        let y = LabelFrame::hourly(start(), vec![("smell".into(), label)]).unwrap();
        (x, y)
    }

    #[test]
    fn fold_arithmetic() {
        let folds = create_folds(100, 4, 5, 40).unwrap();
        // width 25: fold 0 tests 45..70, fold 1 tests 70..95, fold 2 would end at 120
        assert_eq!(folds.len(), 2);
        assert_eq!(
            folds[0],
            FoldSpec {
                fold_index: 0,
                train_start: 0,
                train_end: 40,
                test_start: 45,
                test_end: 70,
            }
        );
        assert_eq!(folds[1].train_range(), 25..65);
        assert_eq!(folds[1].test_range(), 70..95);
    }

    #[test]
    fn fold_sizing_errors() {
        assert!(matches!(create_folds(100, 0, 5, 40), Err(WalkForwardError::ZeroFolds)));
        assert!(matches!(create_folds(100, 4, 5, 0), Err(WalkForwardError::ZeroTrainSize)));
        assert!(matches!(
            create_folds(100, 4, 60, 40),
            Err(WalkForwardError::NoRoomToTest { .. })
        ));
        assert!(matches!(
            create_folds(10, 20, 1, 5),
            Err(WalkForwardError::EmptyTestWindow { .. })
        ));
        assert!(create_folds(100, 0, 5, 40).unwrap_err().is_configuration());
    }

    #[test]
    fn too_wide_first_window_yields_no_folds() {
        assert!(create_folds(10_000, 4, 48, 8000).unwrap().is_empty());
    }

    #[test]
    fn unknown_method_fails_before_any_fold() {
        let (x, y) = step_frames(200);
        let dir = tempfile::tempdir().unwrap();
        let log = MetricLog::new(dir.path().join("metrics.jsonl"));
        let data = EvaluationData {
            x: &x,
            y: &y,
            crowd: None,
        };
        let err = evaluate(data, "XYZ", false, &WalkForwardConfig::new(4), Some(&log)).unwrap_err();
        assert!(err.is_configuration());
        assert!(log.read_all().unwrap().records.is_empty());
    }

    #[test]
    fn crowd_method_needs_crowd_frame() {
        let (x, y) = step_frames(200);
        let data = EvaluationData {
            x: &x,
            y: &y,
            crowd: None,
        };
        let err = evaluate(data, "HCR", false, &WalkForwardConfig::new(4), None).unwrap_err();
        assert!(matches!(err, WalkForwardError::MissingCrowdFrame { .. }));
        assert!(!err.is_configuration());
    }

    #[test]
    fn decision_tree_scores_every_fold() {
        let (x, y) = step_frames(200);
        let config = WalkForwardConfig {
            skip_folds: 4,
            train_size: 80,
            parallelism: Parallelism::folds(2),
            ..WalkForwardConfig::new(5)
        };
        let data = EvaluationData {
            x: &x,
            y: &y,
            crowd: None,
        };
        let dir = tempfile::tempdir().unwrap();
        let log = MetricLog::new(dir.path().join("metrics.jsonl"));
        let records = evaluate(data, "DT", false, &config, Some(&log)).unwrap();
        // width 40: tests start at 84 and 124; 164 + 40 > 200
        assert_eq!(records.len(), 2);
        for (i, r) in records.iter().enumerate() {
            assert_eq!(r.fold.fold_index, i);
            assert_eq!(r.method, "DT");
            assert!(r.fold.test_start >= r.fold.train_end + 4);
            assert_eq!(r.scores.fscore, 1.0);
        }
        let logged = log.read_all().unwrap().records;
        assert_eq!(logged, records);
    }

    #[test]
    fn regression_records_carry_error_summary() {
        let rows = 120;
        let signal: Vec<f64> = (0..rows).map(|i| (i % 12) as f64 * 10.0 + 5.0).collect();
        let x = FeatureFrame::hourly(start(), vec![("signal".into(), signal.clone())]).unwrap();
        let y = LabelFrame::hourly(start(), vec![("smell".into(), signal)]).unwrap();
        let config = WalkForwardConfig {
            skip_folds: 2,
            train_size: 60,
            parallelism: Parallelism::sequential(),
            ..WalkForwardConfig::new(4)
        };
        let data = EvaluationData {
            x: &x,
            y: &y,
            crowd: None,
        };
        let records = evaluate(data, "LR", true, &config, None).unwrap();
        assert!(!records.is_empty());
        let summary = records[0].regression.unwrap();
        assert!(summary.mse < 1e-6);
        assert_eq!(records[0].scores.fscore, 1.0);
    }

    #[test]
    fn overflowing_summary_becomes_warning() {
        let huge = Matrix::column_vector(vec![1e200, -1e200]);
        let flipped = Matrix::column_vector(vec![-1e200, 1e200]);
        let mut warnings = vec!["iteration cap".to_string()];
        let summary =
            loggable_summary(RegressionSummary::compute(&huge, &flipped), 3, &mut warnings);
        assert_eq!(summary, None);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[1].contains("not finite"));

        let exact = Matrix::column_vector(vec![1.0, 2.0]);
        let kept = loggable_summary(RegressionSummary::compute(&exact, &exact), 0, &mut warnings);
        assert_eq!(kept.unwrap().mse, 0.0);
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn saved_fold_models_are_written() {
        let (x, y) = step_frames(200);
        let dir = tempfile::tempdir().unwrap();
        let config = WalkForwardConfig {
            skip_folds: 4,
            train_size: 80,
            parallelism: Parallelism::sequential(),
            model_dir: Some(dir.path().to_path_buf()),
            ..WalkForwardConfig::new(5)
        };
        let data = EvaluationData {
            x: &x,
            y: &y,
            crowd: None,
        };
        evaluate(data, "DT", false, &config, None).unwrap();
        assert!(dir.path().join("DT-fold0.json").exists());
        assert!(dir.path().join("DT-fold1.json").exists());
    }
}
