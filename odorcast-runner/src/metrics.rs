//! Fold metrics: confusion counts, precision/recall/F-score, and the
//! regression error summary.
//!
//! Every function here is pure: truth and prediction matrices in, numbers
//! out. A cell counts as a positive event when its value is greater than
//! zero; regression outputs are binarised at the event threshold first.

use odorcast_core::Matrix;
use serde::{Deserialize, Serialize};

/// True positives, false positives and false negatives summed over every
/// cell of the test window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCounts {
    #[serde(rename = "TP")]
    pub tp: usize,
    #[serde(rename = "FP")]
    pub fp: usize,
    #[serde(rename = "FN")]
    pub fn_: usize,
}

impl ConfusionCounts {
    /// Count events cell by cell. Shapes must agree; extra cells on either
    /// side are ignored.
    pub fn from_predictions(truth: &Matrix, predicted: &Matrix) -> Self {
        let mut counts = Self::default();
        for (&t, &p) in truth.as_slice().iter().zip(predicted.as_slice()) {
            match (is_event(t), is_event(p)) {
                (true, true) => counts.tp += 1,
                (false, true) => counts.fp += 1,
                (true, false) => counts.fn_ += 1,
                (false, false) => {}
            }
        }
        counts
    }

    pub fn scores(&self) -> Scores {
        Scores::from_counts(self)
    }
}

fn is_event(value: f64) -> bool {
    value > 0.0
}

/// Precision, recall and their harmonic mean. Zero denominators give 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub precision: f64,
    pub recall: f64,
    pub fscore: f64,
}

impl Scores {
    pub fn from_counts(counts: &ConfusionCounts) -> Self {
        let precision = ratio(counts.tp, counts.tp + counts.fp);
        let recall = ratio(counts.tp, counts.tp + counts.fn_);
        Self {
            precision,
            recall,
            fscore: fscore(precision, recall),
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Harmonic mean of precision and recall; 0 when either is 0.
pub fn fscore(precision: f64, recall: f64) -> f64 {
    if precision <= 0.0 || recall <= 0.0 {
        return 0.0;
    }
    2.0 * precision * recall / (precision + recall)
}

/// Map continuous values to 0/1 events: `value >= threshold` is an event.
/// `NaN` stays a non-event.
pub fn binarize(values: &Matrix, threshold: f64) -> Matrix {
    let data = values
        .as_slice()
        .iter()
        .map(|&v| if v >= threshold { 1.0 } else { 0.0 })
        .collect();
    // Same shape as the input, so construction cannot fail.
    Matrix::from_row_major(values.rows(), values.cols(), data)
        .unwrap_or_else(|| Matrix::zeros(values.rows(), values.cols()))
}

// ─── Regression summary ──────────────────────────────────────────────

/// Error summary of continuous predictions over all cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionSummary {
    pub mse: f64,
    pub mae: f64,
    /// Coefficient of determination; `None` when the truth is constant.
    pub r2: Option<f64>,
}

impl RegressionSummary {
    /// `None` when there are no cells to compare.
    pub fn compute(truth: &Matrix, predicted: &Matrix) -> Option<Self> {
        let pairs: Vec<(f64, f64)> = truth
            .as_slice()
            .iter()
            .copied()
            .zip(predicted.as_slice().iter().copied())
            .collect();
        if pairs.is_empty() {
            return None;
        }
        let n = pairs.len() as f64;
        let mse = pairs.iter().map(|(t, p)| (t - p).powi(2)).sum::<f64>() / n;
        let mae = pairs.iter().map(|(t, p)| (t - p).abs()).sum::<f64>() / n;

        let mean = pairs.iter().map(|(t, _)| t).sum::<f64>() / n;
        let total = pairs.iter().map(|(t, _)| (t - mean).powi(2)).sum::<f64>();
        let r2 = (total > 0.0)
            .then(|| 1.0 - mse * n / total)
            .filter(|r2| r2.is_finite());

        Some(Self { mse, mae, r2 })
    }

    /// JSON has no encoding for `inf` or `NaN`; a summary failing this
    /// cannot be logged as-is.
    pub fn is_finite(&self) -> bool {
        self.mse.is_finite() && self.mae.is_finite()
    }
}
