//! Lagged correlation between each predictor and the response.
//!
//! For lag `L`, the predictor is shifted forward so row `t` holds its value
//! at `t - L`, then paired with the response at `t`. Rows where either side
//! is missing are dropped before computing the coefficient. A continuous
//! response uses Pearson correlation; a binary one uses point-biserial
//! correlation, which is Pearson on the 0/1 series.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use odorcast_core::parallel::map_indexed;
use odorcast_core::{FeatureFrame, FrameError, LabelFrame};

use crate::stats::{pearson, Degenerate};

/// Calendar columns that carry no lagged signal.
pub const CALENDAR_COLUMNS: [&str; 3] = ["Day", "DayOfWeek", "HourOfDay"];

#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("label frame has no response column")]
    NoResponse,
    #[error("response column '{column}' is not binary: row {row} holds {value}")]
    NonBinaryResponse {
        column: String,
        row: usize,
        value: f64,
    },
    #[error("cannot build correlation thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Largest lag analysed; lags run `0..=max_lag`.
    pub max_lag: usize,
    /// Continuous response (Pearson) rather than binary (point-biserial).
    pub is_regression: bool,
    /// Predictor columns left out of the analysis.
    pub skip_columns: Vec<String>,
    pub threads: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            max_lag: 6,
            is_regression: false,
            skip_columns: CALENDAR_COLUMNS.iter().map(|c| c.to_string()).collect(),
            threads: 1,
        }
    }
}

// ─── Result types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationKind {
    Pearson,
    PointBiserial,
}

/// Correlation at one (predictor, lag) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CorrelationCell {
    Defined {
        coefficient: f64,
        p_value: f64,
        sample_count: usize,
    },
    Undefined {
        reason: Degenerate,
        sample_count: usize,
    },
}

impl CorrelationCell {
    pub fn coefficient(&self) -> Option<f64> {
        match self {
            Self::Defined { coefficient, .. } => Some(*coefficient),
            Self::Undefined { .. } => None,
        }
    }

    pub fn p_value(&self) -> Option<f64> {
        match self {
            Self::Defined { p_value, .. } => Some(*p_value),
            Self::Undefined { .. } => None,
        }
    }

    pub fn sample_count(&self) -> usize {
        match self {
            Self::Defined { sample_count, .. } | Self::Undefined { sample_count, .. } => {
                *sample_count
            }
        }
    }

    /// Coefficient rounded to 3 decimals and p-value to 5.
    pub fn rounded(&self) -> Option<(f64, f64)> {
        match self {
            Self::Defined {
                coefficient,
                p_value,
                ..
            } => Some((round_to(*coefficient, 3), round_to(*p_value, 5))),
            Self::Undefined { .. } => None,
        }
    }

    /// `(r, p, n)` with display rounding, or `(undefined, undefined, n)`.
    pub fn display(&self) -> String {
        match self {
            Self::Defined {
                coefficient,
                p_value,
                sample_count,
            } => format!("({coefficient:.3}, {p_value:.5}, {sample_count})"),
            Self::Undefined { sample_count, .. } => {
                format!("(undefined, undefined, {sample_count})")
            }
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Cells indexed by predictor (frame order) then lag (ascending).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationTable {
    pub response: String,
    pub kind: CorrelationKind,
    pub max_lag: usize,
    pub predictors: Vec<String>,
    pub cells: Vec<Vec<CorrelationCell>>,
}

impl CorrelationTable {
    pub fn get(&self, predictor: &str, lag: usize) -> Option<&CorrelationCell> {
        let i = self.predictors.iter().position(|p| p == predictor)?;
        self.cells[i].get(lag)
    }

    /// Lag with the largest absolute coefficient, at full precision.
    ///
    /// Ties go to the smaller lag; `None` when every lag is undefined.
    pub fn strongest_lag(&self, predictor: &str) -> Option<(usize, f64)> {
        let i = self.predictors.iter().position(|p| p == predictor)?;
        self.cells[i]
            .iter()
            .enumerate()
            .filter_map(|(lag, cell)| cell.coefficient().map(|r| (lag, r)))
            .fold(None, |best: Option<(usize, f64)>, (lag, r)| match best {
                Some((_, b)) if b.abs() >= r.abs() => best,
                _ => Some((lag, r)),
            })
    }
}

// ─── Analysis ────────────────────────────────────────────────────────

/// Correlate every non-skipped predictor of `x` with the first column of
/// `y` at lags `0..=max_lag`.
pub fn analyze(
    x: &FeatureFrame,
    y: &LabelFrame,
    config: &CorrelationConfig,
) -> Result<CorrelationTable, CorrelationError> {
    x.ensure_aligned("features", y, "labels")?;
    let response_name = y
        .column_names()
        .first()
        .ok_or(CorrelationError::NoResponse)?
        .clone();
    let response = y.column_at(0);

    let kind = if config.is_regression {
        CorrelationKind::Pearson
    } else {
        if let Some((row, &value)) = response
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_nan() && **v != 0.0 && **v != 1.0)
        {
            return Err(CorrelationError::NonBinaryResponse {
                column: response_name,
                row,
                value,
            });
        }
        CorrelationKind::PointBiserial
    };

    let predictors: Vec<(String, &[f64])> = x
        .column_names()
        .iter()
        .enumerate()
        .filter(|(_, name)| !config.skip_columns.contains(name))
        .map(|(i, name)| (name.clone(), x.column_at(i)))
        .collect();

    let lags = config.max_lag + 1;
    let flat = map_indexed(predictors.len() * lags, config.threads, |i| {
        lagged_cell(predictors[i / lags].1, response, i % lags)
    })?;
    debug!(
        predictors = predictors.len(),
        lags,
        response = %response_name,
        "computed lagged correlations"
    );

    let mut cells: Vec<Vec<CorrelationCell>> = Vec::with_capacity(predictors.len());
    let mut flat = flat.into_iter();
    for _ in 0..predictors.len() {
        cells.push(flat.by_ref().take(lags).collect());
    }

    Ok(CorrelationTable {
        response: response_name,
        kind,
        max_lag: config.max_lag,
        predictors: predictors.into_iter().map(|(name, _)| name).collect(),
        cells,
    })
}

fn lagged_cell(predictor: &[f64], response: &[f64], lag: usize) -> CorrelationCell {
    let (xs, ys): (Vec<f64>, Vec<f64>) = (lag..response.len())
        .map(|t| (predictor[t - lag], response[t]))
        .filter(|(x, y)| !x.is_nan() && !y.is_nan())
        .unzip();
    cell_for(&xs, &ys)
}

fn cell_for(xs: &[f64], ys: &[f64]) -> CorrelationCell {
    let sample_count = xs.len();
    match pearson(xs, ys) {
        Ok((coefficient, p_value)) => CorrelationCell::Defined {
            coefficient,
            p_value,
            sample_count,
        },
        Err(reason) => CorrelationCell::Undefined {
            reason,
            sample_count,
        },
    }
}

// ─── Predictor-by-predictor matrix ───────────────────────────────────

/// Pairwise Pearson correlations between predictors, lag 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub names: Vec<String>,
    /// `cells[i][j]` correlates `names[i]` with `names[j]`.
    pub cells: Vec<Vec<CorrelationCell>>,
}

/// Correlate every pair of non-skipped columns of `x`, dropping rows where
/// either column is missing.
pub fn correlation_matrix(x: &FeatureFrame, skip_columns: &[String]) -> CorrelationMatrix {
    let columns: Vec<(String, &[f64])> = x
        .column_names()
        .iter()
        .enumerate()
        .filter(|(_, name)| !skip_columns.contains(name))
        .map(|(i, name)| (name.clone(), x.column_at(i)))
        .collect();

    let cells = columns
        .iter()
        .map(|(_, a)| {
            columns
                .iter()
                .map(|(_, b)| {
                    let (xs, ys): (Vec<f64>, Vec<f64>) = a
                        .iter()
                        .zip(b.iter())
                        .filter(|(x, y)| !x.is_nan() && !y.is_nan())
                        .map(|(x, y)| (*x, *y))
                        .unzip();
                    cell_for(&xs, &ys)
                })
                .collect()
        })
        .collect();

    CorrelationMatrix {
        names: columns.into_iter().map(|(name, _)| name).collect(),
        cells,
    }
}
