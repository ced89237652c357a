//! Time-aligned frames and the dense matrix the estimators consume.
//!
//! A `TimeSeriesFrame` is the unit handed over by the feature-engineering
//! stage: strictly increasing timestamps, named numeric columns, `NaN` for
//! missing cells. Feature, label and crowd frames are all this type; the
//! aliases below only document intent at call sites.

use std::ops::Range;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engineered predictors (X).
pub type FeatureFrame = TimeSeriesFrame;
/// Responses (Y), binary or continuous.
pub type LabelFrame = TimeSeriesFrame;
/// Per-row crowd metadata (C).
pub type CrowdFrame = TimeSeriesFrame;

/// Errors from frame construction and alignment checks.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    #[error("column '{column}' has {actual} rows, expected {expected}")]
    ColumnLength {
        column: String,
        expected: usize,
        actual: usize,
    },
    #[error("timestamps are not strictly increasing at row {row}")]
    NonMonotonicTimestamps { row: usize },
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),
    #[error("missing column '{0}'")]
    MissingColumn(String),
    #[error("{left_name} has {left} rows but {right_name} has {right}")]
    Misaligned {
        left_name: String,
        left: usize,
        right_name: String,
        right: usize,
    },
    #[error("{left_name} and {right_name} disagree on the timestamp at row {row}")]
    TimestampMismatch {
        left_name: String,
        right_name: String,
        row: usize,
    },
    #[error("row range {start}..{end} is out of bounds for {len} rows")]
    OutOfBounds { start: usize, end: usize, len: usize },
}

/// Chronologically ordered table of named numeric signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesFrame {
    timestamps: Vec<NaiveDateTime>,
    names: Vec<String>,
    /// Column-major storage, one vector per column.
    columns: Vec<Vec<f64>>,
}

impl TimeSeriesFrame {
    /// Build a frame, validating column lengths, name uniqueness and
    /// timestamp ordering.
    pub fn new(
        timestamps: Vec<NaiveDateTime>,
        columns: Vec<(String, Vec<f64>)>,
    ) -> Result<Self, FrameError> {
        if let Some(row) = timestamps
            .windows(2)
            .position(|pair| pair[1] <= pair[0])
            .map(|i| i + 1)
        {
            return Err(FrameError::NonMonotonicTimestamps { row });
        }

        let mut names = Vec::with_capacity(columns.len());
        let mut values = Vec::with_capacity(columns.len());
        for (name, column) in columns {
            if column.len() != timestamps.len() {
                return Err(FrameError::ColumnLength {
                    column: name,
                    expected: timestamps.len(),
                    actual: column.len(),
                });
            }
            if names.contains(&name) {
                return Err(FrameError::DuplicateColumn(name));
            }
            names.push(name);
            values.push(column);
        }

        Ok(Self {
            timestamps,
            names,
            columns: values,
        })
    }

    /// Build a frame whose rows are one hour apart starting at `start`.
    ///
    /// The row count is taken from the first column.
    pub fn hourly(
        start: NaiveDateTime,
        columns: Vec<(String, Vec<f64>)>,
    ) -> Result<Self, FrameError> {
        let rows = columns.first().map_or(0, |(_, c)| c.len());
        let timestamps = (0..rows)
            .map(|i| start + Duration::hours(i as i64))
            .collect();
        Self::new(timestamps, columns)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn n_columns(&self) -> usize {
        self.names.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
    }

    /// Like [`column`](Self::column) but reports the missing name.
    pub fn require_column(&self, name: &str) -> Result<&[f64], FrameError> {
        self.column(name)
            .ok_or_else(|| FrameError::MissingColumn(name.to_string()))
    }

    pub fn column_at(&self, index: usize) -> &[f64] {
        &self.columns[index]
    }

    /// First and last timestamp, if any rows exist.
    pub fn span(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        Some((*self.timestamps.first()?, *self.timestamps.last()?))
    }

    /// Contiguous row slice `[range.start, range.end)`.
    pub fn slice(&self, range: Range<usize>) -> Result<Self, FrameError> {
        if range.start > range.end || range.end > self.len() {
            return Err(FrameError::OutOfBounds {
                start: range.start,
                end: range.end,
                len: self.len(),
            });
        }
        Ok(Self {
            timestamps: self.timestamps[range.clone()].to_vec(),
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| c[range.clone()].to_vec())
                .collect(),
        })
    }

    /// Check that `other` is row-aligned with `self` (same length and same
    /// timestamps).
    pub fn ensure_aligned(
        &self,
        self_name: &str,
        other: &TimeSeriesFrame,
        other_name: &str,
    ) -> Result<(), FrameError> {
        if self.len() != other.len() {
            return Err(FrameError::Misaligned {
                left_name: self_name.to_string(),
                left: self.len(),
                right_name: other_name.to_string(),
                right: other.len(),
            });
        }
        if let Some(row) = self
            .timestamps
            .iter()
            .zip(&other.timestamps)
            .position(|(a, b)| a != b)
        {
            return Err(FrameError::TimestampMismatch {
                left_name: self_name.to_string(),
                right_name: other_name.to_string(),
                row,
            });
        }
        Ok(())
    }

    /// Row-major copy of all columns.
    pub fn to_matrix(&self) -> Matrix {
        let rows = self.len();
        let cols = self.n_columns();
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            data.extend(self.columns.iter().map(|c| c[r]));
        }
        Matrix { rows, cols, data }
    }
}

/// Dense row-major matrix of `f64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Wrap row-major `data`. Returns `None` if the length is not
    /// `rows * cols`.
    pub fn from_row_major(rows: usize, cols: usize, data: Vec<f64>) -> Option<Self> {
        (data.len() == rows * cols).then_some(Self { rows, cols, data })
    }

    /// Build from nested rows. Returns `None` on ragged input.
    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != cols) {
            return None;
        }
        let data = rows.iter().flatten().copied().collect();
        Some(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Single-column matrix.
    pub fn column_vector(values: Vec<f64>) -> Self {
        Self {
            rows: values.len(),
            cols: 1,
            data: values,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.rows).map(|r| self.get(r, col)).collect()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Copy of the given rows, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        Self {
            rows: indices.len(),
            cols: self.cols,
            data,
        }
    }

    /// Horizontal concatenation of equally tall matrices.
    pub fn hstack(parts: &[Matrix]) -> Option<Self> {
        let rows = parts.first()?.rows;
        if parts.iter().any(|p| p.rows != rows) {
            return None;
        }
        let cols = parts.iter().map(|p| p.cols).sum();
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for part in parts {
                data.extend_from_slice(part.row(r));
            }
        }
        Some(Self { rows, cols, data })
    }

    /// Position of the first non-finite cell as `(row, col)`.
    pub fn first_non_finite(&self) -> Option<(usize, usize)> {
        self.data
            .iter()
            .position(|v| !v.is_finite())
            .map(|i| (i / self.cols.max(1), i % self.cols.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2017, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn sample() -> TimeSeriesFrame {
        TimeSeriesFrame::hourly(
            t0(),
            vec![
                ("a".into(), vec![1.0, 2.0, 3.0, 4.0]),
                ("b".into(), vec![10.0, 20.0, 30.0, 40.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn rejects_ragged_columns() {
        let err = TimeSeriesFrame::hourly(
            t0(),
            vec![("a".into(), vec![1.0, 2.0]), ("b".into(), vec![1.0])],
        )
        .unwrap_err();
        assert!(matches!(err, FrameError::ColumnLength { .. }));
    }

    #[test]
    fn rejects_duplicate_timestamps() {
        let ts = vec![t0(), t0()];
        let err = TimeSeriesFrame::new(ts, vec![("a".into(), vec![1.0, 2.0])]).unwrap_err();
        assert_eq!(err, FrameError::NonMonotonicTimestamps { row: 1 });
    }

    #[test]
    fn rejects_duplicate_columns() {
        let err = TimeSeriesFrame::hourly(
            t0(),
            vec![("a".into(), vec![1.0]), ("a".into(), vec![2.0])],
        )
        .unwrap_err();
        assert_eq!(err, FrameError::DuplicateColumn("a".into()));
    }

    #[test]
    fn slice_keeps_names_and_rows() {
        let frame = sample();
        let s = frame.slice(1..3).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.column("b").unwrap(), &[20.0, 30.0]);
        assert!(frame.slice(2..9).is_err());
    }

    #[test]
    fn to_matrix_is_row_major() {
        let m = sample().to_matrix();
        assert_eq!(m.rows(), 4);
        assert_eq!(m.cols(), 2);
        assert_eq!(m.row(2), &[3.0, 30.0]);
    }

    #[test]
    fn alignment_checks_length_and_timestamps() {
        let frame = sample();
        let shorter = frame.slice(0..3).unwrap();
        assert!(matches!(
            frame.ensure_aligned("X", &shorter, "Y"),
            Err(FrameError::Misaligned { .. })
        ));
        let shifted = TimeSeriesFrame::hourly(
            t0() + Duration::hours(1),
            vec![("y".into(), vec![0.0; 4])],
        )
        .unwrap();
        assert!(matches!(
            frame.ensure_aligned("X", &shifted, "Y"),
            Err(FrameError::TimestampMismatch { row: 0, .. })
        ));
        assert!(frame.ensure_aligned("X", &frame.clone(), "Y").is_ok());
    }

    #[test]
    fn hstack_and_select_rows() {
        let a = Matrix::column_vector(vec![1.0, 2.0, 3.0]);
        let b = Matrix::column_vector(vec![4.0, 5.0, 6.0]);
        let m = Matrix::hstack(&[a, b]).unwrap();
        assert_eq!(m.row(1), &[2.0, 5.0]);
        let picked = m.select_rows(&[2, 0]);
        assert_eq!(picked.row(0), &[3.0, 6.0]);
        assert_eq!(picked.row(1), &[1.0, 4.0]);
    }

    #[test]
    fn finds_non_finite_cells() {
        let m = Matrix::from_rows(&[vec![1.0, 2.0], vec![f64::NAN, 0.0]]).unwrap();
        assert_eq!(m.first_non_finite(), Some((1, 0)));
    }
}
