//! CSV loading for feature, label and crowd frames.
//!
//! Every file has a `DateTime` first column (RFC 3339 or
//! `%Y-%m-%d %H:%M:%S`) followed by numeric columns. Empty cells load as
//! `NaN`.

use std::io;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime};
use thiserror::Error;
use tracing::info;

use odorcast_core::{CrowdFrame, FeatureFrame, FrameError, LabelFrame, TimeSeriesFrame};

const TIME_COLUMN: &str = "DateTime";
const NAIVE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {source_name}: {source}")]
    Csv {
        source_name: String,
        #[source]
        source: csv::Error,
    },
    #[error("{source_name}: first column must be 'DateTime', found {found:?}")]
    MissingTimeColumn {
        source_name: String,
        found: Option<String>,
    },
    #[error("{source_name}: row {row} has unparseable timestamp {value:?}")]
    BadTimestamp {
        source_name: String,
        row: usize,
        value: String,
    },
    #[error("{source_name}: row {row}, column '{column}' is not numeric: {value:?}")]
    BadNumber {
        source_name: String,
        row: usize,
        column: String,
        value: String,
    },
    #[error("{source_name}: {source}")]
    Frame {
        source_name: String,
        #[source]
        source: FrameError,
    },
}

/// Load one frame from a CSV file.
pub fn load_frame(path: &Path) -> Result<TimeSeriesFrame, LoadError> {
    let source_name = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|e| LoadError::Csv {
        source_name: source_name.clone(),
        source: csv::Error::from(e),
    })?;
    read_frame(file, &source_name)
}

/// Parse a frame from any CSV reader; `source_name` labels errors.
pub fn read_frame<R: io::Read>(reader: R, source_name: &str) -> Result<TimeSeriesFrame, LoadError> {
    let csv_error = |source| LoadError::Csv {
        source_name: source_name.to_string(),
        source,
    };
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = rdr.headers().map_err(csv_error)?.clone();
    match headers.get(0) {
        Some(TIME_COLUMN) => {}
        found => {
            return Err(LoadError::MissingTimeColumn {
                source_name: source_name.to_string(),
                found: found.map(str::to_string),
            })
        }
    }
    let names: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut timestamps = Vec::new();
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
    for (row, record) in rdr.records().enumerate() {
        let record = record.map_err(csv_error)?;
        let stamp = record.get(0).unwrap_or_default();
        timestamps.push(parse_timestamp(stamp).ok_or_else(|| LoadError::BadTimestamp {
            source_name: source_name.to_string(),
            row,
            value: stamp.to_string(),
        })?);

        for (j, name) in names.iter().enumerate() {
            let cell = record.get(j + 1).unwrap_or_default();
            let value = if cell.is_empty() {
                f64::NAN
            } else {
                cell.parse::<f64>().map_err(|_| LoadError::BadNumber {
                    source_name: source_name.to_string(),
                    row,
                    column: name.clone(),
                    value: cell.to_string(),
                })?
            };
            columns[j].push(value);
        }
    }

    TimeSeriesFrame::new(timestamps, names.into_iter().zip(columns).collect()).map_err(|source| {
        LoadError::Frame {
            source_name: source_name.to_string(),
            source,
        }
    })
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(value, NAIVE_FORMAT))
        .ok()
}

/// Aligned frames for one experiment.
#[derive(Debug, Clone)]
pub struct ExperimentData {
    pub x: FeatureFrame,
    pub y: LabelFrame,
    pub crowd: Option<CrowdFrame>,
}

/// Load X, Y and optionally C, and check they are row-aligned.
pub fn load_experiment(
    features: &Path,
    labels: &Path,
    crowd: Option<&Path>,
) -> Result<ExperimentData, LoadError> {
    let x = load_frame(features)?;
    let y = load_frame(labels)?;
    let aligned = |other: &TimeSeriesFrame, name: &str, path: &Path| {
        x.ensure_aligned("features", other, name)
            .map_err(|source| LoadError::Frame {
                source_name: path.display().to_string(),
                source,
            })
    };
    aligned(&y, "labels", labels)?;
    let crowd = match crowd {
        Some(path) => {
            let c = load_frame(path)?;
            aligned(&c, "crowd", path)?;
            Some(c)
        }
        None => None,
    };
    info!(
        rows = x.len(),
        features = x.n_columns(),
        responses = y.n_columns(),
        crowd = crowd.is_some(),
        "loaded experiment data"
    );
    Ok(ExperimentData { x, y, crowd })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_timestamp_formats_and_blanks() {
        let csv = "DateTime,pm25,H2S\n\
                   2017-01-01 00:00:00,1.5,\n\
                   2017-01-01T01:00:00+00:00,2.5,0.3\n";
        let frame = read_frame(csv.as_bytes(), "inline").unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.column_names(), &["pm25".to_string(), "H2S".to_string()]);
        assert_eq!(frame.column("pm25").unwrap(), &[1.5, 2.5]);
        assert!(frame.column("H2S").unwrap()[0].is_nan());
    }

    #[test]
    fn time_column_is_required() {
        let err = read_frame("Time,a\n2017-01-01 00:00:00,1\n".as_bytes(), "inline").unwrap_err();
        assert!(matches!(err, LoadError::MissingTimeColumn { .. }));
    }

    #[test]
    fn bad_cells_carry_context() {
        let err = read_frame(
            "DateTime,a\n2017-01-01 00:00:00,oops\n".as_bytes(),
            "inline",
        )
        .unwrap_err();
        match err {
            LoadError::BadNumber { row, column, .. } => {
                assert_eq!(row, 0);
                assert_eq!(column, "a");
            }
            other => panic!("unexpected {other}"),
        }

        let err = read_frame("DateTime,a\nyesterday,1\n".as_bytes(), "inline").unwrap_err();
        assert!(matches!(err, LoadError::BadTimestamp { .. }));
    }

    #[test]
    fn unordered_rows_are_rejected() {
        let csv = "DateTime,a\n2017-01-01 01:00:00,1\n2017-01-01 00:00:00,2\n";
        let err = read_frame(csv.as_bytes(), "inline").unwrap_err();
        assert!(matches!(
            err,
            LoadError::Frame {
                source: FrameError::NonMonotonicTimestamps { row: 1 },
                ..
            }
        ));
    }

    #[test]
    fn experiment_frames_must_align() {
        let dir = tempfile::tempdir().unwrap();
        let x = dir.path().join("X.csv");
        let y = dir.path().join("Y.csv");
        std::fs::write(&x, "DateTime,a\n2017-01-01 00:00:00,1\n2017-01-01 01:00:00,2\n").unwrap();
        std::fs::write(&y, "DateTime,smell\n2017-01-01 00:00:00,0\n").unwrap();
        let err = load_experiment(&x, &y, None).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Frame {
                source: FrameError::Misaligned { .. },
                ..
            }
        ));

        std::fs::write(&y, "DateTime,smell\n2017-01-01 00:00:00,0\n2017-01-01 01:00:00,1\n").unwrap();
        let data = load_experiment(&x, &y, None).unwrap();
        assert_eq!(data.y.column("smell").unwrap(), &[0.0, 1.0]);
        assert!(data.crowd.is_none());
    }
}
