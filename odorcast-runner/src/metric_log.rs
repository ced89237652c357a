//! Per-fold metric records and their append-only JSON Lines log.
//!
//! Each line is one self-describing record, so a log can be appended to by
//! several runs and read back without any positional conventions. Readers
//! skip lines that fail to parse and report how many they skipped.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::metrics::{ConfusionCounts, RegressionSummary, Scores};
use crate::walk_forward::FoldSpec;

/// Outcome of one fold for one method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Canonical method tag.
    pub method: String,
    #[serde(flatten)]
    pub fold: FoldSpec,
    #[serde(flatten)]
    pub counts: ConfusionCounts,
    #[serde(flatten)]
    pub scores: Scores,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regression: Option<RegressionSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Records read back from one or more logs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogContents {
    pub records: Vec<MetricRecord>,
    /// Non-empty lines that did not parse as a record.
    pub skipped: usize,
}

impl LogContents {
    fn extend(&mut self, other: LogContents) {
        self.records.extend(other.records);
        self.skipped += other.skipped;
    }
}

/// A JSON Lines metric log on disk.
#[derive(Debug, Clone)]
pub struct MetricLog {
    path: PathBuf,
}

impl MetricLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append one record as a single line, creating the file and its parent
    /// directories as needed.
    pub fn append(&self, record: &MetricRecord) -> io::Result<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        writeln!(file, "{json}")?;
        file.flush()
    }

    /// Read every record. A missing file reads as empty.
    pub fn read_all(&self) -> io::Result<LogContents> {
        if !self.path.exists() {
            return Ok(LogContents::default());
        }

        let reader = io::BufReader::new(fs::File::open(&self.path)?);
        let mut contents = LogContents::default();
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<MetricRecord>(&line) {
                Ok(record) => contents.records.push(record),
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        line = number + 1,
                        error = %e,
                        "skipping malformed metric line"
                    );
                    contents.skipped += 1;
                }
            }
        }
        Ok(contents)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read every `*.jsonl` file directly inside `dir`, in file-name order.
pub fn read_log_dir(dir: &Path) -> io::Result<LogContents> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    paths.sort();

    let mut contents = LogContents::default();
    for path in paths {
        contents.extend(MetricLog::new(path).read_all()?);
    }
    Ok(contents)
}
