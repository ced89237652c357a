//! Experiment configuration, loaded from TOML.
//!
//! ```toml
//! features = "data/X.csv"
//! labels = "data/Y.csv"
//! methods = ["ET", "RF", "RF-200-sqrt-32"]
//! skip_folds = 48
//!
//! [parallelism]
//! scope = "folds"
//! threads = 8
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use odorcast_core::{ParallelScope, Parallelism};

use crate::correlation::{CorrelationConfig, CALENDAR_COLUMNS};
use crate::walk_forward::{WalkForwardConfig, DEFAULT_EVENT_THRESHOLD};

/// Content hash of an [`ExperimentConfig`].
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid experiment config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot serialize experiment config: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Feature CSV (X).
    pub features: PathBuf,
    /// Label CSV (Y).
    pub labels: PathBuf,
    /// Crowd CSV (C), needed only by crowd-aware methods.
    #[serde(default)]
    pub crowd: Option<PathBuf>,
    /// Method tags to evaluate, in order.
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub is_regression: bool,
    /// Derived from the data span in whole weeks when absent.
    #[serde(default)]
    pub num_folds: Option<usize>,
    #[serde(default = "default_skip_folds")]
    pub skip_folds: usize,
    #[serde(default = "default_train_size")]
    pub train_size: usize,
    #[serde(default = "default_max_lag")]
    pub max_lag: usize,
    #[serde(default = "default_event_threshold")]
    pub event_threshold: f64,
    #[serde(default = "default_skip_columns")]
    pub skip_columns: Vec<String>,
    #[serde(default)]
    pub parallelism: Parallelism,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Save each fold's fitted estimator under the run directory.
    #[serde(default)]
    pub save_models: bool,
}

fn default_skip_folds() -> usize {
    48
}

fn default_train_size() -> usize {
    8000
}

fn default_max_lag() -> usize {
    6
}

fn default_event_threshold() -> f64 {
    DEFAULT_EVENT_THRESHOLD
}

fn default_skip_columns() -> Vec<String> {
    CALENDAR_COLUMNS.iter().map(|c| c.to_string()).collect()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("runs")
}

impl ExperimentConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Deterministic BLAKE3 hash of the serialized config.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    /// `<output_dir>/<timestamp>-<first 12 hex digits of run_id>`.
    pub fn run_dir(&self, now: DateTime<Local>) -> Result<PathBuf, ConfigError> {
        let id = self.run_id()?;
        let name = format!("{}-{}", now.format("%Y%m%d_%H%M%S"), &id[..12]);
        Ok(self.output_dir.join(name))
    }

    /// Fold settings for data spanning `span`.
    pub fn walk_forward(
        &self,
        span: Option<(NaiveDateTime, NaiveDateTime)>,
        model_dir: Option<PathBuf>,
    ) -> WalkForwardConfig {
        let num_folds = self.num_folds.unwrap_or_else(|| {
            span.map_or(1, |(start, end)| num_folds_for_span(start, end))
        });
        WalkForwardConfig {
            num_folds,
            skip_folds: self.skip_folds,
            train_size: self.train_size,
            event_threshold: self.event_threshold,
            parallelism: self.parallelism,
            model_dir,
        }
    }

    pub fn correlation(&self) -> CorrelationConfig {
        CorrelationConfig {
            max_lag: self.max_lag,
            is_regression: self.is_regression,
            skip_columns: self.skip_columns.clone(),
            threads: match self.parallelism.scope {
                ParallelScope::Sequential => 1,
                _ => self.parallelism.threads.max(1),
            },
        }
    }
}

/// Whole weeks between `start` and `end`, at least 1.
pub fn num_folds_for_span(start: NaiveDateTime, end: NaiveDateTime) -> usize {
    (end - start).num_weeks().max(1) as usize
}
