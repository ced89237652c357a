//! Odorcast Runner: evaluation and diagnostics on top of `odorcast-core`.
//!
//! This crate provides:
//! - Walk-forward cross-validation with a causal train/test gap
//! - Confusion-count metrics and a regression error summary
//! - An append-only JSON Lines metric log and its aggregator
//! - Lagged correlation of predictors against the response
//! - TOML experiment configuration, CSV loading and report export

pub mod aggregate;
pub mod balance;
pub mod config;
pub mod correlation;
pub mod data_loader;
pub mod export;
pub mod metric_log;
pub mod metrics;
pub mod stats;
pub mod walk_forward;

pub use aggregate::{aggregate, group_by_family, FamilyGroup, MetricSummary};
pub use balance::ClassBalance;
pub use config::{num_folds_for_span, ConfigError, ExperimentConfig, RunId};
pub use correlation::{
    analyze, correlation_matrix, CorrelationCell, CorrelationConfig, CorrelationError,
    CorrelationKind, CorrelationMatrix, CorrelationTable,
};
pub use data_loader::{load_experiment, load_frame, ExperimentData, LoadError};
pub use metric_log::{read_log_dir, LogContents, MetricLog, MetricRecord};
pub use metrics::{ConfusionCounts, RegressionSummary, Scores};
pub use stats::{Degenerate, Describe};
pub use walk_forward::{
    create_folds, evaluate, EvaluationData, FoldSpec, WalkForwardConfig, WalkForwardError,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn metric_record_is_send_sync() {
        assert_send::<MetricRecord>();
        assert_sync::<MetricRecord>();
    }

    #[test]
    fn walk_forward_types_are_send_sync() {
        assert_send::<WalkForwardConfig>();
        assert_sync::<WalkForwardConfig>();
        assert_send::<FoldSpec>();
        assert_sync::<FoldSpec>();
        assert_send::<EvaluationData<'static>>();
        assert_sync::<EvaluationData<'static>>();
        assert_send::<WalkForwardError>();
    }

    #[test]
    fn correlation_types_are_send_sync() {
        assert_send::<CorrelationTable>();
        assert_sync::<CorrelationTable>();
        assert_send::<CorrelationConfig>();
        assert_sync::<CorrelationConfig>();
        assert_send::<CorrelationError>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<ExperimentConfig>();
        assert_sync::<ExperimentConfig>();
        assert_send::<MetricSummary>();
        assert_sync::<MetricSummary>();
    }
}
