//! Odorcast CLI: evaluation, correlation and aggregation commands.
//!
//! Commands:
//! - `evaluate`: walk-forward evaluation of every configured method
//! - `correlate`: lagged correlation report for the configured data
//! - `aggregate`: summarise metric logs per model family

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use odorcast_runner::export::{render_summaries, write_correlation_csv, write_matrix_csv};
use odorcast_runner::{
    analyze, correlation_matrix, evaluate, group_by_family, load_experiment, read_log_dir,
    EvaluationData, ExperimentConfig, ExperimentData, LogContents, MetricLog, MetricSummary,
};

#[derive(Parser)]
#[command(
    name = "odorcast",
    about = "Odorcast CLI: odor-event model evaluation and diagnostics"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run walk-forward evaluation for the configured methods.
    Evaluate {
        /// Path to the experiment TOML file.
        #[arg(long)]
        config: PathBuf,

        /// Method tags to evaluate instead of the configured list.
        #[arg(long = "method")]
        methods: Vec<String>,
    },
    /// Compute lagged correlations between predictors and the response.
    Correlate {
        /// Path to the experiment TOML file.
        #[arg(long)]
        config: PathBuf,

        /// Override the configured maximum lag.
        #[arg(long)]
        max_lag: Option<usize>,
    },
    /// Summarise metric records from a log file or a directory of logs.
    Aggregate {
        /// A `.jsonl` file or a directory containing them.
        path: PathBuf,

        /// Family names, matched in order against method tags.
        #[arg(long = "family", default_values_t = ["ET".to_string(), "RF".to_string()])]
        families: Vec<String>,

        /// Print JSON instead of Markdown.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("odorcast=info".parse()?)
                .add_directive("odorcast_runner=info".parse()?)
                .add_directive("odorcast_core=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Evaluate { config, methods } => run_evaluate(&config, methods),
        Commands::Correlate { config, max_lag } => run_correlate(&config, max_lag),
        Commands::Aggregate {
            path,
            families,
            json,
        } => run_aggregate(&path, &families, json),
    }
}

/// Load the config and its data, and create this run's directory.
fn prepare(config_path: &Path) -> Result<(ExperimentConfig, ExperimentData, PathBuf)> {
    let config = ExperimentConfig::load(config_path)?;
    let data = load_experiment(&config.features, &config.labels, config.crowd.as_deref())?;

    let run_dir = config.run_dir(chrono::Local::now())?;
    fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create run dir: {}", run_dir.display()))?;
    let manifest = serde_json::to_string_pretty(&config)?;
    fs::write(run_dir.join("config.json"), manifest)?;
    info!(run_dir = %run_dir.display(), run_id = %config.run_id()?, "prepared run");

    Ok((config, data, run_dir))
}

fn run_evaluate(config_path: &Path, methods: Vec<String>) -> Result<()> {
    let (config, data, run_dir) = prepare(config_path)?;
    let methods = if methods.is_empty() {
        config.methods.clone()
    } else {
        methods
    };
    if methods.is_empty() {
        bail!("no methods to evaluate: pass --method or set `methods` in the config");
    }

    let model_dir = config.save_models.then(|| run_dir.join("models"));
    let wf = config.walk_forward(data.x.span(), model_dir);
    let frames = EvaluationData {
        x: &data.x,
        y: &data.y,
        crowd: data.crowd.as_ref(),
    };

    let metrics_dir = run_dir.join("metrics");
    let mut summaries = Vec::with_capacity(methods.len());
    for method in &methods {
        let log = MetricLog::new(metrics_dir.join(format!("{method}.jsonl")));
        let records = evaluate(frames, method, config.is_regression, &wf, Some(&log))
            .with_context(|| format!("evaluation of {method} failed"))?;
        if records.is_empty() {
            warn!(method = %method, "no folds evaluated");
        }
        summaries.push((method.clone(), MetricSummary::of(&records)));
    }

    println!("{}", render_summaries(&summaries));
    println!("Metric logs saved to: {}", metrics_dir.display());
    Ok(())
}

fn run_correlate(config_path: &Path, max_lag: Option<usize>) -> Result<()> {
    let (config, data, run_dir) = prepare(config_path)?;
    let mut corr = config.correlation();
    if let Some(lag) = max_lag {
        corr.max_lag = lag;
    }

    let table = analyze(&data.x, &data.y, &corr)?;
    let table_path = run_dir.join("correlation.csv");
    write_correlation_csv(&table_path, &table)
        .with_context(|| format!("failed to write {}", table_path.display()))?;

    let matrix_path = run_dir.join("predictor_matrix.csv");
    write_matrix_csv(&matrix_path, &correlation_matrix(&data.x, &corr.skip_columns))
        .with_context(|| format!("failed to write {}", matrix_path.display()))?;

    println!("{:<24} {:>4} {:>8}", "predictor", "lag", "r");
    for predictor in &table.predictors {
        match table.strongest_lag(predictor) {
            Some((lag, r)) => println!("{predictor:<24} {lag:>4} {r:>8.3}"),
            None => println!("{predictor:<24} {:>4} {:>8}", "-", "undefined"),
        }
    }
    println!("Correlation report saved to: {}", table_path.display());
    Ok(())
}

fn run_aggregate(path: &Path, families: &[String], json: bool) -> Result<()> {
    let contents: LogContents = if path.is_dir() {
        read_log_dir(path)?
    } else {
        MetricLog::new(path.to_path_buf()).read_all()?
    };
    if contents.skipped > 0 {
        warn!(skipped = contents.skipped, "ignored malformed metric lines");
    }

    let families: Vec<&str> = families.iter().map(String::as_str).collect();
    let summaries: Vec<(String, MetricSummary)> =
        group_by_family(&contents.records, &families)
            .into_iter()
            .map(|group| {
                let summary = group.summary();
                (group.family, summary)
            })
            .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        println!("{}", render_summaries(&summaries));
    }
    Ok(())
}
