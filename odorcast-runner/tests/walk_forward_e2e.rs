//! End-to-end walk-forward runs over synthetic hourly data.

use chrono::NaiveDate;
use odorcast_core::{FeatureFrame, LabelFrame, Parallelism};
use odorcast_runner::{
    aggregate, evaluate, read_log_dir, EvaluationData, MetricLog, WalkForwardConfig,
};

const ROWS: usize = 10_000;

fn is_event(i: usize) -> bool {
    (i * 37) % 100 < 5
}

/// 5% positive labels and three features, one of which is informative.
fn frames() -> (FeatureFrame, LabelFrame) {
    let start = NaiveDate::from_ymd_opt(2016, 10, 31)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let label: Vec<f64> = (0..ROWS).map(|i| if is_event(i) { 1.0 } else { 0.0 }).collect();
    let h2s: Vec<f64> = (0..ROWS)
        .map(|i| label[i] * 2.0 + ((i as f64) * 0.37).sin() * 0.8)
        .collect();
    let wind: Vec<f64> = (0..ROWS).map(|i| ((i as f64) * 0.05).cos()).collect();
    let hour: Vec<f64> = (0..ROWS).map(|i| (i % 24) as f64).collect();

    let x = FeatureFrame::hourly(
        start,
        vec![
            ("H2S".into(), h2s),
            ("wind".into(), wind),
            ("HourOfDay".into(), hour),
        ],
    )
    .unwrap();
    let y = LabelFrame::hourly(start, vec![("smell".into(), label)]).unwrap();
    (x, y)
}

fn config(num_folds: usize) -> WalkForwardConfig {
    WalkForwardConfig {
        skip_folds: 48,
        train_size: 8000,
        parallelism: Parallelism::folds(3),
        ..WalkForwardConfig::new(num_folds)
    }
}

#[test]
fn four_folds_over_ten_thousand_rows() {
    let (x, y) = frames();
    let data = EvaluationData {
        x: &x,
        y: &y,
        crowd: None,
    };
    // width 2500: the first test window would end at 10548
    let records = evaluate(data, "ET-10-sqrt-2", false, &config(4), None).unwrap();
    assert!(records.is_empty());
}

#[test]
fn narrow_windows_fill_the_fold_cap() {
    let (x, y) = frames();
    let data = EvaluationData {
        x: &x,
        y: &y,
        crowd: None,
    };
    // width 476: tests end at 8524, 9000, 9476, 9952
    let width = ROWS / 21;
    let records = evaluate(data, "DT", false, &config(21), None).unwrap();
    assert_eq!(records.len(), 4);
    for (k, r) in records.iter().enumerate() {
        assert_eq!(r.fold.fold_index, k);
        assert_eq!(r.fold.test_width(), width);
        assert!(r.fold.test_start >= r.fold.train_end + 48);
        assert!(r.counts.tp + r.counts.fp <= width);
        assert!(r.counts.tp + r.counts.fn_ <= width);
        assert!(r.counts.tp + r.counts.fn_ > 0, "fold {k} has no events");
    }
    assert_eq!(records[3].fold.test_end, 9952);
}

#[test]
fn weekly_folds_fit_after_training_window() {
    let (x, y) = frames();
    let data = EvaluationData {
        x: &x,
        y: &y,
        crowd: None,
    };
    let dir = tempfile::tempdir().unwrap();
    let log = MetricLog::new(dir.path().join("ET.jsonl"));

    // width 500: tests at 8048, 8548, 9048; a fourth would end past 10000
    let records = evaluate(data, "ET-10-sqrt-2", false, &config(20), Some(&log)).unwrap();
    assert_eq!(records.len(), 3);

    let width = ROWS / 20;
    let mut previous_end = 0;
    for (k, r) in records.iter().enumerate() {
        assert_eq!(r.fold.fold_index, k);
        assert_eq!(r.fold.test_width(), width);
        assert_eq!(r.fold.train_end - r.fold.train_start, 8000);
        assert!(r.fold.test_start >= r.fold.train_end + 48);
        assert!(r.fold.test_start >= previous_end);
        previous_end = r.fold.test_end;
        assert!(r.counts.tp + r.counts.fp <= width);
        assert!(r.counts.tp + r.counts.fn_ <= width);
        // The informative feature separates events cleanly.
        assert!(r.scores.recall > 0.5, "fold {k}: {:?}", r.scores);
    }

    let logged = read_log_dir(dir.path()).unwrap();
    assert_eq!(logged.records, records);
    let summary = aggregate(&logged.records, "ET");
    assert_eq!(summary.count, 3);
}

#[test]
fn unknown_method_produces_no_records() {
    let (x, y) = frames();
    let data = EvaluationData {
        x: &x,
        y: &y,
        crowd: None,
    };
    let dir = tempfile::tempdir().unwrap();
    let log = MetricLog::new(dir.path().join("XYZ.jsonl"));
    let err = evaluate(data, "XYZ", false, &config(20), Some(&log)).unwrap_err();
    assert!(err.is_configuration());
    assert!(!log.path().exists());
}

#[test]
fn parallel_and_sequential_folds_agree() {
    let (x, y) = frames();
    let data = EvaluationData {
        x: &x,
        y: &y,
        crowd: None,
    };
    let sequential = WalkForwardConfig {
        parallelism: Parallelism::sequential(),
        ..config(20)
    };
    let a = evaluate(data, "RF-5-sqrt-8", false, &sequential, None).unwrap();
    let b = evaluate(data, "RF-5-sqrt-8", false, &config(20), None).unwrap();
    assert_eq!(a, b);
}
