//! Report export: correlation tables as CSV and metric summaries as
//! Markdown.

use std::fmt::Write as _;
use std::path::Path;

use crate::aggregate::MetricSummary;
use crate::correlation::{CorrelationMatrix, CorrelationTable};

// ─── CSV export ─────────────────────────────────────────────────────

/// Write `table` with one row per lag and one column per predictor.
///
/// Cells hold `(r, p, n)` rounded for display.
pub fn write_correlation_csv(path: &Path, table: &CorrelationTable) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(std::iter::once("lag").chain(table.predictors.iter().map(String::as_str)))?;
    for lag in 0..=table.max_lag {
        let mut row = vec![lag.to_string()];
        row.extend(table.cells.iter().map(|cells| cells[lag].display()));
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the predictor-by-predictor matrix, coefficients only.
pub fn write_matrix_csv(path: &Path, matrix: &CorrelationMatrix) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(std::iter::once("").chain(matrix.names.iter().map(String::as_str)))?;
    for (name, cells) in matrix.names.iter().zip(&matrix.cells) {
        let mut row = vec![name.clone()];
        row.extend(cells.iter().map(|c| {
            c.rounded()
                .map_or_else(|| "undefined".to_string(), |(r, _)| format!("{r:.3}"))
        }));
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

// ─── Markdown reports ───────────────────────────────────────────────

/// One Markdown table per summary: rows are metrics, columns the
/// descriptive statistics.
pub fn render_summaries(summaries: &[(String, MetricSummary)]) -> String {
    let mut out = String::new();
    for (family, summary) in summaries {
        let _ = writeln!(out, "## {family} ({} records)\n", summary.count);
        if summary.count == 0 {
            out.push_str("No matching records.\n\n");
            continue;
        }
        out.push_str("| metric | mean | std | min | 25% | median | 75% | max |\n");
        out.push_str("|---|---|---|---|---|---|---|---|\n");
        for (name, stats) in summary.metrics() {
            let Some(d) = stats else { continue };
            let std = d.std.map_or_else(|| "-".to_string(), |s| format!("{s:.3}"));
            let _ = writeln!(
                out,
                "| {name} | {:.3} | {std} | {:.3} | {:.3} | {:.3} | {:.3} | {:.3} |",
                d.mean, d.min, d.q25, d.median, d.q75, d.max
            );
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::{CorrelationCell, CorrelationKind};
    use crate::stats::{Degenerate, Describe};

    fn table() -> CorrelationTable {
        CorrelationTable {
            response: "smell".into(),
            kind: CorrelationKind::PointBiserial,
            max_lag: 1,
            predictors: vec!["H2S".into(), "flat".into()],
            cells: vec![
                vec![
                    CorrelationCell::Defined {
                        coefficient: 0.41234,
                        p_value: 0.000012,
                        sample_count: 100,
                    },
                    CorrelationCell::Defined {
                        coefficient: -0.2,
                        p_value: 0.04,
                        sample_count: 99,
                    },
                ],
                vec![
                    CorrelationCell::Undefined {
                        reason: Degenerate::ZeroVariance,
                        sample_count: 100,
                    },
                    CorrelationCell::Undefined {
                        reason: Degenerate::ZeroVariance,
                        sample_count: 99,
                    },
                ],
            ],
        }
    }

    #[test]
    fn correlation_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corr.csv");
        write_correlation_csv(&path, &table()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "lag,H2S,flat");
        assert_eq!(
            lines[1],
            r#"0,"(0.412, 0.00001, 100)","(undefined, undefined, 100)""#
        );
        assert!(lines[2].starts_with(r#"1,"(-0.200, 0.04000, 99)""#));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn summaries_render_as_markdown() {
        let d = Describe::of(&[1.0, 3.0]).unwrap();
        let summary = MetricSummary {
            count: 2,
            tp: Some(d.clone()),
            fp: Some(d.clone()),
            fn_: Some(d.clone()),
            precision: Some(d.clone()),
            recall: Some(d.clone()),
            fscore: Some(d),
        };
        let empty = MetricSummary {
            count: 0,
            tp: None,
            fp: None,
            fn_: None,
            precision: None,
            recall: None,
            fscore: None,
        };
        let md = render_summaries(&[("ET".into(), summary), ("RF".into(), empty)]);
        assert!(md.contains("## ET (2 records)"));
        assert!(md.contains("| fscore | 2.000 | 1.414 | 1.000 | 1.500 | 2.000 | 2.500 | 3.000 |"));
        assert!(md.contains("## RF (0 records)"));
        assert!(md.contains("No matching records."));
    }
}
