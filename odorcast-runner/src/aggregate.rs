//! Reduce per-fold metric records to per-family summary statistics.

use serde::{Deserialize, Serialize};

use crate::metric_log::MetricRecord;
use crate::stats::Describe;

/// Count plus descriptive statistics of each fold metric.
///
/// Statistics are `None` when no record matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub count: usize,
    #[serde(rename = "TP")]
    pub tp: Option<Describe>,
    #[serde(rename = "FP")]
    pub fp: Option<Describe>,
    #[serde(rename = "FN")]
    pub fn_: Option<Describe>,
    pub precision: Option<Describe>,
    pub recall: Option<Describe>,
    pub fscore: Option<Describe>,
}

impl MetricSummary {
    pub fn of<'a>(records: impl IntoIterator<Item = &'a MetricRecord>) -> Self {
        let records: Vec<&MetricRecord> = records.into_iter().collect();
        let describe = |f: fn(&MetricRecord) -> f64| {
            Describe::of(&records.iter().map(|r| f(r)).collect::<Vec<_>>())
        };
        Self {
            count: records.len(),
            tp: describe(|r| r.counts.tp as f64),
            fp: describe(|r| r.counts.fp as f64),
            fn_: describe(|r| r.counts.fn_ as f64),
            precision: describe(|r| r.scores.precision),
            recall: describe(|r| r.scores.recall),
            fscore: describe(|r| r.scores.fscore),
        }
    }

    /// Metric name and its statistics, in display order.
    pub fn metrics(&self) -> [(&'static str, Option<&Describe>); 6] {
        [
            ("TP", self.tp.as_ref()),
            ("FP", self.fp.as_ref()),
            ("FN", self.fn_.as_ref()),
            ("precision", self.precision.as_ref()),
            ("recall", self.recall.as_ref()),
            ("fscore", self.fscore.as_ref()),
        ]
    }
}

/// Summarise the records whose method tag contains `method_filter`.
pub fn aggregate(records: &[MetricRecord], method_filter: &str) -> MetricSummary {
    MetricSummary::of(records.iter().filter(|r| r.method.contains(method_filter)))
}

/// Records assigned to one family.
#[derive(Debug, Clone, PartialEq)]
pub struct FamilyGroup<'a> {
    pub family: String,
    pub records: Vec<&'a MetricRecord>,
}

impl FamilyGroup<'_> {
    pub fn summary(&self) -> MetricSummary {
        MetricSummary::of(self.records.iter().copied())
    }
}

/// Partition records by the first family name their method tag contains.
///
/// Groups come back in `families` order, including empty ones; records
/// matching no family are left out.
pub fn group_by_family<'a>(records: &'a [MetricRecord], families: &[&str]) -> Vec<FamilyGroup<'a>> {
    let mut groups: Vec<FamilyGroup<'a>> = families
        .iter()
        .map(|f| FamilyGroup {
            family: f.to_string(),
            records: Vec::new(),
        })
        .collect();
    for record in records {
        if let Some(i) = families.iter().position(|f| record.method.contains(f)) {
            groups[i].records.push(record);
        }
    }
    groups
}
