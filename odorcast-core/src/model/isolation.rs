//! Isolation forest used as a one-class classifier.
//!
//! Trained on rows of a single class (the inliers). At prediction time a
//! row whose anomaly score exceeds 0.5 is labelled `outlier_label`,
//! otherwise `inlier_label`.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{check_predict, check_training, Estimator, FitContext, FitReport, ModelError};
use crate::frame::Matrix;
use crate::parallel::map_indexed;
use crate::seed::SeedHierarchy;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Average path length of an unsuccessful BST search over `n` points.
fn average_path(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum INode {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ITree(Vec<INode>);

impl ITree {
    fn grow(x: &Matrix, rows: Vec<usize>, height_limit: usize, rng: &mut StdRng) -> Self {
        let mut nodes = Vec::new();
        Self::grow_node(x, &rows, 0, height_limit, rng, &mut nodes);
        ITree(nodes)
    }

    fn grow_node(
        x: &Matrix,
        rows: &[usize],
        depth: usize,
        height_limit: usize,
        rng: &mut StdRng,
        nodes: &mut Vec<INode>,
    ) -> usize {
        let id = nodes.len();
        nodes.push(INode::Leaf { size: rows.len() });
        if depth >= height_limit || rows.len() <= 1 {
            return id;
        }

        // Features with spread among these rows.
        let candidates: Vec<(usize, f64, f64)> = (0..x.cols())
            .filter_map(|f| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                    let v = x.get(r, f);
                    (lo.min(v), hi.max(v))
                });
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();
        if candidates.is_empty() {
            return id;
        }
        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = rng.gen_range(lo..hi);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.iter().partition(|&&r| x.get(r, feature) < threshold);

        let left = Self::grow_node(x, &left_rows, depth + 1, height_limit, rng, nodes);
        let right = Self::grow_node(x, &right_rows, depth + 1, height_limit, rng, nodes);
        nodes[id] = INode::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn path_length(&self, row: &[f64]) -> f64 {
        let mut id = 0;
        let mut depth = 0.0;
        loop {
            match &self.0[id] {
                INode::Leaf { size } => return depth + average_path(*size),
                INode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[*feature] < *threshold { *left } else { *right };
                    depth += 1.0;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    pub n_estimators: usize,
    pub max_samples: usize,
    pub inlier_label: f64,
    pub outlier_label: f64,
    seed: Option<u64>,
    sample_size: usize,
    trees: Vec<ITree>,
    n_features: Option<usize>,
}

impl IsolationForest {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            n_estimators,
            max_samples: 256,
            inlier_label: 1.0,
            outlier_label: 0.0,
            seed: None,
            sample_size: 0,
            trees: Vec::new(),
            n_features: None,
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_labels(mut self, inlier: f64, outlier: f64) -> Self {
        self.inlier_label = inlier;
        self.outlier_label = outlier;
        self
    }

    /// Anomaly score in (0, 1]; higher is more anomalous.
    pub fn score(&self, row: &[f64]) -> f64 {
        let mean_path = self.trees.iter().map(|t| t.path_length(row)).sum::<f64>()
            / self.trees.len().max(1) as f64;
        let norm = average_path(self.sample_size);
        if norm == 0.0 {
            return 0.5;
        }
        2f64.powf(-mean_path / norm)
    }
}

impl Estimator for IsolationForest {
    fn fit(
        &mut self,
        x: &Matrix,
        y: &Matrix,
        ctx: &FitContext<'_>,
    ) -> Result<FitReport, ModelError> {
        check_training(x, y)?;
        let n = x.rows();
        let sample_size = self.max_samples.clamp(1, n);
        let height_limit = (sample_size as f64).log2().ceil() as usize;
        let seeds = SeedHierarchy::from_option(self.seed);

        self.trees = map_indexed(self.n_estimators, ctx.threads, |i| {
            let mut rng = seeds.rng_for("itree", i as u64);
            let rows = sample(&mut rng, n, sample_size).into_vec();
            ITree::grow(x, rows, height_limit, &mut rng)
        })?;
        self.sample_size = sample_size;
        self.n_features = Some(x.cols());
        Ok(FitReport::default())
    }

    fn predict(&self, x: &Matrix) -> Result<Matrix, ModelError> {
        check_predict(self.n_features, x)?;
        if self.trees.is_empty() {
            return Err(ModelError::NotFitted);
        }
        Ok(Matrix::column_vector(
            (0..x.rows())
                .map(|r| {
                    if self.score(x.row(r)) > 0.5 {
                        self.outlier_label
                    } else {
                        self.inlier_label
                    }
                })
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Dense core at (0.5, 0.5) plus a sparse halo around it.
    fn cluster() -> Matrix {
        let rows: Vec<Vec<f64>> = (0..200)
            .map(|i| {
                if i < 100 {
                    vec![0.5, 0.5]
                } else {
                    let k = i - 100;
                    vec![(k % 10) as f64 * 0.1 + 0.05, (k / 10) as f64 * 0.1 + 0.05]
                }
            })
            .collect();
        Matrix::from_rows(&rows).unwrap()
    }

    #[test]
    fn average_path_known_values() {
        assert_eq!(average_path(1), 0.0);
        assert_eq!(average_path(2), 1.0);
        assert!((average_path(256) - 10.24).abs() < 0.05);
    }

    #[test]
    fn far_point_is_outlier() {
        let x = cluster();
        let y = Matrix::column_vector(vec![1.0; 200]);
        let mut m = IsolationForest::new(100).with_seed(Some(0)).with_labels(1.0, 0.0);
        m.fit(&x, &y, &FitContext::sequential()).unwrap();

        let probe = Matrix::from_rows(&[vec![0.5, 0.5], vec![50.0, -50.0]]).unwrap();
        assert!(m.score(probe.row(1)) > m.score(probe.row(0)));
        let pred = m.predict(&probe).unwrap();
        assert_eq!(pred.get(0, 0), 1.0);
        assert_eq!(pred.get(1, 0), 0.0);
    }

    #[test]
    fn seeded_fit_matches_across_threads() {
        let x = cluster();
        let y = Matrix::column_vector(vec![1.0; 200]);
        let mut a = IsolationForest::new(20).with_seed(Some(3));
        let mut b = a.clone();
        a.fit(&x, &y, &FitContext::sequential()).unwrap();
        b.fit(&x, &y, &FitContext::with_threads(4)).unwrap();
        assert_eq!(a.trees, b.trees);
    }
}
