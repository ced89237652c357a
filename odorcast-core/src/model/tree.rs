//! CART decision trees (regression and classification, multi-output).
//!
//! Regression nodes minimise summed squared error across outputs,
//! classification nodes minimise summed Gini impurity. The `Best` splitter
//! scans every threshold of the sampled features; the `Random` splitter
//! draws one uniform threshold per feature (extremely randomized trees).

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{
    check_predict, check_training, ClassIndex, Estimator, FitContext, FitReport, ModelError, Task,
};
use crate::frame::Matrix;
use crate::seed::SeedHierarchy;

// ─── Hyperparameters ─────────────────────────────────────────────────

/// Number of features considered per split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum MaxFeatures {
    /// No limit: every feature.
    All,
    Count(usize),
    Sqrt,
    Log2,
    /// `Sqrt` for classification, `All` for regression.
    Auto,
}

impl MaxFeatures {
    /// Concrete feature count for a dataset, clamped to `1..=n_features`.
    pub fn resolve(&self, n_features: usize, task: Task) -> usize {
        let n = n_features.max(1);
        let k = match self {
            MaxFeatures::All => n,
            MaxFeatures::Count(c) => *c,
            MaxFeatures::Sqrt => (n as f64).sqrt() as usize,
            MaxFeatures::Log2 => (n as f64).log2() as usize,
            MaxFeatures::Auto => match task {
                Task::Classification => (n as f64).sqrt() as usize,
                Task::Regression => n,
            },
        };
        k.clamp(1, n)
    }
}

/// Threshold search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Splitter {
    Best,
    Random,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub splitter: Splitter,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            splitter: Splitter::Best,
        }
    }
}

/// Resolve `max_features`, noting when an explicit count had to be clamped.
pub(crate) fn resolve_max_features(
    max_features: &MaxFeatures,
    n_features: usize,
    task: Task,
    report: &mut FitReport,
) -> usize {
    let k = max_features.resolve(n_features, task);
    if let MaxFeatures::Count(requested) = max_features {
        if *requested > n_features {
            report.warn(format!(
                "max_features={requested} exceeds the {n_features} available features; using {k}"
            ));
        }
    }
    k
}

// ─── Targets and node statistics ─────────────────────────────────────

/// Training targets in the layout split search needs.
pub(crate) enum Targets {
    Values {
        data: Vec<f64>,
        outputs: usize,
    },
    Classes {
        codes: Vec<usize>,
        n_classes: Vec<usize>,
        offsets: Vec<usize>,
    },
}

impl Targets {
    /// Encode `y`; for classification also return the class index per output.
    pub(crate) fn encode(task: Task, y: &Matrix) -> (Self, Vec<ClassIndex>) {
        match task {
            Task::Regression => (
                Targets::Values {
                    data: y.as_slice().to_vec(),
                    outputs: y.cols(),
                },
                Vec::new(),
            ),
            Task::Classification => {
                let classes: Vec<ClassIndex> = (0..y.cols())
                    .map(|c| ClassIndex::from_labels(&y.column(c)))
                    .collect();
                let mut codes = Vec::with_capacity(y.rows() * y.cols());
                for r in 0..y.rows() {
                    for (c, index) in classes.iter().enumerate() {
                        codes.push(index.index_of(y.get(r, c)));
                    }
                }
                let n_classes: Vec<usize> = classes.iter().map(ClassIndex::len).collect();
                let offsets = class_offsets(&n_classes);
                (
                    Targets::Classes {
                        codes,
                        n_classes,
                        offsets,
                    },
                    classes,
                )
            }
        }
    }

    fn stats_len(&self) -> usize {
        match self {
            Targets::Values { outputs, .. } => 2 * outputs,
            Targets::Classes { n_classes, .. } => n_classes.iter().sum(),
        }
    }

    fn empty_stats(&self) -> Stats {
        Stats {
            n: 0.0,
            acc: vec![0.0; self.stats_len()],
        }
    }

    fn stats_for(&self, indices: &[usize]) -> Stats {
        let mut stats = self.empty_stats();
        for &i in indices {
            self.accumulate(&mut stats, i, 1.0);
        }
        stats
    }

    /// Add (`w = 1`) or remove (`w = -1`) sample `i`.
    fn accumulate(&self, stats: &mut Stats, i: usize, w: f64) {
        stats.n += w;
        match self {
            Targets::Values { data, outputs } => {
                for o in 0..*outputs {
                    let v = data[i * outputs + o];
                    stats.acc[o] += w * v;
                    stats.acc[outputs + o] += w * v * v;
                }
            }
            Targets::Classes {
                codes,
                n_classes,
                offsets,
            } => {
                let k = n_classes.len();
                for o in 0..k {
                    stats.acc[offsets[o] + codes[i * k + o]] += w;
                }
            }
        }
    }

    /// Node size times impurity, summed over outputs.
    fn impurity(&self, stats: &Stats) -> f64 {
        if stats.n <= 0.0 {
            return 0.0;
        }
        match self {
            Targets::Values { outputs, .. } => (0..*outputs)
                .map(|o| {
                    let sum = stats.acc[o];
                    (stats.acc[outputs + o] - sum * sum / stats.n).max(0.0)
                })
                .sum(),
            Targets::Classes {
                n_classes, offsets, ..
            } => n_classes
                .iter()
                .zip(offsets)
                .map(|(&k, &off)| {
                    let sq: f64 = stats.acc[off..off + k].iter().map(|c| c * c).sum();
                    stats.n - sq / stats.n
                })
                .sum(),
        }
    }

    /// Leaf payload: per-output means, or concatenated class probabilities.
    fn leaf(&self, stats: &Stats) -> Vec<f64> {
        let n = stats.n.max(1.0);
        match self {
            Targets::Values { outputs, .. } => stats.acc[..*outputs].iter().map(|s| s / n).collect(),
            Targets::Classes { .. } => stats.acc.iter().map(|c| c / n).collect(),
        }
    }
}

pub(crate) fn class_offsets(n_classes: &[usize]) -> Vec<usize> {
    n_classes
        .iter()
        .scan(0, |acc, &k| {
            let off = *acc;
            *acc += k;
            Some(off)
        })
        .collect()
}

#[derive(Debug, Clone)]
struct Stats {
    n: f64,
    acc: Vec<f64>,
}

// ─── Nodes ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum Node {
    Leaf {
        value: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Flat node arena; node 0 is the root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Nodes(Vec<Node>);

impl Nodes {
    pub(crate) fn leaf_value(&self, row: &[f64]) -> &[f64] {
        let mut id = 0;
        loop {
            match &self.0[id] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    pub(crate) fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match &nodes[id] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.0.is_empty() {
            0
        } else {
            walk(&self.0, 0)
        }
    }
}

/// Turn a (possibly averaged) leaf payload into one prediction per output.
pub(crate) fn decode_leaf(task: Task, classes: &[ClassIndex], leaf: &[f64]) -> Vec<f64> {
    match task {
        Task::Regression => leaf.to_vec(),
        Task::Classification => {
            let mut off = 0;
            classes
                .iter()
                .map(|index| {
                    let label = index.argmax(&leaf[off..off + index.len()]);
                    off += index.len();
                    label
                })
                .collect()
        }
    }
}

// ─── Growing ─────────────────────────────────────────────────────────

struct Candidate {
    feature: usize,
    threshold: f64,
    score: f64,
}

/// Grow one tree on the rows in `indices` (duplicates allowed, for
/// bootstrap samples).
pub(crate) fn grow(
    x: &Matrix,
    targets: &Targets,
    indices: Vec<usize>,
    params: &TreeParams,
    n_try: usize,
    rng: &mut StdRng,
) -> Nodes {
    let placeholder = || Node::Leaf { value: Vec::new() };
    let min_split = params.min_samples_split.max(2);
    let min_leaf = params.min_samples_leaf.max(1);

    let mut nodes = vec![placeholder()];
    let mut stack = vec![(0usize, indices, 0usize)];

    while let Some((id, idx, depth)) = stack.pop() {
        let stats = targets.stats_for(&idx);
        let impure = targets.impurity(&stats) > 1e-10 * stats.n.max(1.0);
        let splittable = impure
            && idx.len() >= min_split
            && idx.len() >= 2 * min_leaf
            && params.max_depth.map_or(true, |d| depth < d);

        let split = if splittable {
            find_split(x, targets, &idx, &stats, params, n_try, min_leaf, rng)
        } else {
            None
        };

        match split {
            None => nodes[id] = Node::Leaf {
                value: targets.leaf(&stats),
            },
            Some(c) => {
                let (left, right): (Vec<usize>, Vec<usize>) = idx
                    .iter()
                    .partition(|&&i| x.get(i, c.feature) <= c.threshold);
                let l = nodes.len();
                nodes.push(placeholder());
                let r = nodes.len();
                nodes.push(placeholder());
                nodes[id] = Node::Split {
                    feature: c.feature,
                    threshold: c.threshold,
                    left: l,
                    right: r,
                };
                stack.push((r, right, depth + 1));
                stack.push((l, left, depth + 1));
            }
        }
    }

    Nodes(nodes)
}

#[allow(clippy::too_many_arguments)]
fn find_split(
    x: &Matrix,
    targets: &Targets,
    idx: &[usize],
    stats: &Stats,
    params: &TreeParams,
    n_try: usize,
    min_leaf: usize,
    rng: &mut StdRng,
) -> Option<Candidate> {
    let features = sample(rng, x.cols(), n_try.min(x.cols())).into_vec();
    let mut best: Option<Candidate> = None;
    for feature in features {
        let candidate = match params.splitter {
            Splitter::Best => best_threshold(x, targets, idx, stats, feature, min_leaf),
            Splitter::Random => random_threshold(x, targets, idx, feature, min_leaf, rng),
        };
        if let Some(c) = candidate {
            if best.as_ref().map_or(true, |b| c.score < b.score) {
                best = Some(c);
            }
        }
    }
    best
}

fn best_threshold(
    x: &Matrix,
    targets: &Targets,
    idx: &[usize],
    stats: &Stats,
    feature: usize,
    min_leaf: usize,
) -> Option<Candidate> {
    let mut order: Vec<(f64, usize)> = idx.iter().map(|&i| (x.get(i, feature), i)).collect();
    order.sort_by(|a, b| a.0.total_cmp(&b.0));
    if order.first()?.0 >= order.last()?.0 {
        return None;
    }

    let mut left = targets.empty_stats();
    let mut right = stats.clone();
    let mut best: Option<(f64, f64)> = None;

    for pos in 0..order.len() - 1 {
        let (value, i) = order[pos];
        targets.accumulate(&mut left, i, 1.0);
        targets.accumulate(&mut right, i, -1.0);

        let next = order[pos + 1].0;
        if next <= value {
            continue;
        }
        let n_left = pos + 1;
        let n_right = order.len() - n_left;
        if n_left < min_leaf || n_right < min_leaf {
            continue;
        }
        let score = targets.impurity(&left) + targets.impurity(&right);
        if best.map_or(true, |(s, _)| score < s) {
            let mut threshold = value + (next - value) / 2.0;
            if threshold >= next {
                threshold = value;
            }
            best = Some((score, threshold));
        }
    }

    best.map(|(score, threshold)| Candidate {
        feature,
        threshold,
        score,
    })
}

fn random_threshold(
    x: &Matrix,
    targets: &Targets,
    idx: &[usize],
    feature: usize,
    min_leaf: usize,
    rng: &mut StdRng,
) -> Option<Candidate> {
    let (lo, hi) = idx.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
        let v = x.get(i, feature);
        (lo.min(v), hi.max(v))
    });
    if hi <= lo {
        return None;
    }
    let threshold = rng.gen_range(lo..hi);

    let mut left = targets.empty_stats();
    let mut right = targets.empty_stats();
    for &i in idx {
        if x.get(i, feature) <= threshold {
            targets.accumulate(&mut left, i, 1.0);
        } else {
            targets.accumulate(&mut right, i, 1.0);
        }
    }
    if left.n < min_leaf as f64 || right.n < min_leaf as f64 {
        return None;
    }
    Some(Candidate {
        feature,
        threshold,
        score: targets.impurity(&left) + targets.impurity(&right),
    })
}

// ─── Estimator ───────────────────────────────────────────────────────

/// A single CART tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    task: Task,
    params: TreeParams,
    seed: Option<u64>,
    n_features: Option<usize>,
    classes: Vec<ClassIndex>,
    nodes: Nodes,
}

impl DecisionTree {
    pub fn new(task: Task, params: TreeParams) -> Self {
        Self {
            task,
            params,
            seed: None,
            n_features: None,
            classes: Vec::new(),
            nodes: Nodes::default(),
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        self.nodes.depth()
    }
}

impl Estimator for DecisionTree {
    fn fit(
        &mut self,
        x: &Matrix,
        y: &Matrix,
        _ctx: &FitContext<'_>,
    ) -> Result<FitReport, ModelError> {
        check_training(x, y)?;
        let mut report = FitReport::default();
        let n_try = resolve_max_features(&self.params.max_features, x.cols(), self.task, &mut report);
        let (targets, classes) = Targets::encode(self.task, y);
        let mut rng = SeedHierarchy::from_option(self.seed).rng_for("tree", 0);

        self.nodes = grow(x, &targets, (0..x.rows()).collect(), &self.params, n_try, &mut rng);
        self.classes = classes;
        self.n_features = Some(x.cols());
        Ok(report)
    }

    fn predict(&self, x: &Matrix) -> Result<Matrix, ModelError> {
        check_predict(self.n_features, x)?;
        let rows: Vec<Vec<f64>> = (0..x.rows())
            .map(|r| decode_leaf(self.task, &self.classes, self.nodes.leaf_value(x.row(r))))
            .collect();
        Ok(rows_to_matrix(&rows, x.rows()))
    }

    fn supports_multi_output(&self) -> bool {
        true
    }
}

/// Stack prediction rows; an empty input yields a 0×0 matrix.
pub(crate) fn rows_to_matrix(rows: &[Vec<f64>], n: usize) -> Matrix {
    Matrix::from_rows(rows).unwrap_or_else(|| Matrix::zeros(n, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Matrix, Matrix) {
        let x = Matrix::from_rows(&(0..20).map(|i| vec![i as f64, (i % 3) as f64]).collect::<Vec<_>>())
            .unwrap();
        let y = Matrix::column_vector((0..20).map(|i| if i < 10 { 0.0 } else { 1.0 }).collect());
        (x, y)
    }

    #[test]
    fn max_features_resolution() {
        assert_eq!(MaxFeatures::All.resolve(16, Task::Regression), 16);
        assert_eq!(MaxFeatures::Sqrt.resolve(16, Task::Regression), 4);
        assert_eq!(MaxFeatures::Log2.resolve(16, Task::Regression), 4);
        assert_eq!(MaxFeatures::Auto.resolve(16, Task::Classification), 4);
        assert_eq!(MaxFeatures::Auto.resolve(16, Task::Regression), 16);
        assert_eq!(MaxFeatures::Count(90).resolve(16, Task::Regression), 16);
        assert_eq!(MaxFeatures::Count(0).resolve(16, Task::Regression), 1);
    }

    #[test]
    fn clamped_count_is_reported() {
        let mut report = FitReport::default();
        let k = resolve_max_features(&MaxFeatures::Count(90), 5, Task::Regression, &mut report);
        assert_eq!(k, 5);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn classifier_learns_step() {
        let (x, y) = step_data();
        let mut tree = DecisionTree::new(Task::Classification, TreeParams::default()).with_seed(Some(0));
        tree.fit(&x, &y, &FitContext::sequential()).unwrap();
        let pred = tree.predict(&x).unwrap();
        assert_eq!(pred.as_slice(), y.as_slice());
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn regressor_fits_means() {
        let x = Matrix::column_vector(vec![0.0, 1.0, 2.0, 3.0]);
        let y = Matrix::column_vector(vec![1.0, 1.0, 5.0, 5.0]);
        let mut tree = DecisionTree::new(Task::Regression, TreeParams::default()).with_seed(Some(1));
        tree.fit(&x, &y, &FitContext::sequential()).unwrap();
        let pred = tree.predict(&Matrix::column_vector(vec![0.5, 2.5])).unwrap();
        assert_eq!(pred.as_slice(), &[1.0, 5.0]);
    }

    #[test]
    fn max_depth_and_min_leaf_are_respected() {
        let (x, _) = step_data();
        let y = Matrix::column_vector((0..20).map(|i| (i % 4) as f64).collect());
        let params = TreeParams {
            max_depth: Some(2),
            min_samples_leaf: 5,
            ..TreeParams::default()
        };
        let mut tree = DecisionTree::new(Task::Classification, params).with_seed(Some(3));
        tree.fit(&x, &y, &FitContext::sequential()).unwrap();
        assert!(tree.depth() <= 2);
    }

    #[test]
    fn random_splitter_separates_clean_step() {
        let (x, y) = step_data();
        let params = TreeParams {
            splitter: Splitter::Random,
            ..TreeParams::default()
        };
        let mut tree = DecisionTree::new(Task::Classification, params).with_seed(Some(5));
        tree.fit(&x, &y, &FitContext::sequential()).unwrap();
        let pred = tree.predict(&x).unwrap();
        assert_eq!(pred.as_slice(), y.as_slice());
    }

    #[test]
    fn multi_output_regression() {
        let x = Matrix::column_vector(vec![0.0, 1.0, 2.0, 3.0]);
        let y = Matrix::from_rows(&[
            vec![0.0, 10.0],
            vec![0.0, 10.0],
            vec![1.0, 20.0],
            vec![1.0, 20.0],
        ])
        .unwrap();
        let mut tree = DecisionTree::new(Task::Regression, TreeParams::default()).with_seed(Some(0));
        tree.fit(&x, &y, &FitContext::sequential()).unwrap();
        let pred = tree.predict(&x).unwrap();
        assert_eq!(pred.row(3), &[1.0, 20.0]);
    }

    #[test]
    fn predict_before_fit_fails() {
        let tree = DecisionTree::new(Task::Regression, TreeParams::default());
        assert!(matches!(
            tree.predict(&Matrix::column_vector(vec![1.0])),
            Err(ModelError::NotFitted)
        ));
    }
}
