//! Tree ensembles: random forests and extremely randomized trees.
//!
//! Random forests grow best-split trees on bootstrap samples; extra trees
//! grow random-split trees on the full training set. Tree `i` draws its RNG
//! from `SeedHierarchy::rng_for("tree", i)`, so a seeded forest is identical
//! whether grown inline or on a pool.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::tree::{decode_leaf, grow, resolve_max_features, rows_to_matrix, Nodes, Targets};
use super::{
    check_predict, check_training, ClassIndex, Estimator, FitContext, FitReport, ModelError, Task,
    TreeParams,
};
use crate::frame::Matrix;
use crate::parallel::map_indexed;
use crate::seed::SeedHierarchy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForestKind {
    RandomForest,
    ExtraTrees,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forest {
    kind: ForestKind,
    task: Task,
    n_estimators: usize,
    params: TreeParams,
    seed: Option<u64>,
    n_features: Option<usize>,
    classes: Vec<ClassIndex>,
    trees: Vec<Nodes>,
}

impl Forest {
    /// `params.splitter` is overridden by `kind`.
    pub fn new(kind: ForestKind, task: Task, n_estimators: usize, mut params: TreeParams) -> Self {
        params.splitter = match kind {
            ForestKind::RandomForest => super::Splitter::Best,
            ForestKind::ExtraTrees => super::Splitter::Random,
        };
        Self {
            kind,
            task,
            n_estimators,
            params,
            seed: None,
            n_features: None,
            classes: Vec::new(),
            trees: Vec::new(),
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn kind(&self) -> ForestKind {
        self.kind
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn n_estimators(&self) -> usize {
        self.n_estimators
    }

    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Averaged leaf payload across all trees for one row.
    pub(crate) fn mean_leaf(&self, row: &[f64]) -> Vec<f64> {
        let mut acc: Vec<f64> = Vec::new();
        for tree in &self.trees {
            let leaf = tree.leaf_value(row);
            if acc.is_empty() {
                acc = leaf.to_vec();
            } else {
                for (a, v) in acc.iter_mut().zip(leaf) {
                    *a += v;
                }
            }
        }
        let n = self.trees.len().max(1) as f64;
        acc.iter_mut().for_each(|a| *a /= n);
        acc
    }
}

impl Estimator for Forest {
    fn fit(
        &mut self,
        x: &Matrix,
        y: &Matrix,
        ctx: &FitContext<'_>,
    ) -> Result<FitReport, ModelError> {
        check_training(x, y)?;
        let mut report = FitReport::default();
        let n_try = resolve_max_features(&self.params.max_features, x.cols(), self.task, &mut report);
        let (targets, classes) = Targets::encode(self.task, y);
        let seeds = SeedHierarchy::from_option(self.seed);
        let n = x.rows();
        let kind = self.kind;
        let params = &self.params;

        let trees = map_indexed(self.n_estimators, ctx.threads, |i| {
            let mut rng = seeds.rng_for("tree", i as u64);
            let indices: Vec<usize> = match kind {
                ForestKind::RandomForest => (0..n).map(|_| rng.gen_range(0..n)).collect(),
                ForestKind::ExtraTrees => (0..n).collect(),
            };
            grow(x, &targets, indices, params, n_try, &mut rng)
        })?;

        self.trees = trees;
        self.classes = classes;
        self.n_features = Some(x.cols());
        Ok(report)
    }

    fn predict(&self, x: &Matrix) -> Result<Matrix, ModelError> {
        check_predict(self.n_features, x)?;
        if self.trees.is_empty() {
            return Err(ModelError::NotFitted);
        }
        let rows: Vec<Vec<f64>> = (0..x.rows())
            .map(|r| decode_leaf(self.task, &self.classes, &self.mean_leaf(x.row(r))))
            .collect();
        Ok(rows_to_matrix(&rows, x.rows()))
    }

    fn supports_multi_output(&self) -> bool {
        true
    }
}
