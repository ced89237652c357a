//! Brute-force k-nearest neighbours with uniform weights.

use serde::{Deserialize, Serialize};

use super::{check_predict, check_training, ClassIndex, Estimator, FitContext, FitReport, ModelError, Task};
use crate::frame::Matrix;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNeighbors {
    pub task: Task,
    pub k: usize,
    train_x: Option<Matrix>,
    train_y: Option<Matrix>,
    classes: Vec<ClassIndex>,
}

impl KNeighbors {
    pub fn new(task: Task, k: usize) -> Self {
        Self {
            task,
            k,
            train_x: None,
            train_y: None,
            classes: Vec::new(),
        }
    }

    /// Indices of the `k` nearest training rows; distance ties keep the
    /// earlier row.
    fn neighbours(&self, train: &Matrix, row: &[f64]) -> Vec<usize> {
        let mut dist: Vec<(f64, usize)> = (0..train.rows())
            .map(|i| {
                let d = train
                    .row(i)
                    .iter()
                    .zip(row)
                    .map(|(a, b)| (a - b).powi(2))
                    .sum::<f64>();
                (d, i)
            })
            .collect();
        let k = self.k.clamp(1, dist.len());
        if k < dist.len() {
            dist.select_nth_unstable_by(k - 1, |a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            dist.truncate(k);
        }
        dist.into_iter().map(|(_, i)| i).collect()
    }
}

impl Estimator for KNeighbors {
    fn fit(
        &mut self,
        x: &Matrix,
        y: &Matrix,
        _ctx: &FitContext<'_>,
    ) -> Result<FitReport, ModelError> {
        check_training(x, y)?;
        let mut report = FitReport::default();
        if self.k > x.rows() {
            report.warn(format!(
                "k={} exceeds {} training rows; using all rows",
                self.k,
                x.rows()
            ));
        }
        self.classes = match self.task {
            Task::Classification => (0..y.cols())
                .map(|c| ClassIndex::from_labels(&y.column(c)))
                .collect(),
            Task::Regression => Vec::new(),
        };
        self.train_x = Some(x.clone());
        self.train_y = Some(y.clone());
        Ok(report)
    }

    fn predict(&self, x: &Matrix) -> Result<Matrix, ModelError> {
        let train_x = self.train_x.as_ref().ok_or(ModelError::NotFitted)?;
        let train_y = self.train_y.as_ref().ok_or(ModelError::NotFitted)?;
        check_predict(Some(train_x.cols()), x)?;

        let outputs = train_y.cols();
        let mut out = Matrix::zeros(x.rows(), outputs);
        for r in 0..x.rows() {
            let nearest = self.neighbours(train_x, x.row(r));
            for c in 0..outputs {
                let value = match self.task {
                    Task::Regression => {
                        nearest.iter().map(|&i| train_y.get(i, c)).sum::<f64>()
                            / nearest.len() as f64
                    }
                    Task::Classification => {
                        let classes = &self.classes[c];
                        let mut votes = vec![0.0; classes.len()];
                        for &i in &nearest {
                            votes[classes.index_of(train_y.get(i, c))] += 1.0;
                        }
                        classes.argmax(&votes)
                    }
                };
                out.set(r, c, value);
            }
        }
        Ok(out)
    }

    fn supports_multi_output(&self) -> bool {
        true
    }
}
