//! Multilayer perceptron with ReLU hidden layers, trained by Adam.
//!
//! Regression uses an identity output with squared loss and accepts any
//! number of output columns. Classification uses a softmax output with
//! cross-entropy and a single label column. Inputs are standardised with
//! the training mean and deviation.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{
    check_predict, check_training, require_single_output, ClassIndex, Estimator, FitContext,
    FitReport, ModelError, Task,
};
use crate::frame::Matrix;
use crate::seed::SeedHierarchy;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Layer {
    n_in: usize,
    n_out: usize,
    /// `n_in × n_out`, row-major.
    weights: Vec<f64>,
    bias: Vec<f64>,
}

impl Layer {
    fn init(n_in: usize, n_out: usize, rng: &mut StdRng) -> Self {
        let bound = (6.0 / (n_in + n_out) as f64).sqrt();
        Self {
            n_in,
            n_out,
            weights: (0..n_in * n_out)
                .map(|_| rng.gen_range(-bound..bound))
                .collect(),
            bias: (0..n_out).map(|_| rng.gen_range(-bound..bound)).collect(),
        }
    }

    /// `input` is `rows × n_in`; returns `rows × n_out`.
    fn forward(&self, input: &[f64], rows: usize) -> Vec<f64> {
        let mut out = Vec::with_capacity(rows * self.n_out);
        for r in 0..rows {
            out.extend_from_slice(&self.bias);
            let row_out = &mut out[r * self.n_out..];
            for (i, v) in input[r * self.n_in..(r + 1) * self.n_in].iter().enumerate() {
                if *v == 0.0 {
                    continue;
                }
                let w = &self.weights[i * self.n_out..(i + 1) * self.n_out];
                for (o, wv) in row_out.iter_mut().zip(w) {
                    *o += v * wv;
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
struct Moments {
    m: Vec<f64>,
    v: Vec<f64>,
}

impl Moments {
    fn zeros(n: usize) -> Self {
        Self {
            m: vec![0.0; n],
            v: vec![0.0; n],
        }
    }

    fn step(&mut self, params: &mut [f64], grads: &[f64], lr_t: f64) {
        for ((p, g), (m, v)) in params
            .iter_mut()
            .zip(grads)
            .zip(self.m.iter_mut().zip(self.v.iter_mut()))
        {
            *m = BETA1 * *m + (1.0 - BETA1) * g;
            *v = BETA2 * *v + (1.0 - BETA2) * g * g;
            *p -= lr_t * *m / (v.sqrt() + ADAM_EPS);
        }
    }
}

fn relu(values: &mut [f64]) {
    values.iter_mut().for_each(|v| *v = v.max(0.0));
}

fn softmax_rows(values: &mut [f64], width: usize) {
    for row in values.chunks_mut(width) {
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut sum = 0.0;
        for v in row.iter_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }
        row.iter_mut().for_each(|v| *v /= sum);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mlp {
    pub task: Task,
    pub hidden: Vec<usize>,
    pub learning_rate: f64,
    pub max_epochs: usize,
    pub batch_size: usize,
    /// L2 penalty.
    pub alpha: f64,
    pub tol: f64,
    pub n_iter_no_change: usize,
    seed: Option<u64>,
    layers: Vec<Layer>,
    means: Vec<f64>,
    scales: Vec<f64>,
    classes: Option<ClassIndex>,
    n_features: Option<usize>,
}

impl Mlp {
    pub fn new(task: Task, hidden: Vec<usize>) -> Self {
        Self {
            task,
            hidden,
            learning_rate: 1e-3,
            max_epochs: 200,
            batch_size: 200,
            alpha: 1e-4,
            tol: 1e-4,
            n_iter_no_change: 10,
            seed: None,
            layers: Vec::new(),
            means: Vec::new(),
            scales: Vec::new(),
            classes: None,
            n_features: None,
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    fn standardise(&self, x: &Matrix) -> Vec<f64> {
        let mut out = x.as_slice().to_vec();
        for row in out.chunks_mut(x.cols()) {
            for ((v, m), s) in row.iter_mut().zip(&self.means).zip(&self.scales) {
                *v = (*v - m) / s;
            }
        }
        out
    }

    /// Activations of every layer; the first entry is the input.
    fn forward_all(&self, input: Vec<f64>, rows: usize) -> Vec<Vec<f64>> {
        let mut acts = Vec::with_capacity(self.layers.len() + 1);
        acts.push(input);
        for (l, layer) in self.layers.iter().enumerate() {
            let mut z = layer.forward(&acts[l], rows);
            if l + 1 < self.layers.len() {
                relu(&mut z);
            }
            acts.push(z);
        }
        acts
    }

    /// Output deltas (unnormalised) and summed loss for one batch.
    fn output_delta(&self, output: &mut [f64], targets: &[f64], width: usize) -> (Vec<f64>, f64) {
        match self.task {
            Task::Regression => {
                let delta: Vec<f64> = output.iter().zip(targets).map(|(p, t)| p - t).collect();
                let loss = delta.iter().map(|d| d * d).sum::<f64>() / 2.0;
                (delta, loss)
            }
            Task::Classification => {
                softmax_rows(output, width);
                let mut loss = 0.0;
                let delta = output
                    .iter()
                    .zip(targets)
                    .map(|(p, t)| {
                        if *t == 1.0 {
                            loss -= p.max(1e-15).ln();
                        }
                        p - t
                    })
                    .collect();
                (delta, loss)
            }
        }
    }
}

impl Estimator for Mlp {
    fn fit(
        &mut self,
        x: &Matrix,
        y: &Matrix,
        _ctx: &FitContext<'_>,
    ) -> Result<FitReport, ModelError> {
        check_training(x, y)?;
        let n = x.rows();
        let d = x.cols();
        let mut report = FitReport::default();

        // Target encoding: raw values or one-hot class rows.
        let (targets, width) = match self.task {
            Task::Regression => (y.as_slice().to_vec(), y.cols()),
            Task::Classification => {
                require_single_output("mlp_classifier", y)?;
                let classes = ClassIndex::from_labels(&y.column(0));
                let k = classes.len();
                let mut onehot = vec![0.0; n * k];
                for (r, label) in y.column(0).iter().enumerate() {
                    onehot[r * k + classes.index_of(*label)] = 1.0;
                }
                if k == 1 {
                    report.warn("only one class present in training labels; predicting it everywhere");
                }
                self.classes = Some(classes);
                (onehot, k)
            }
        };

        self.means = (0..d)
            .map(|j| (0..n).map(|i| x.get(i, j)).sum::<f64>() / n as f64)
            .collect();
        self.scales = (0..d)
            .map(|j| {
                let m = self.means[j];
                let var = (0..n).map(|i| (x.get(i, j) - m).powi(2)).sum::<f64>() / n as f64;
                if var > 0.0 {
                    var.sqrt()
                } else {
                    1.0
                }
            })
            .collect();
        self.n_features = Some(d);
        let inputs = self.standardise(x);

        let seeds = SeedHierarchy::from_option(self.seed);
        let mut init_rng = seeds.rng_for("mlp-init", 0);
        let mut sizes = vec![d];
        sizes.extend(&self.hidden);
        sizes.push(width);
        self.layers = sizes
            .windows(2)
            .map(|w| Layer::init(w[0], w[1], &mut init_rng))
            .collect();
        let mut moments: Vec<(Moments, Moments)> = self
            .layers
            .iter()
            .map(|l| (Moments::zeros(l.weights.len()), Moments::zeros(l.bias.len())))
            .collect();

        let mut shuffle_rng = seeds.rng_for("mlp-shuffle", 0);
        let batch_size = self.batch_size.clamp(1, n);
        let mut order: Vec<usize> = (0..n).collect();
        let mut best_loss = f64::INFINITY;
        let mut stale = 0;
        let mut step = 0i32;
        let mut converged = false;

        for _ in 0..self.max_epochs {
            order.shuffle(&mut shuffle_rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(batch_size) {
                let b = batch.len();
                let mut input = Vec::with_capacity(b * d);
                let mut target = Vec::with_capacity(b * width);
                for &r in batch {
                    input.extend_from_slice(&inputs[r * d..(r + 1) * d]);
                    target.extend_from_slice(&targets[r * width..(r + 1) * width]);
                }

                let mut acts = self.forward_all(input, b);
                let mut output = acts.pop().unwrap_or_default();
                let (mut delta, loss) = self.output_delta(&mut output, &target, width);
                let penalty: f64 = self
                    .layers
                    .iter()
                    .map(|l| l.weights.iter().map(|w| w * w).sum::<f64>())
                    .sum();
                epoch_loss += loss + 0.5 * self.alpha * penalty;

                step += 1;
                let lr_t = self.learning_rate * (1.0 - BETA2.powi(step)).sqrt()
                    / (1.0 - BETA1.powi(step));

                for l in (0..self.layers.len()).rev() {
                    let layer = &self.layers[l];
                    let input = &acts[l];
                    let (n_in, n_out) = (layer.n_in, layer.n_out);

                    let mut grad_w = vec![0.0; n_in * n_out];
                    let mut grad_b = vec![0.0; n_out];
                    for r in 0..b {
                        let dr = &delta[r * n_out..(r + 1) * n_out];
                        for (gb, dv) in grad_b.iter_mut().zip(dr) {
                            *gb += dv;
                        }
                        for i in 0..n_in {
                            let a = input[r * n_in + i];
                            if a == 0.0 {
                                continue;
                            }
                            for (g, dv) in grad_w[i * n_out..(i + 1) * n_out].iter_mut().zip(dr) {
                                *g += a * dv;
                            }
                        }
                    }
                    for (g, w) in grad_w.iter_mut().zip(&layer.weights) {
                        *g = (*g + self.alpha * w) / b as f64;
                    }
                    grad_b.iter_mut().for_each(|g| *g /= b as f64);

                    if l > 0 {
                        let mut prev = vec![0.0; b * n_in];
                        for r in 0..b {
                            let dr = &delta[r * n_out..(r + 1) * n_out];
                            for i in 0..n_in {
                                if input[r * n_in + i] <= 0.0 {
                                    continue;
                                }
                                let w = &layer.weights[i * n_out..(i + 1) * n_out];
                                prev[r * n_in + i] = dr.iter().zip(w).map(|(a, b)| a * b).sum();
                            }
                        }
                        delta = prev;
                    }

                    let (mw, mb) = &mut moments[l];
                    let layer = &mut self.layers[l];
                    mw.step(&mut layer.weights, &grad_w, lr_t);
                    mb.step(&mut layer.bias, &grad_b, lr_t);
                }
            }

            epoch_loss /= n as f64;
            if epoch_loss > best_loss - self.tol {
                stale += 1;
            } else {
                stale = 0;
            }
            best_loss = best_loss.min(epoch_loss);
            if stale > self.n_iter_no_change {
                converged = true;
                break;
            }
        }

        if !converged {
            report.warn(format!(
                "mlp did not converge within max_epochs={}",
                self.max_epochs
            ));
        }
        Ok(report)
    }

    fn predict(&self, x: &Matrix) -> Result<Matrix, ModelError> {
        check_predict(self.n_features, x)?;
        if self.layers.is_empty() {
            return Err(ModelError::NotFitted);
        }
        let rows = x.rows();
        let mut acts = self.forward_all(self.standardise(x), rows);
        let output = acts.pop().unwrap_or_default();
        let width = self.layers[self.layers.len() - 1].n_out;

        match self.task {
            Task::Regression => {
                Matrix::from_row_major(rows, width, output).ok_or(ModelError::NotFitted)
            }
            Task::Classification => {
                let classes = self.classes.as_ref().ok_or(ModelError::NotFitted)?;
                Ok(Matrix::column_vector(
                    output.chunks(width).map(|s| classes.argmax(s)).collect(),
                ))
            }
        }
    }

    fn supports_multi_output(&self) -> bool {
        self.task == Task::Regression
    }
}
