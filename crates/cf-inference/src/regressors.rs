//! Small in-crate regressors.
//!
//! The dummy-outcome refuter fits an outcome model `f(W)` on one stratum of
//! the data and applies it everywhere else. These learners are deliberately
//! modest: the refuter only needs a reasonable conditional-mean fit, not a
//! production model zoo. All take row-major feature matrices.

use cf_core::{Error, Result};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Which learner to fit for the dummy-outcome transformation.
#[derive(Debug, Clone, PartialEq)]
pub enum RegressorKind {
    /// Ordinary least squares with intercept.
    Linear,
    /// k-nearest-neighbour mean.
    Knn {
        /// Neighbour count.
        k: usize,
    },
    /// Support-vector-style smooth fit (RBF-kernel ridge regression).
    Svr,
    /// Bagged depth-limited regression trees.
    RandomForest,
    /// One-hidden-layer tanh network trained by full-batch gradient descent.
    NeuralNetwork,
}

/// A fitted regressor.
pub trait Regressor: Send + Sync {
    /// Predict one value per input row.
    fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64>;
}

impl RegressorKind {
    /// Fit this learner on `rows`/`targets`.
    pub fn fit(
        &self,
        rows: &[Vec<f64>],
        targets: &[f64],
        rng: &mut StdRng,
    ) -> Result<Box<dyn Regressor>> {
        if rows.is_empty() || rows.len() != targets.len() {
            return Err(Error::Validation(format!(
                "regressor needs matching non-empty inputs, got {} rows and {} targets",
                rows.len(),
                targets.len()
            )));
        }
        let width = rows[0].len();
        if rows.iter().any(|r| r.len() != width) {
            return Err(Error::Validation("regressor rows must have equal width".into()));
        }
        match self {
            RegressorKind::Linear => Ok(Box::new(LinearFit::fit(rows, targets)?)),
            RegressorKind::Knn { k } => {
                if *k == 0 {
                    return Err(Error::Validation("knn requires k >= 1".into()));
                }
                Ok(Box::new(KnnFit {
                    rows: rows.to_vec(),
                    targets: targets.to_vec(),
                    k: (*k).min(rows.len()),
                }))
            }
            RegressorKind::Svr => Ok(Box::new(KernelRidgeFit::fit(rows, targets)?)),
            RegressorKind::RandomForest => Ok(Box::new(ForestFit::fit(rows, targets, rng))),
            RegressorKind::NeuralNetwork => Ok(Box::new(MlpFit::fit(rows, targets, rng))),
        }
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

// ---- linear ----

struct LinearFit {
    beta: DVector<f64>,
}

impl LinearFit {
    fn fit(rows: &[Vec<f64>], targets: &[f64]) -> Result<Self> {
        let n = rows.len();
        let p = rows[0].len();
        let mut x = DMatrix::zeros(n, p + 1);
        for (i, row) in rows.iter().enumerate() {
            x[(i, 0)] = 1.0;
            for (j, &v) in row.iter().enumerate() {
                x[(i, j + 1)] = v;
            }
        }
        let y = DVector::from_column_slice(targets);
        let xtx = x.transpose() * &x;
        let xty = x.transpose() * y;
        // Tiny ridge keeps degenerate strata solvable.
        let beta = (xtx + DMatrix::identity(p + 1, p + 1) * 1e-9)
            .lu()
            .solve(&xty)
            .ok_or_else(|| Error::Computation("linear fit failed to solve".into()))?;
        Ok(Self { beta })
    }
}

impl Regressor for LinearFit {
    fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter()
            .map(|row| {
                self.beta[0]
                    + row
                        .iter()
                        .enumerate()
                        .map(|(j, &v)| self.beta[j + 1] * v)
                        .sum::<f64>()
            })
            .collect()
    }
}

// ---- knn ----

struct KnnFit {
    rows: Vec<Vec<f64>>,
    targets: Vec<f64>,
    k: usize,
}

impl Regressor for KnnFit {
    fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter()
            .map(|query| {
                let mut dists: Vec<(f64, f64)> = self
                    .rows
                    .iter()
                    .zip(&self.targets)
                    .map(|(row, &y)| (squared_distance(query, row), y))
                    .collect();
                dists.sort_by(|a, b| a.0.total_cmp(&b.0));
                dists.iter().take(self.k).map(|&(_, y)| y).sum::<f64>() / self.k as f64
            })
            .collect()
    }
}

// ---- kernel ridge (svr slot) ----

struct KernelRidgeFit {
    rows: Vec<Vec<f64>>,
    alpha: DVector<f64>,
    gamma: f64,
}

impl KernelRidgeFit {
    fn fit(rows: &[Vec<f64>], targets: &[f64]) -> Result<Self> {
        let n = rows.len();
        let p = rows[0].len().max(1);
        // Median-free bandwidth heuristic: 1 / (p · var).
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let mean = flat.iter().sum::<f64>() / flat.len() as f64;
        let var = flat.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / flat.len() as f64;
        let gamma = 1.0 / (p as f64 * var.max(1e-12));

        let mut k = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in 0..n {
                k[(i, j)] = (-gamma * squared_distance(&rows[i], &rows[j])).exp();
            }
        }
        let y = DVector::from_column_slice(targets);
        let alpha = (k + DMatrix::identity(n, n) * 1.0)
            .lu()
            .solve(&y)
            .ok_or_else(|| Error::Computation("kernel ridge fit failed to solve".into()))?;
        Ok(Self { rows: rows.to_vec(), alpha, gamma })
    }
}

impl Regressor for KernelRidgeFit {
    fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter()
            .map(|query| {
                self.rows
                    .iter()
                    .zip(self.alpha.iter())
                    .map(|(row, &a)| a * (-self.gamma * squared_distance(query, row)).exp())
                    .sum()
            })
            .collect()
    }
}

// ---- random forest ----

const FOREST_TREES: usize = 20;
const TREE_MAX_DEPTH: usize = 6;
const TREE_MIN_LEAF: usize = 5;

enum TreeNode {
    Leaf(f64),
    Split { feature: usize, threshold: f64, left: Box<TreeNode>, right: Box<TreeNode> },
}

impl TreeNode {
    fn build(rows: &[Vec<f64>], targets: &[f64], indices: &[usize], depth: usize) -> TreeNode {
        let mean =
            indices.iter().map(|&i| targets[i]).sum::<f64>() / indices.len().max(1) as f64;
        if depth >= TREE_MAX_DEPTH || indices.len() < 2 * TREE_MIN_LEAF {
            return TreeNode::Leaf(mean);
        }

        let p = rows[0].len();
        let mut best: Option<(usize, f64, f64)> = None;
        for feature in 0..p {
            let mut sorted: Vec<usize> = indices.to_vec();
            sorted.sort_by(|&a, &b| rows[a][feature].total_cmp(&rows[b][feature]));
            // Prefix sums over the sorted order give O(n) split scoring.
            let values: Vec<f64> = sorted.iter().map(|&i| targets[i]).collect();
            let total: f64 = values.iter().sum();
            let total_sq: f64 = values.iter().map(|v| v * v).sum();
            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for split in 1..sorted.len() {
                left_sum += values[split - 1];
                left_sq += values[split - 1] * values[split - 1];
                if split < TREE_MIN_LEAF || sorted.len() - split < TREE_MIN_LEAF {
                    continue;
                }
                let lo = rows[sorted[split - 1]][feature];
                let hi = rows[sorted[split]][feature];
                if lo == hi {
                    continue;
                }
                let nl = split as f64;
                let nr = (sorted.len() - split) as f64;
                let sse = (left_sq - left_sum * left_sum / nl)
                    + ((total_sq - left_sq) - (total - left_sum) * (total - left_sum) / nr);
                if best.map_or(true, |(_, _, b)| sse < b) {
                    best = Some((feature, (lo + hi) / 2.0, sse));
                }
            }
        }

        match best {
            Some((feature, threshold, _)) => {
                let (left, right): (Vec<usize>, Vec<usize>) =
                    indices.iter().partition(|&&i| rows[i][feature] <= threshold);
                TreeNode::Split {
                    feature,
                    threshold,
                    left: Box::new(TreeNode::build(rows, targets, &left, depth + 1)),
                    right: Box::new(TreeNode::build(rows, targets, &right, depth + 1)),
                }
            }
            None => TreeNode::Leaf(mean),
        }
    }

    fn predict(&self, row: &[f64]) -> f64 {
        match self {
            TreeNode::Leaf(v) => *v,
            TreeNode::Split { feature, threshold, left, right } => {
                if row[*feature] <= *threshold {
                    left.predict(row)
                } else {
                    right.predict(row)
                }
            }
        }
    }
}

struct ForestFit {
    trees: Vec<TreeNode>,
}

impl ForestFit {
    fn fit(rows: &[Vec<f64>], targets: &[f64], rng: &mut StdRng) -> Self {
        let n = rows.len();
        let trees = (0..FOREST_TREES)
            .map(|_| {
                let sample: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
                TreeNode::build(rows, targets, &sample, 0)
            })
            .collect();
        Self { trees }
    }
}

impl Regressor for ForestFit {
    fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter()
            .map(|row| {
                self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / self.trees.len() as f64
            })
            .collect()
    }
}

// ---- neural network ----

const MLP_HIDDEN: usize = 16;
const MLP_EPOCHS: usize = 400;
const MLP_LEARNING_RATE: f64 = 0.01;

struct MlpFit {
    w1: DMatrix<f64>,
    b1: DVector<f64>,
    w2: DVector<f64>,
    b2: f64,
}

impl MlpFit {
    fn fit(rows: &[Vec<f64>], targets: &[f64], rng: &mut StdRng) -> Self {
        let n = rows.len();
        let p = rows[0].len();
        let init = Normal::new(0.0, (1.0 / p.max(1) as f64).sqrt()).unwrap();
        let mut w1 = DMatrix::from_fn(MLP_HIDDEN, p, |_, _| init.sample(rng));
        let mut b1 = DVector::zeros(MLP_HIDDEN);
        let mut w2 = DVector::from_fn(MLP_HIDDEN, |_, _| init.sample(rng));
        let mut b2 = 0.0;

        let inputs: Vec<DVector<f64>> =
            rows.iter().map(|r| DVector::from_column_slice(r)).collect();
        for _ in 0..MLP_EPOCHS {
            let mut grad_w1 = DMatrix::zeros(MLP_HIDDEN, p);
            let mut grad_b1 = DVector::zeros(MLP_HIDDEN);
            let mut grad_w2 = DVector::zeros(MLP_HIDDEN);
            let mut grad_b2 = 0.0;
            for (x, &y) in inputs.iter().zip(targets) {
                let hidden = (&w1 * x + &b1).map(f64::tanh);
                let out = w2.dot(&hidden) + b2;
                let err = out - y;
                grad_w2 += &hidden * err;
                grad_b2 += err;
                // Backprop through tanh.
                let delta = hidden.zip_map(&w2, |h, w| err * w * (1.0 - h * h));
                grad_w1 += &delta * x.transpose();
                grad_b1 += delta;
            }
            let scale = MLP_LEARNING_RATE / n as f64;
            w1 -= grad_w1 * scale;
            b1 -= grad_b1 * scale;
            w2 -= grad_w2 * scale;
            b2 -= grad_b2 * scale;
        }
        Self { w1, b1, w2, b2 }
    }
}

impl Regressor for MlpFit {
    fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter()
            .map(|row| {
                let x = DVector::from_column_slice(row);
                let hidden = (&self.w1 * x + &self.b1).map(f64::tanh);
                self.w2.dot(&hidden) + self.b2
            })
            .collect()
    }
}
