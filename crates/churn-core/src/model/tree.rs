//! Single classification tree: Gini splits on axis-aligned thresholds.
use std::cmp::Ordering;

use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Per-tree fitting parameters, fixed by the owning forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        /// Fraction of positive (churned) samples in this leaf.
        prob: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Node,
    /// Unnormalized impurity-decrease per feature, weighted by node size.
    gains: Vec<f64>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

impl DecisionTree {
    /// Fit on the rows of `x` selected by `indices` (labels in `y`, 0/1).
    pub(crate) fn fit(x: &Array2<f64>, y: &[u8], indices: &[usize], params: &TreeParams) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let mut gains = vec![0.0; x.ncols()];
        let root = build(x, y, indices, 0, params, &mut rng, &mut gains);
        DecisionTree { root, gains }
    }

    /// Positive-class probability for a single feature row.
    pub(crate) fn predict_proba_one(&self, row: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { prob } => return *prob,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    pub(crate) fn split_gains(&self) -> &[f64] {
        &self.gains
    }
}

fn positive_fraction(y: &[u8], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    let positives = indices.iter().filter(|&&i| y[i] == 1).count();
    positives as f64 / indices.len() as f64
}

/// Binary Gini impurity from the positive-class fraction.
fn gini(p: f64) -> f64 {
    2.0 * p * (1.0 - p)
}

fn build(
    x: &Array2<f64>,
    y: &[u8],
    indices: &[usize],
    depth: usize,
    params: &TreeParams,
    rng: &mut ChaCha8Rng,
    gains: &mut [f64],
) -> Node {
    let prob = positive_fraction(y, indices);
    let impurity = gini(prob);

    if depth >= params.max_depth
        || indices.len() < params.min_samples_split
        || impurity < 1e-12
    {
        return Node::Leaf { prob };
    }

    match best_split(x, y, indices, params, rng) {
        Some(split) => {
            gains[split.feature] += split.gain * indices.len() as f64;
            let left = build(x, y, &split.left, depth + 1, params, rng, gains);
            let right = build(x, y, &split.right, depth + 1, params, rng, gains);
            Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left: Box::new(left),
                right: Box::new(right),
            }
        }
        None => Node::Leaf { prob },
    }
}

fn best_split(
    x: &Array2<f64>,
    y: &[u8],
    indices: &[usize],
    params: &TreeParams,
    rng: &mut ChaCha8Rng,
) -> Option<BestSplit> {
    let n_features = x.ncols();
    let mut features: Vec<usize> = (0..n_features).collect();
    features.shuffle(rng);
    features.truncate(params.max_features.max(1));
    // Deterministic arm order after the seeded subsample.
    features.sort_unstable();

    let parent_impurity = gini(positive_fraction(y, indices));
    let mut best: Option<BestSplit> = None;

    for &feature in &features {
        let mut values: Vec<f64> = indices.iter().map(|&i| x[[i, feature]]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        values.dedup();

        for pair in values.windows(2) {
            let threshold = (pair[0] + pair[1]) / 2.0;
            let (left, right): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .partition(|&&i| x[[i, feature]] <= threshold);
            if left.len() < params.min_samples_leaf || right.len() < params.min_samples_leaf {
                continue;
            }

            let n_left = left.len() as f64;
            let n_right = right.len() as f64;
            let weighted = (n_left * gini(positive_fraction(y, &left))
                + n_right * gini(positive_fraction(y, &right)))
                / (n_left + n_right);
            let gain = parent_impurity - weighted;

            let better = match &best {
                Some(current) => gain > current.gain,
                None => gain > 1e-12,
            };
            if better {
                best = Some(BestSplit {
                    feature,
                    threshold,
                    gain,
                    left,
                    right,
                });
            }
        }
    }

    best
}
