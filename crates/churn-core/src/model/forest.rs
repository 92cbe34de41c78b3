//! Bagged ensemble of classification trees.
//!
//! Fitting is deterministic under a fixed seed: tree `i` draws its bootstrap
//! sample and split randomness from its own ChaCha8 generator seeded with
//! `random_seed + i`, and the parallel collect preserves tree order.
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::ForestConfig;
use crate::model::tree::{DecisionTree, TreeParams};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<DecisionTree>,
    n_features: usize,
    importances: Vec<f64>,
}

impl RandomForest {
    /// Fit the forest on a feature matrix with 0/1 labels.
    pub fn fit(x: &Array2<f64>, y: &[u8], config: &ForestConfig) -> RandomForest {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples == 0 || n_features == 0 {
            log::warn!("fitting a random forest on an empty matrix; model degrades to p=0.5");
            return RandomForest {
                config: config.clone(),
                trees: Vec::new(),
                n_features,
                importances: uniform_importances(n_features),
            };
        }

        let max_features = config
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().ceil() as usize)
            .clamp(1, n_features);

        let trees: Vec<DecisionTree> = (0..config.tree_count)
            .into_par_iter()
            .map(|i| {
                let seed = config.random_seed.wrapping_add(i as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let bootstrap: Vec<usize> =
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
                let params = TreeParams {
                    max_depth: config.max_depth,
                    min_samples_split: config.min_samples_split,
                    min_samples_leaf: config.min_samples_leaf,
                    max_features,
                    seed,
                };
                DecisionTree::fit(x, y, &bootstrap, &params)
            })
            .collect();

        let mut importances = vec![0.0; n_features];
        for tree in &trees {
            for (feature, gain) in tree.split_gains().iter().enumerate() {
                importances[feature] += gain;
            }
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for value in importances.iter_mut() {
                *value /= total;
            }
        } else {
            // Degenerate fit (e.g. single-class labels): no split ever
            // happened. Keep the sum-to-one contract with a uniform vector.
            importances = uniform_importances(n_features);
        }

        RandomForest {
            config: config.clone(),
            trees,
            n_features,
            importances,
        }
    }

    /// Mean positive-class leaf probability across trees for one row.
    pub fn predict_proba_row(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict_proba_one(row)).sum();
        sum / self.trees.len() as f64
    }

    /// Churn probability per row of `x`.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Vec<f64> {
        x.outer_iter()
            .map(|row| self.predict_proba_row(&row.to_vec()))
            .collect()
    }

    /// Normalized impurity-based importances, one weight per feature,
    /// non-negative and summing to one.
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }
}

fn uniform_importances(n_features: usize) -> Vec<f64> {
    if n_features == 0 {
        Vec::new()
    } else {
        vec![1.0 / n_features as f64; n_features]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn separable_data(n: usize) -> (Array2<f64>, Vec<u8>) {
        // First feature separates the classes; second is noise-free constant.
        let mut values = Vec::new();
        let mut labels = Vec::new();
        for i in 0..n {
            let positive = i % 2 == 0;
            values.push(if positive { 10.0 + i as f64 } else { i as f64 / 10.0 });
            values.push(3.0);
            labels.push(positive as u8);
        }
        (Array2::from_shape_vec((n, 2), values).unwrap(), labels)
    }

    fn small_config() -> ForestConfig {
        ForestConfig {
            tree_count: 15,
            max_depth: 4,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            random_seed: 42,
        }
    }

    #[test]
    fn separates_obvious_classes() {
        let (x, y) = separable_data(40);
        let forest = RandomForest::fit(&x, &y, &small_config());
        assert!(forest.predict_proba_row(&[25.0, 3.0]) > 0.7);
        assert!(forest.predict_proba_row(&[0.1, 3.0]) < 0.3);
    }

    #[test]
    fn fit_is_deterministic_under_fixed_seed() {
        let (x, y) = separable_data(40);
        let a = RandomForest::fit(&x, &y, &small_config());
        let b = RandomForest::fit(&x, &y, &small_config());
        assert_eq!(a.feature_importances(), b.feature_importances());
        assert_eq!(a.predict_proba(&x), b.predict_proba(&x));
    }

    #[test]
    fn importances_are_normalized() {
        let (x, y) = separable_data(40);
        let forest = RandomForest::fit(&x, &y, &small_config());
        let sum: f64 = forest.feature_importances().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(forest.feature_importances().iter().all(|&w| w >= 0.0));
    }

    #[test]
    fn single_class_input_degrades_to_uniform_importances() {
        let (x, _) = separable_data(10);
        let y = vec![1u8; 10];
        let forest = RandomForest::fit(&x, &y, &small_config());
        assert_eq!(forest.predict_proba_row(&[5.0, 3.0]), 1.0);
        let sum: f64 = forest.feature_importances().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }
}
