//! Central configuration for training and scoring.
//!
//! Hyperparameters and tier thresholds are documented defaults, not
//! call-time tunables: callers construct a config once and pass it through
//! the pipeline.
use serde::{Deserialize, Serialize};

/// Version of the feature schema produced by the feature builder. Bumped
/// whenever the column list changes; stored artifacts with another version
/// are unusable and force a retrain.
pub const SCHEMA_VERSION: u32 = 1;

/// Probabilities strictly below this map to `RiskTier::Low`.
pub const LOW_RISK_MAX: f64 = 0.33;
/// Probabilities strictly below this (and at or above `LOW_RISK_MAX`) map
/// to `RiskTier::Medium`; everything else is `RiskTier::High`.
pub const MEDIUM_RISK_MAX: f64 = 0.66;

/// Random Forest hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Number of trees in the ensemble.
    pub tree_count: usize,
    /// Cap on tree depth to control overfitting.
    pub max_depth: usize,
    /// Minimum samples required to split a node.
    pub min_samples_split: usize,
    /// Minimum samples in each child of a split.
    pub min_samples_leaf: usize,
    /// Features considered per split. `None` means ceil(sqrt(n_features)).
    pub max_features: Option<usize>,
    /// Reproducibility control; every stochastic step derives from this.
    pub random_seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            tree_count: 100,
            max_depth: 10,
            min_samples_split: 5,
            min_samples_leaf: 2,
            max_features: None,
            random_seed: 42,
        }
    }
}

/// Train/evaluation split settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Fraction of rows held out for evaluation (stratified by label).
    pub eval_fraction: f64,
    /// Seed for the split shuffle.
    pub random_seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            eval_fraction: 0.2,
            random_seed: 42,
        }
    }
}
