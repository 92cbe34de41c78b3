//! Model trainer: split, fit, evaluate, explain.
use anyhow::{bail, Result};
use chrono::{NaiveDateTime, Utc};

use crate::config::{ForestConfig, TrainConfig};
use crate::data::FeatureMatrix;
use crate::model::RandomForest;
use crate::stats::{classification_metrics, EvalMetrics};

/// Everything a training run produces.
#[derive(Debug)]
pub struct TrainOutcome {
    pub forest: RandomForest,
    pub metrics: EvalMetrics,
    /// `(feature name, weight)` sorted by weight descending, ties by name.
    pub importance: Vec<(String, f64)>,
    /// True when the input labels contained a single class; the model is
    /// trivial and callers should warn the user.
    pub degenerate: bool,
    pub trained_at: NaiveDateTime,
}

/// Train a Random Forest on a labeled feature matrix.
///
/// The matrix is split into stratified train/evaluation partitions using
/// the seeded shuffle from `train_config`; the forest fit is seeded too, so
/// identical input and configuration reproduce the identical model,
/// metrics and importance ordering.
pub fn train(
    matrix: &FeatureMatrix,
    train_config: &TrainConfig,
    forest_config: &ForestConfig,
) -> Result<TrainOutcome> {
    if matrix.n_rows() == 0 {
        bail!("cannot train on an empty feature matrix");
    }

    let churned = matrix.labels.iter().filter(|&&l| l == 1).count();
    let degenerate = churned == 0 || churned == matrix.n_rows();
    if degenerate {
        log::warn!(
            "training labels contain a single class ({} of {} churned); \
             the model degrades to a constant predictor",
            churned,
            matrix.n_rows()
        );
    }

    let (train_part, eval_part) =
        matrix.train_eval_split(train_config.eval_fraction, train_config.random_seed);
    log::info!(
        "training on {} members, evaluating on {} ({} features)",
        train_part.n_rows(),
        eval_part.n_rows(),
        matrix.n_features()
    );

    let forest = RandomForest::fit(&train_part.x, &train_part.labels, forest_config);

    let metrics = if eval_part.n_rows() == 0 {
        log::warn!("evaluation partition is empty; reporting zero metrics");
        EvalMetrics::zero()
    } else {
        let predicted: Vec<u8> = forest
            .predict_proba(&eval_part.x)
            .iter()
            .map(|&p| (p >= 0.5) as u8)
            .collect();
        classification_metrics(&eval_part.labels, &predicted)
    };

    let mut importance: Vec<(String, f64)> = matrix
        .schema
        .columns
        .iter()
        .cloned()
        .zip(forest.feature_importances().iter().copied())
        .collect();
    importance.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    Ok(TrainOutcome {
        forest,
        metrics,
        importance,
        degenerate,
        trained_at: Utc::now().naive_utc(),
    })
}
