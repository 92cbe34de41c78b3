//! Risk scorer: applies a trained artifact to a feature matrix and maps
//! probabilities to discrete risk tiers.
use serde::{Deserialize, Serialize};

use crate::config::{LOW_RISK_MAX, MEDIUM_RISK_MAX};
use crate::data::FeatureMatrix;
use crate::error::ChurnError;
use crate::store::ModelArtifact;

/// Discretized churn probability. Ordering is Low < Medium < High.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "Low",
            RiskTier::Medium => "Medium",
            RiskTier::High => "High",
        }
    }
}

/// Monotonic probability → tier mapping using the configured thresholds.
pub fn risk_tier(probability: f64) -> RiskTier {
    if probability < LOW_RISK_MAX {
        RiskTier::Low
    } else if probability < MEDIUM_RISK_MAX {
        RiskTier::Medium
    } else {
        RiskTier::High
    }
}

/// Which members to score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Population {
    /// Members labeled active (0) in the feature matrix.
    ActiveOnly,
    All,
}

/// One scored member, with the aligned feature values for drill-down.
#[derive(Debug, Clone, Serialize)]
pub struct RiskScore {
    pub member_id: i64,
    pub probability: f64,
    pub tier: RiskTier,
    pub features: Vec<f64>,
}

/// Score `population` rows of `matrix` with the artifact's model.
///
/// Columns are aligned by name to the schema recorded at training time, so
/// any column permutation of the training layout scores identically; a
/// training column absent from `matrix` is a `SchemaMismatch` error. The
/// result is ordered by probability descending, ties broken by ascending
/// member id. Pure in the model: the artifact is never modified.
pub fn score_members(
    artifact: &ModelArtifact,
    matrix: &FeatureMatrix,
    population: Population,
) -> Result<Vec<RiskScore>, ChurnError> {
    let target = match population {
        Population::ActiveOnly => {
            let mask: Vec<bool> = matrix.labels.iter().map(|&l| l == 0).collect();
            matrix.filter(&mask)
        }
        Population::All => matrix.clone(),
    };

    let aligned = target.align_to_schema(&artifact.schema)?;

    let mut scores: Vec<RiskScore> = (0..aligned.n_rows())
        .map(|i| {
            let features = aligned.row(i);
            let probability = artifact.forest.predict_proba_row(&features);
            RiskScore {
                member_id: aligned.member_ids[i],
                probability,
                tier: risk_tier(probability),
                features,
            }
        })
        .collect();

    scores.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.member_id.cmp(&b.member_id))
    });

    log::debug!(
        "scored {} members ({} high risk)",
        scores.len(),
        scores.iter().filter(|s| s.tier == RiskTier::High).count()
    );
    Ok(scores)
}
