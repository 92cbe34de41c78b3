//! End-to-end batch pipeline: read tables, build features, train or reuse
//! a stored model, score the target population.
use std::path::PathBuf;

use anyhow::Result;
use chrono::{NaiveDateTime, Utc};

use crate::config::{ForestConfig, TrainConfig};
use crate::error::ChurnError;
use crate::features::build_features;
use crate::io::tables::{read_member_table, read_visit_table, IngestionReport};
use crate::scorer::{score_members, Population, RiskScore};
use crate::stats::EvalMetrics;
use crate::store::{self, LoadOutcome, ModelArtifact, ModelMetadata};
use crate::trainer::train;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub member_table: PathBuf,
    pub visit_table: PathBuf,
    /// Where to load/save the model artifact. `None` disables the store and
    /// always trains in-process.
    pub model_path: Option<PathBuf>,
    /// As-of date for feature computation and labeling; defaults to now.
    pub reference_date: Option<NaiveDateTime>,
    /// Retrain even when a usable stored model exists.
    pub force_retrain: bool,
    pub population: Population,
    pub train: TrainConfig,
    pub forest: ForestConfig,
}

impl PipelineConfig {
    pub fn new(member_table: PathBuf, visit_table: PathBuf) -> Self {
        Self {
            member_table,
            visit_table,
            model_path: None,
            reference_date: None,
            force_retrain: false,
            population: Population::ActiveOnly,
            train: TrainConfig::default(),
            forest: ForestConfig::default(),
        }
    }
}

/// Everything the surrounding dashboard consumes.
#[derive(Debug)]
pub struct PipelineOutput {
    /// Ordered by descending churn probability.
    pub scores: Vec<RiskScore>,
    /// Ordered list of feature columns backing `RiskScore::features`.
    pub feature_columns: Vec<String>,
    /// `(feature name, weight)` sorted descending; weights sum to 1.
    pub importance: Vec<(String, f64)>,
    pub metrics: EvalMetrics,
    pub trained_at: NaiveDateTime,
    /// The model was trained on single-class labels; warn the user.
    pub degenerate: bool,
    /// False when a stored artifact was reused.
    pub retrained: bool,
    pub member_ingestion: IngestionReport,
    pub visit_ingestion: IngestionReport,
}

/// Run the full pipeline. Failures carry the name of the offending stage.
pub fn run(config: &PipelineConfig) -> Result<PipelineOutput> {
    let reference = config
        .reference_date
        .unwrap_or_else(|| Utc::now().naive_utc());

    let (members, member_ingestion) =
        read_member_table(&config.member_table).map_err(|e| ChurnError::stage("ingestion", e))?;
    let (visits, visit_ingestion) =
        read_visit_table(&config.visit_table).map_err(|e| ChurnError::stage("ingestion", e))?;

    let matrix = build_features(&members, &visits, reference)
        .map_err(|e| ChurnError::stage("feature build", e))?;

    let mut retrained = false;
    let artifact = match stored_artifact(config, &matrix)? {
        Some(artifact) => artifact,
        None => {
            let outcome = train(&matrix, &config.train, &config.forest)
                .map_err(|e| ChurnError::stage("training", e))?;
            retrained = true;
            let artifact = ModelArtifact {
                forest: outcome.forest,
                schema: matrix.schema.clone(),
                metadata: ModelMetadata {
                    trained_at: outcome.trained_at,
                    reference_date: reference,
                    metrics: outcome.metrics,
                    degenerate: outcome.degenerate,
                },
            };
            if let Some(path) = &config.model_path {
                store::save(&artifact, path).map_err(|e| ChurnError::stage("model store", e))?;
            }
            artifact
        }
    };

    let importance = sorted_importance(&artifact);
    let scores = score_members(&artifact, &matrix, config.population)?;

    Ok(PipelineOutput {
        scores,
        feature_columns: artifact.schema.columns.clone(),
        importance,
        metrics: artifact.metadata.metrics,
        trained_at: artifact.metadata.trained_at,
        degenerate: artifact.metadata.degenerate,
        retrained,
        member_ingestion,
        visit_ingestion,
    })
}

/// A stored artifact is reused only when present, readable, and trained on
/// exactly the schema the feature builder just produced.
fn stored_artifact(
    config: &PipelineConfig,
    matrix: &crate::data::FeatureMatrix,
) -> Result<Option<ModelArtifact>> {
    if config.force_retrain {
        return Ok(None);
    }
    let Some(path) = &config.model_path else {
        return Ok(None);
    };
    match store::load(path).map_err(|e| ChurnError::stage("model store", e))? {
        LoadOutcome::Loaded(artifact) if artifact.schema == matrix.schema => {
            log::info!(
                "reusing model trained at {} from {}",
                artifact.metadata.trained_at,
                path.display()
            );
            Ok(Some(*artifact))
        }
        LoadOutcome::Loaded(artifact) => {
            log::info!(
                "stored model schema (v{}, {} columns) differs from current; retraining",
                artifact.schema.version,
                artifact.schema.len()
            );
            Ok(None)
        }
        LoadOutcome::Unavailable(_) => Ok(None),
    }
}

fn sorted_importance(artifact: &ModelArtifact) -> Vec<(String, f64)> {
    let mut importance: Vec<(String, f64)> = artifact
        .schema
        .columns
        .iter()
        .cloned()
        .zip(artifact.forest.feature_importances().iter().copied())
        .collect();
    importance.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    importance
}
