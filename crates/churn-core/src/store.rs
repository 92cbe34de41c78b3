//! File-backed model store.
//!
//! The artifact is a serde_json blob written atomically (temp file in the
//! destination directory, then persist over the target path), so a crash
//! mid-write never leaves a partial file that `load` accepts. A missing,
//! unreadable or incompatible artifact is not an error: it is the
//! `Unavailable` retrain signal.
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::config::SCHEMA_VERSION;
use crate::data::FeatureSchema;
use crate::model::RandomForest;
use crate::stats::EvalMetrics;

/// Descriptive metadata stored next to the fitted model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub trained_at: NaiveDateTime,
    /// The as-of date features were computed against at training time.
    pub reference_date: NaiveDateTime,
    pub metrics: EvalMetrics,
    /// Training labels contained a single class.
    pub degenerate: bool,
}

/// The unit the store saves and loads: fitted model, the ordered feature
/// schema it was trained on, and training metadata. Loaded artifacts are
/// never mutated in place; a retrain replaces the file wholesale.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub forest: RandomForest,
    pub schema: FeatureSchema,
    pub metadata: ModelMetadata,
}

/// Result of `load`: either a usable artifact or a reason to retrain.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(Box<ModelArtifact>),
    /// Missing, corrupt or schema-incompatible artifact. The normal,
    /// non-exceptional "retrain" path.
    Unavailable(String),
}

/// Serialize `artifact` to `path`, replacing any previous artifact.
pub fn save(artifact: &ModelArtifact, path: &Path) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let tmp = match dir {
        Some(dir) => NamedTempFile::new_in(dir),
        None => NamedTempFile::new(),
    }
    .context("failed to create temporary model file")?;

    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer(&mut writer, artifact).context("failed to serialize model")?;
        writer.flush().context("failed to flush model file")?;
    }

    tmp.persist(path)
        .with_context(|| format!("failed to move model into place at {}", path.display()))?;
    log::info!("model saved to {}", path.display());
    Ok(())
}

/// Load an artifact from `path`.
///
/// Only unexpected I/O failures (e.g. permissions) surface as errors;
/// anything that simply makes the artifact unusable comes back as
/// `LoadOutcome::Unavailable`.
pub fn load(path: &Path) -> Result<LoadOutcome> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Ok(unavailable(format!("no model artifact at {}", path.display())));
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to open model artifact {}", path.display()));
        }
    };

    let artifact: ModelArtifact = match serde_json::from_reader(BufReader::new(file)) {
        Ok(artifact) => artifact,
        Err(err) => {
            return Ok(unavailable(format!(
                "model artifact {} is unreadable: {err}",
                path.display()
            )));
        }
    };

    if artifact.schema.version != SCHEMA_VERSION {
        return Ok(unavailable(format!(
            "model artifact {} was trained on feature schema v{}, current is v{}",
            path.display(),
            artifact.schema.version,
            SCHEMA_VERSION
        )));
    }

    Ok(LoadOutcome::Loaded(Box::new(artifact)))
}

fn unavailable(reason: String) -> LoadOutcome {
    log::info!("{reason}; a retrain is required");
    LoadOutcome::Unavailable(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForestConfig;
    use chrono::NaiveDate;
    use ndarray::array;

    fn sample_artifact() -> ModelArtifact {
        let x = array![[1.0, 0.0], [2.0, 1.0], [10.0, 0.0], [12.0, 1.0]];
        let y = vec![0, 0, 1, 1];
        let forest = RandomForest::fit(
            &x,
            &y,
            &ForestConfig {
                tree_count: 5,
                min_samples_split: 2,
                min_samples_leaf: 1,
                ..ForestConfig::default()
            },
        );
        let when = NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        ModelArtifact {
            forest,
            schema: FeatureSchema::new(SCHEMA_VERSION, vec!["a".into(), "b".into()]),
            metadata: ModelMetadata {
                trained_at: when,
                reference_date: when,
                metrics: EvalMetrics::zero(),
                degenerate: false,
            },
        }
    }

    #[test]
    fn save_then_load_preserves_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let artifact = sample_artifact();
        let probe = [11.0, 1.0];
        let before = artifact.forest.predict_proba_row(&probe);

        save(&artifact, &path).unwrap();
        match load(&path).unwrap() {
            LoadOutcome::Loaded(reloaded) => {
                assert_eq!(reloaded.forest.predict_proba_row(&probe), before);
                assert_eq!(reloaded.schema, artifact.schema);
            }
            LoadOutcome::Unavailable(reason) => panic!("expected artifact, got: {reason}"),
        }
    }

    #[test]
    fn missing_artifact_is_unavailable_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        match load(&dir.path().join("nope.json")).unwrap() {
            LoadOutcome::Unavailable(_) => {}
            LoadOutcome::Loaded(_) => panic!("loaded a model from nowhere"),
        }
    }

    #[test]
    fn corrupt_artifact_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, b"{ definitely not a model").unwrap();
        match load(&path).unwrap() {
            LoadOutcome::Unavailable(reason) => assert!(reason.contains("unreadable")),
            LoadOutcome::Loaded(_) => panic!("loaded a corrupt model"),
        }
    }

    #[test]
    fn schema_version_mismatch_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let mut artifact = sample_artifact();
        artifact.schema.version = SCHEMA_VERSION + 1;
        save(&artifact, &path).unwrap();
        match load(&path).unwrap() {
            LoadOutcome::Unavailable(reason) => assert!(reason.contains("schema")),
            LoadOutcome::Loaded(_) => panic!("loaded an incompatible model"),
        }
    }
}
