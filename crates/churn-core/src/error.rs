//! Error taxonomy for the churn pipeline.
//!
//! Row-level ingestion problems are not represented here: the table readers
//! skip and count them (see `io::tables::IngestionReport`). Likewise a
//! missing or corrupt stored model is not an error, it is the
//! `store::LoadOutcome::Unavailable` retrain signal.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChurnError {
    /// Features recorded at training time are absent from the matrix
    /// presented at scoring time. Fatal for the scoring call; never a
    /// silent fill.
    #[error("scoring-time features do not match the training schema; missing columns: {missing:?}")]
    SchemaMismatch { missing: Vec<String> },

    /// Any other failure inside the pipeline, tagged with the stage that
    /// produced it.
    #[error("{stage} stage failed")]
    Stage {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl ChurnError {
    pub fn stage(stage: &'static str, source: anyhow::Error) -> Self {
        ChurnError::Stage { stage, source }
    }
}
