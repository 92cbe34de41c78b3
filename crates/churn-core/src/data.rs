//! Data structures for member/visit records and the derived feature matrix.
//!
//! `FeatureMatrix` keeps the feature values, labels, member ids and schema
//! row-aligned, and provides the selection, alignment and splitting helpers
//! the trainer and scorer are built on.
use chrono::NaiveDateTime;
use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::ChurnError;

/// One row of the member table.
#[derive(Debug, Clone)]
pub struct MemberRecord {
    pub member_id: i64,
    pub registration: NaiveDateTime,
    /// `None` means the membership is currently active.
    pub membership_end: Option<NaiveDateTime>,
    pub age: u32,
    pub gender: String,
    pub zumba: bool,
    pub body_pump: bool,
    pub pilates: bool,
    pub spinning: bool,
}

/// One row of the visit table.
#[derive(Debug, Clone)]
pub struct VisitRecord {
    pub member_id: i64,
    pub entry: NaiveDateTime,
    /// `None` means the visit is incomplete/ongoing; such visits count
    /// toward visit totals but not toward duration statistics.
    pub exit: Option<NaiveDateTime>,
}

/// Ordered, versioned list of feature columns a model was trained on.
///
/// Carried alongside the stored model artifact and checked at scoring time,
/// so scoring never relies on positional luck or stringly-typed lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub columns: Vec<String>,
}

impl FeatureSchema {
    pub fn new(version: u32, columns: Vec<String>) -> Self {
        Self { version, columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Feature matrix with one row per member. Rebuilt fresh on every run;
/// never persisted independently of the raw tables.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub x: Array2<f64>,
    /// 1 = churned, 0 = active.
    pub labels: Vec<u8>,
    pub member_ids: Vec<i64>,
    pub schema: FeatureSchema,
}

impl FeatureMatrix {
    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    pub fn row(&self, i: usize) -> Vec<f64> {
        self.x.row(i).to_vec()
    }

    /// New matrix containing only the given rows, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> FeatureMatrix {
        FeatureMatrix {
            x: self.x.select(Axis(0), indices),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            member_ids: indices.iter().map(|&i| self.member_ids[i]).collect(),
            schema: self.schema.clone(),
        }
    }

    /// Keep rows where `mask` is true.
    pub fn filter(&self, mask: &[bool]) -> FeatureMatrix {
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| if keep { Some(i) } else { None })
            .collect();
        self.select_rows(&indices)
    }

    /// Reorder columns by name to match `target`, dropping columns the
    /// target does not know about. A target column missing here is a
    /// `SchemaMismatch`: the model cannot be applied to this matrix.
    pub fn align_to_schema(&self, target: &FeatureSchema) -> Result<FeatureMatrix, ChurnError> {
        let mut source_cols = Vec::with_capacity(target.len());
        let mut missing = Vec::new();
        for name in &target.columns {
            match self.schema.position(name) {
                Some(idx) => source_cols.push(idx),
                None => missing.push(name.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(ChurnError::SchemaMismatch { missing });
        }

        let mut x = Array2::zeros((self.n_rows(), target.len()));
        for (dst, &src) in source_cols.iter().enumerate() {
            x.column_mut(dst).assign(&self.x.column(src));
        }
        Ok(FeatureMatrix {
            x,
            labels: self.labels.clone(),
            member_ids: self.member_ids.clone(),
            schema: target.clone(),
        })
    }

    /// Stratified train/evaluation split. Each label class is shuffled with
    /// a ChaCha8 generator seeded from `seed` and split at `eval_fraction`,
    /// so identical input and seed always produce the identical partition.
    pub fn train_eval_split(&self, eval_fraction: f64, seed: u64) -> (FeatureMatrix, FeatureMatrix) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut train_idx = Vec::new();
        let mut eval_idx = Vec::new();

        for class in [0u8, 1u8] {
            let mut idx: Vec<usize> = (0..self.n_rows())
                .filter(|&i| self.labels[i] == class)
                .collect();
            idx.shuffle(&mut rng);
            let n_eval = (idx.len() as f64 * eval_fraction).round() as usize;
            eval_idx.extend_from_slice(&idx[..n_eval]);
            train_idx.extend_from_slice(&idx[n_eval..]);
        }

        train_idx.sort_unstable();
        eval_idx.sort_unstable();
        (self.select_rows(&train_idx), self.select_rows(&eval_idx))
    }
}
