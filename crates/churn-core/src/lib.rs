//! churn-core: churn-risk prediction for gym membership data.
//!
//! This crate turns raw member and visit tables into a supervised feature
//! matrix, fits a Random Forest classifier on it, and scores members with a
//! churn probability and a discrete risk tier. A small file-backed model
//! store lets repeated runs reuse a previously trained model.
//!
//! The pipeline is a synchronous batch job: `pipeline::run` wires the
//! readers, the feature builder, the trainer/store and the scorer together;
//! each piece is also usable on its own.
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod io;
pub mod model;
pub mod pipeline;
pub mod scorer;
pub mod stats;
pub mod store;
pub mod trainer;
