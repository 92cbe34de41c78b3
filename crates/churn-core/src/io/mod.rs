//! Readers for the raw member and visit tables.
pub mod tables;
