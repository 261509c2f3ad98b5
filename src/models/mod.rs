//! Core data models for the file processor.
//!
//! `file` holds the persisted metadata row (mapped via `sqlx::FromRow`) and
//! the JSON views derived from it; `upload` holds the transient request
//! types consumed by the upload pipeline.

pub mod file;
pub mod upload;
