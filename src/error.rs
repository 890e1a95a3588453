// src/error.rs
//! Typed errors for the persistence boundaries. Pipeline-internal failures
//! (providers, currency, assist) are absorbed fail-open and never surface
//! through these.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no such row: {0}")]
    NotFound(String),
    #[error("store backend failure: {0}")]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
