//! Run-level error types.
//!
//! Per-key lookup failures never surface here: they are absorbed into a
//! degraded record by [`crate::lookup::LookupClient`]. Everything in
//! [`EnrichError`] aborts the run.

use std::path::PathBuf;

use crate::checkpoint::CheckpointError;

/// Fatal errors that stop an enrichment run.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    /// The API credential variable is unset or blank.
    #[error("{var} environment variable is not set")]
    MissingCredential { var: String },

    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// The input table has no header matching the key column.
    #[error("CSV {} must contain a '{column}' column", path.display())]
    MissingKeyColumn { column: String, path: PathBuf },

    #[error("Invalid configuration value for {name}: {reason}")]
    InvalidConfig { name: String, reason: String },

    #[error("Failed to read input CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Checkpoint write failed: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Failed to create HTTP client: {0}")]
    HttpClient(String),
}

pub type Result<T> = std::result::Result<T, EnrichError>;
