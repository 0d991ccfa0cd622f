//! Input table reader.

use std::path::Path;

use tracing::{info, warn};

use crate::error::{EnrichError, Result};

/// Read the raw key column from a CSV file with headers.
///
/// Other columns are ignored. Rows whose key is blank are skipped.
pub fn read_keys(path: &Path, column: &str) -> Result<Vec<String>> {
    if !path.exists() {
        return Err(EnrichError::InputNotFound(path.to_path_buf()));
    }

    info!(path = %path.display(), "Reading input file");
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let idx = headers
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| EnrichError::MissingKeyColumn {
            column: column.to_string(),
            path: path.to_path_buf(),
        })?;

    let mut keys = Vec::new();
    let mut blank = 0usize;
    for row in reader.records() {
        let row = row?;
        match row.get(idx).map(str::trim) {
            Some(value) if !value.is_empty() => keys.push(value.to_string()),
            _ => blank += 1,
        }
    }

    if blank > 0 {
        warn!(rows = blank, column, "Skipped rows with a blank key");
    }
    info!(keys = keys.len(), "Input loaded");
    Ok(keys)
}
