//! Checkpoint persistence and resume.
//!
//! The checkpoint is the full accumulated result table. It is rewritten
//! after every batch by writing a temporary file next to the target and
//! renaming it into place, so the file on disk is always a complete table.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::record::{normalize_key, EnrichmentRecord};

/// Column order of the checkpoint table.
pub const CHECKPOINT_COLUMNS: [&str; 5] = [
    "email",
    "subscriber_id",
    "shopify_domain",
    "telephone",
    "processed_at",
];

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error on {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to move checkpoint into place at {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Destination for the accumulated result set.
pub trait CheckpointSink: Send + Sync {
    /// Where the checkpoint lives; also the run's final deliverable.
    fn location(&self) -> &Path;

    /// Replace the checkpoint with `records`.
    fn persist(&self, records: &[EnrichmentRecord]) -> Result<(), CheckpointError>;

    /// Write `records` to a separate, distinctly named location after a
    /// fatal error. Returns the path written.
    fn salvage(&self, records: &[EnrichmentRecord]) -> Result<PathBuf, CheckpointError>;
}

/// CSV file checkpoint.
#[derive(Debug, Clone)]
pub struct CsvCheckpoint {
    path: PathBuf,
}

impl CsvCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Salvage file name for the current local time.
    pub fn salvage_path(&self) -> PathBuf {
        let name = format!("error_backup_{}.csv", Local::now().format("%Y%m%d_%H%M%S"));
        parent_dir(&self.path).join(name)
    }
}

impl CheckpointSink for CsvCheckpoint {
    fn location(&self) -> &Path {
        &self.path
    }

    fn persist(&self, records: &[EnrichmentRecord]) -> Result<(), CheckpointError> {
        write_records(&self.path, records)?;
        debug!(path = %self.path.display(), records = records.len(), "Progress saved");
        Ok(())
    }

    fn salvage(&self, records: &[EnrichmentRecord]) -> Result<PathBuf, CheckpointError> {
        let path = self.salvage_path();
        write_records(&path, records)?;
        Ok(path)
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Atomically replace `path` with a CSV table of `records`.
pub fn write_records(path: &Path, records: &[EnrichmentRecord]) -> Result<(), CheckpointError> {
    let dir = parent_dir(path);
    let io_err = |source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    };
    let csv_err = |source| CheckpointError::Csv {
        path: path.to_path_buf(),
        source,
    };

    fs::create_dir_all(&dir).map_err(io_err)?;
    let tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;

    {
        let mut writer = csv::Writer::from_writer(tmp.as_file());
        if records.is_empty() {
            writer.write_record(CHECKPOINT_COLUMNS).map_err(csv_err)?;
        }
        for record in records {
            writer.serialize(record).map_err(csv_err)?;
        }
        writer.flush().map_err(io_err)?;
    }
    tmp.as_file().sync_all().map_err(io_err)?;

    tmp.persist(path).map_err(|e| CheckpointError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

/// Read every record from a checkpoint table.
pub fn read_records(path: &Path) -> Result<Vec<EnrichmentRecord>, CheckpointError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| CheckpointError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    reader
        .deserialize()
        .collect::<Result<Vec<EnrichmentRecord>, _>>()
        .map_err(|source| CheckpointError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

/// Records and keys recovered from a previous run.
#[derive(Debug, Clone, Default)]
pub struct ResumeState {
    pub records: Vec<EnrichmentRecord>,
    pub processed: HashSet<String>,
}

pub struct ResumeStore;

impl ResumeStore {
    /// Load the checkpoint at `path`. A missing file yields an empty state.
    ///
    /// Keys are normalized on load; a key appearing twice keeps its first
    /// row. Empty (unmatched) records count as processed.
    pub fn load(path: &Path) -> Result<ResumeState, CheckpointError> {
        if !path.exists() {
            return Ok(ResumeState::default());
        }

        let mut state = ResumeState::default();
        let mut duplicates = 0usize;
        for mut record in read_records(path)? {
            let key = normalize_key(&record.email);
            if key.is_empty() {
                continue;
            }
            if !state.processed.insert(key.clone()) {
                duplicates += 1;
                continue;
            }
            record.email = key;
            state.records.push(record);
        }

        if duplicates > 0 {
            warn!(duplicates, path = %path.display(), "Checkpoint contained duplicate keys");
        }
        info!(
            processed = state.processed.len(),
            path = %path.display(),
            "Resuming from previous run"
        );
        Ok(state)
    }
}
