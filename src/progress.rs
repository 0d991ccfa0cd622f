//! Progress reporting seam.
//!
//! The batch runner reports through an injected [`ProgressReporter`]
//! rather than writing to the console itself.

use tracing::info;

use crate::stats::RunStats;

pub trait ProgressReporter: Send + Sync {
    /// Called once the work list is known.
    fn run_started(&self, pending: usize, already_processed: usize) {
        let _ = (pending, already_processed);
    }

    /// Called after each batch has been checkpointed.
    fn batch_completed(&self, batch: usize, completed: usize, pending: usize) {
        let _ = (batch, completed, pending);
    }

    fn run_finished(&self, stats: &RunStats) {
        let _ = stats;
    }
}

/// Reports progress as tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn run_started(&self, pending: usize, already_processed: usize) {
        info!(pending, already_processed, "Found keys to process");
    }

    fn batch_completed(&self, batch: usize, completed: usize, pending: usize) {
        info!(batch, completed, pending, "Batch complete");
    }

    fn run_finished(&self, stats: &RunStats) {
        info!(
            total = stats.total_processed,
            successful = stats.successful,
            failed = stats.failed,
            empty = stats.empty_responses,
            rate_limited = stats.rate_limited,
            "Extraction finished"
        );
    }
}
