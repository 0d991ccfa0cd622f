//! Shared run state.
//!
//! The accumulated result set and the run counters live together behind
//! one lock. Lookup tasks report outcomes here; the batch runner absorbs
//! finished batches and persists the whole set from here.

use tokio::sync::Mutex;

use crate::record::{EnrichmentRecord, LookupOutcome};
use crate::stats::RunStats;

#[derive(Default)]
struct LedgerState {
    stats: RunStats,
    records: Vec<EnrichmentRecord>,
}

#[derive(Default)]
pub struct RunLedger {
    state: Mutex<LedgerState>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn start(&self) {
        self.state.lock().await.stats.mark_started();
    }

    pub async fn finish(&self) {
        self.state.lock().await.stats.mark_finished();
    }

    /// Load records carried over from a previous run.
    pub async fn seed(&self, records: Vec<EnrichmentRecord>) {
        self.state.lock().await.records.extend(records);
    }

    pub async fn record_outcome(&self, outcome: &LookupOutcome) {
        self.state.lock().await.stats.record(outcome);
    }

    pub async fn note_rate_limited(&self) {
        self.state.lock().await.stats.record_rate_limited();
    }

    /// Append a finished batch. Returns the size of the accumulated set.
    pub async fn absorb_batch(&self, batch: Vec<EnrichmentRecord>) -> usize {
        let mut state = self.state.lock().await;
        state.records.extend(batch);
        state.records.len()
    }

    /// Run `f` over the accumulated set while holding the lock.
    pub async fn with_records<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&[EnrichmentRecord]) -> T,
    {
        let state = self.state.lock().await;
        f(&state.records)
    }

    pub async fn snapshot(&self) -> Vec<EnrichmentRecord> {
        self.state.lock().await.records.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> RunStats {
        self.state.lock().await.stats.clone()
    }
}
