//! Batch runner.
//!
//! Splits the pending keys into fixed-size batches and processes them one
//! after another. Lookups inside a batch run concurrently on the current
//! task; the full accumulated result set is checkpointed after every batch,
//! so a crash loses at most the batch in flight.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::checkpoint::{CheckpointSink, CsvCheckpoint, ResumeState, ResumeStore};
use crate::config::EnricherConfig;
use crate::error::Result;
use crate::input;
use crate::ledger::RunLedger;
use crate::lookup::{LookupClient, SubscriberLookup};
use crate::progress::ProgressReporter;
use crate::rate_limiter::RateLimiter;
use crate::record::normalize_key;
use crate::stats::RunStats;

pub struct BatchRunner {
    client: Arc<LookupClient>,
    ledger: Arc<RunLedger>,
    batch_size: usize,
    reporter: Arc<dyn ProgressReporter>,
}

impl BatchRunner {
    /// `client` must report into the same `ledger`.
    pub fn new(
        client: Arc<LookupClient>,
        ledger: Arc<RunLedger>,
        batch_size: usize,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            client,
            ledger,
            batch_size: batch_size.max(1),
            reporter,
        }
    }

    /// Wire a rate limiter, ledger and lookup client from `config`.
    pub fn from_config(
        config: &EnricherConfig,
        lookup: Arc<dyn SubscriberLookup>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        let ledger = Arc::new(RunLedger::new());
        let limiter = Arc::new(RateLimiter::new(config.max_requests, config.time_window));
        let client = LookupClient::new(lookup, limiter, config.retry.clone(), ledger.clone())
            .with_fields(&config.domain_field, &config.phone_field);
        Self::new(Arc::new(client), ledger, config.batch_size, reporter)
    }

    pub fn ledger(&self) -> &Arc<RunLedger> {
        &self.ledger
    }

    pub async fn stats(&self) -> RunStats {
        self.ledger.stats().await
    }

    /// Read `input`, optionally resume from `output`, and enrich into
    /// `output`.
    ///
    /// The run clock starts before the input is read, so a failure while
    /// loading still leaves finalized stats behind.
    pub async fn run_file(
        &self,
        input: &Path,
        key_column: &str,
        output: &Path,
        resume: bool,
    ) -> Result<PathBuf> {
        self.ledger.start().await;

        let (keys, resume_state) = match load_inputs(input, key_column, output, resume) {
            Ok(loaded) => loaded,
            Err(e) => {
                error!(error = %e, "Fatal error while loading input");
                self.conclude().await;
                return Err(e);
            }
        };
        let sink = CsvCheckpoint::new(output);
        self.execute(keys, &sink, resume_state).await
    }

    /// Enrich `keys` into `sink`, skipping keys already present in
    /// `resume`. Returns the checkpoint location.
    ///
    /// On a fatal error the accumulated records are salvaged to a separate
    /// location before the error is returned.
    pub async fn run<I, K, S>(
        &self,
        keys: I,
        sink: &S,
        resume: Option<ResumeState>,
    ) -> Result<PathBuf>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
        S: CheckpointSink + ?Sized,
    {
        self.ledger.start().await;
        self.execute(keys, sink, resume).await
    }

    async fn execute<I, K, S>(
        &self,
        keys: I,
        sink: &S,
        resume: Option<ResumeState>,
    ) -> Result<PathBuf>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
        S: CheckpointSink + ?Sized,
    {
        info!(output = %sink.location().display(), "Starting extraction");

        match self.run_batches(keys, sink, resume).await {
            Ok(()) => {
                self.conclude().await;
                info!(output = %sink.location().display(), "Extraction completed");
                Ok(sink.location().to_path_buf())
            }
            Err(e) => {
                error!(error = %e, "Fatal error during processing");
                self.salvage(sink).await;
                self.conclude().await;
                Err(e)
            }
        }
    }

    async fn conclude(&self) {
        self.ledger.finish().await;
        let stats = self.ledger.stats().await;
        self.reporter.run_finished(&stats);
    }

    async fn run_batches<I, K, S>(
        &self,
        keys: I,
        sink: &S,
        resume: Option<ResumeState>,
    ) -> Result<()>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
        S: CheckpointSink + ?Sized,
    {
        let processed = match resume {
            Some(state) => {
                let ResumeState { records, processed } = state;
                self.ledger.seed(records).await;
                processed
            }
            None => HashSet::new(),
        };

        let work = plan_work(keys, &processed);
        self.reporter.run_started(work.len(), processed.len());

        if work.is_empty() {
            // Still leave a complete table at the output location.
            self.ledger
                .with_records(|records| sink.persist(records))
                .await?;
            return Ok(());
        }

        let mut completed = 0usize;
        for (index, batch) in work.chunks(self.batch_size).enumerate() {
            let records = join_all(batch.iter().map(|key| self.client.lookup(key))).await;
            completed += records.len();

            let accumulated = self.ledger.absorb_batch(records).await;
            self.ledger
                .with_records(|records| sink.persist(records))
                .await?;
            info!(
                batch = index + 1,
                records = accumulated,
                path = %sink.location().display(),
                "Progress saved"
            );
            self.reporter.batch_completed(index + 1, completed, work.len());
        }

        Ok(())
    }

    async fn salvage<S: CheckpointSink + ?Sized>(&self, sink: &S) {
        if self.ledger.is_empty().await {
            return;
        }
        match self.ledger.with_records(|records| sink.salvage(records)).await {
            Ok(path) => info!(path = %path.display(), "Partial results saved"),
            Err(e) => warn!(error = %e, "Failed to save partial results"),
        }
    }
}

fn load_inputs(
    input: &Path,
    key_column: &str,
    output: &Path,
    resume: bool,
) -> Result<(Vec<String>, Option<ResumeState>)> {
    let keys = input::read_keys(input, key_column)?;
    let resume_state = if resume {
        Some(ResumeStore::load(output)?)
    } else {
        None
    };
    Ok((keys, resume_state))
}

/// Normalize `keys`, drop blanks, duplicates and anything already in
/// `processed`. Input order is preserved; the first occurrence wins.
pub fn plan_work<I, K>(keys: I, processed: &HashSet<String>) -> Vec<String>
where
    I: IntoIterator<Item = K>,
    K: AsRef<str>,
{
    let mut seen = HashSet::new();
    keys.into_iter()
        .map(|k| normalize_key(k.as_ref()))
        .filter(|k| !k.is_empty() && !processed.contains(k))
        .filter(|k| seen.insert(k.clone()))
        .collect()
}
