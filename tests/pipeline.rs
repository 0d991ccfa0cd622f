//! End-to-end batch pipeline tests against a scripted lookup.
//!
//! Time is paused in every test so rate-limit waits and cooldowns resolve
//! instantly.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use subscriber_enrich::checkpoint::read_records;
use subscriber_enrich::{
    BatchRunner, CheckpointError, CheckpointSink, CsvCheckpoint, EnrichError, EnricherConfig,
    EnrichmentRecord, LogProgress, LookupError, LookupResponse, ResumeStore, RetryPolicy,
    Subscriber, SubscriberLookup,
};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Answers from a per-key script; unscripted keys are found with id
/// `id-<key>`.
#[derive(Default)]
struct FakeLookup {
    scripts: Mutex<HashMap<String, VecDeque<Result<LookupResponse, LookupError>>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeLookup {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn script(&self, key: &str, responses: Vec<Result<LookupResponse, LookupError>>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(key.to_string(), responses.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubscriberLookup for FakeLookup {
    async fn find_by_key(&self, key: &str) -> Result<LookupResponse, LookupError> {
        self.calls.lock().unwrap().push(key.to_string());
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(|queue| queue.pop_front());
        scripted.unwrap_or_else(|| {
            Ok(LookupResponse::Found(
                Subscriber::new(format!("id-{key}"))
                    .with_field("shopify_domain", "shop.example.com")
                    .with_field("telephone", "+1 555 0100"),
            ))
        })
    }
}

/// Keeps every persisted table in memory; optionally fails the n-th write.
#[derive(Default)]
struct RecordingSink {
    writes: Mutex<Vec<Vec<String>>>,
    salvaged: Mutex<Option<Vec<String>>>,
    fail_on_write: Option<usize>,
}

impl RecordingSink {
    fn failing_on(write: usize) -> Self {
        Self {
            fail_on_write: Some(write),
            ..Self::default()
        }
    }

    fn writes(&self) -> Vec<Vec<String>> {
        self.writes.lock().unwrap().clone()
    }
}

impl CheckpointSink for RecordingSink {
    fn location(&self) -> &Path {
        Path::new("memory://checkpoint")
    }

    fn persist(&self, records: &[EnrichmentRecord]) -> Result<(), CheckpointError> {
        let mut writes = self.writes.lock().unwrap();
        if self.fail_on_write == Some(writes.len() + 1) {
            return Err(CheckpointError::Io {
                path: PathBuf::from("memory://checkpoint"),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }
        writes.push(records.iter().map(|r| r.email.clone()).collect());
        Ok(())
    }

    fn salvage(&self, records: &[EnrichmentRecord]) -> Result<PathBuf, CheckpointError> {
        *self.salvaged.lock().unwrap() = Some(records.iter().map(|r| r.email.clone()).collect());
        Ok(PathBuf::from("memory://salvage"))
    }
}

/// Writes through a real CSV checkpoint and re-reads the file after every
/// write.
struct RereadingSink {
    inner: CsvCheckpoint,
    on_disk: Mutex<Vec<Vec<String>>>,
}

impl RereadingSink {
    fn new(path: &Path) -> Self {
        Self {
            inner: CsvCheckpoint::new(path),
            on_disk: Mutex::new(Vec::new()),
        }
    }

    fn on_disk(&self) -> Vec<Vec<String>> {
        self.on_disk.lock().unwrap().clone()
    }
}

impl CheckpointSink for RereadingSink {
    fn location(&self) -> &Path {
        self.inner.location()
    }

    fn persist(&self, records: &[EnrichmentRecord]) -> Result<(), CheckpointError> {
        self.inner.persist(records)?;
        let reread = read_records(self.inner.location())?;
        self.on_disk
            .lock()
            .unwrap()
            .push(reread.into_iter().map(|r| r.email).collect());
        Ok(())
    }

    fn salvage(&self, records: &[EnrichmentRecord]) -> Result<PathBuf, CheckpointError> {
        self.inner.salvage(records)
    }
}

fn runner(lookup: Arc<FakeLookup>) -> BatchRunner {
    BatchRunner::from_config(&EnricherConfig::default(), lookup, Arc::new(LogProgress))
}

fn keys(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("user{i:02}@x.com")).collect()
}

// ---------------------------------------------------------------------------
// Batching and checkpoints
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_25_keys_produce_three_cumulative_checkpoints() {
    let lookup = FakeLookup::new();
    let runner = runner(lookup.clone());
    let sink = RecordingSink::default();
    let input = keys(25);

    let location = runner.run(&input, &sink, None).await.unwrap();
    assert_eq!(location, PathBuf::from("memory://checkpoint"));

    let writes = sink.writes();
    let sizes: Vec<usize> = writes.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![10, 20, 25]);

    // Each checkpoint holds exactly the keys of the completed batches.
    for (write, expected) in writes.iter().zip([10, 20, 25]) {
        let got: HashSet<&String> = write.iter().collect();
        let want: HashSet<&String> = input[..expected].iter().collect();
        assert_eq!(got, want);
    }

    assert_eq!(lookup.calls().len(), 25);
    let stats = runner.stats().await;
    assert_eq!(stats.total_processed, 25);
    assert_eq!(stats.successful, 25);
    assert!(stats.is_consistent());
    assert!(stats.duration().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_keys_are_normalized_and_deduplicated() {
    let lookup = FakeLookup::new();
    let runner = runner(lookup.clone());
    let sink = RecordingSink::default();

    runner
        .run(["a@x.com", "B@X.com ", "b@x.com"], &sink, None)
        .await
        .unwrap();

    let mut calls = lookup.calls();
    calls.sort();
    assert_eq!(calls, vec!["a@x.com", "b@x.com"]);
    assert_eq!(sink.writes().last().map(Vec::len), Some(2));
}

#[tokio::test(start_paused = true)]
async fn test_output_has_one_record_per_distinct_key() {
    let lookup = FakeLookup::new();
    let runner = runner(lookup);
    let sink = RecordingSink::default();
    let mut input = keys(13);
    input.extend(keys(13).into_iter().map(|k| k.to_uppercase()));

    runner.run(&input, &sink, None).await.unwrap();

    let last = sink.writes().pop().unwrap();
    let distinct: HashSet<&String> = last.iter().collect();
    assert_eq!(last.len(), 13);
    assert_eq!(distinct.len(), 13);
}

// ---------------------------------------------------------------------------
// Per-key outcomes
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_unmatched_subscriber_is_empty() {
    let lookup = FakeLookup::new();
    lookup.script("nouser@x.com", vec![Ok(LookupResponse::NotFound)]);
    let runner = runner(lookup);
    let sink = RecordingSink::default();

    runner.run(["nouser@x.com"], &sink, None).await.unwrap();

    let records = runner.ledger().snapshot().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].subscriber_id, None);
    assert_eq!(records[0].shopify_domain, None);
    assert_eq!(records[0].telephone, None);

    let stats = runner.stats().await;
    assert_eq!(stats.empty_responses, 1);
    assert_eq!(stats.failed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_network_error_is_isolated() {
    let lookup = FakeLookup::new();
    lookup.script(
        "bad@x.com",
        vec![Err(LookupError::Transport("connection reset by peer".to_string()))],
    );
    let runner = runner(lookup);
    let sink = RecordingSink::default();

    runner
        .run(["good@x.com", "bad@x.com"], &sink, None)
        .await
        .unwrap();

    let records = runner.ledger().snapshot().await;
    let bad = records.iter().find(|r| r.email == "bad@x.com").unwrap();
    assert!(!bad.is_enriched());
    let good = records.iter().find(|r| r.email == "good@x.com").unwrap();
    assert_eq!(good.subscriber_id.as_deref(), Some("id-good@x.com"));

    let stats = runner.stats().await;
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.successful, 1);
    assert_eq!(stats.errors.len(), 1);
    assert_eq!(stats.errors[0].0, "bad@x.com");
    assert!(stats.errors[0].1.contains("connection reset by peer"));
}

#[tokio::test(start_paused = true)]
async fn test_throttled_key_eventually_succeeds() {
    let lookup = FakeLookup::new();
    lookup.script(
        "busy@x.com",
        vec![
            Ok(LookupResponse::Throttled),
            Ok(LookupResponse::Throttled),
            Ok(LookupResponse::Throttled),
        ],
    );
    let runner = runner(lookup.clone());
    let sink = RecordingSink::default();

    let start = tokio::time::Instant::now();
    runner
        .run(["busy@x.com", "calm@x.com"], &sink, None)
        .await
        .unwrap();

    assert!(start.elapsed() >= Duration::from_secs(30));
    assert_eq!(
        lookup.calls().iter().filter(|k| *k == "busy@x.com").count(),
        4
    );

    let stats = runner.stats().await;
    assert_eq!(stats.rate_limited, 3);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.successful, 2);
    assert!(stats.is_consistent());
}

#[tokio::test(start_paused = true)]
async fn test_bounded_retry_policy_fails_key() {
    let lookup = FakeLookup::new();
    lookup.script(
        "busy@x.com",
        vec![Ok(LookupResponse::Throttled), Ok(LookupResponse::Throttled)],
    );
    let config = EnricherConfig {
        retry: RetryPolicy::exponential(Duration::from_secs(1), Duration::from_secs(4), 2),
        ..EnricherConfig::default()
    };
    let runner = BatchRunner::from_config(&config, lookup, Arc::new(LogProgress));
    let sink = RecordingSink::default();

    runner.run(["busy@x.com"], &sink, None).await.unwrap();

    let stats = runner.stats().await;
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.rate_limited, 2);
    assert!(stats.errors[0].1.contains("rate limit retries exhausted"));
}

// ---------------------------------------------------------------------------
// Resume and failure handling
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_resume_skips_checkpointed_keys() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.csv");
    CsvCheckpoint::new(&output)
        .persist(&[
            EnrichmentRecord::bare("done@x.com"),
            EnrichmentRecord::bare("nouser@x.com"),
        ])
        .unwrap();

    let lookup = FakeLookup::new();
    let runner = runner(lookup.clone());
    let state = ResumeStore::load(&output).unwrap();
    let sink = CsvCheckpoint::new(&output);

    runner
        .run(
            ["DONE@x.com", "new@x.com", "nouser@x.com"],
            &sink,
            Some(state),
        )
        .await
        .unwrap();

    assert_eq!(lookup.calls(), vec!["new@x.com"]);
    let records = read_records(&output).unwrap();
    let emails: Vec<&str> = records.iter().map(|r| r.email.as_str()).collect();
    assert_eq!(emails, vec!["done@x.com", "nouser@x.com", "new@x.com"]);
    assert_eq!(runner.stats().await.total_processed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_checkpoint_failure_salvages_and_propagates() {
    let lookup = FakeLookup::new();
    let runner = runner(lookup.clone());
    let sink = RecordingSink::failing_on(2);

    let err = runner.run(keys(25), &sink, None).await.unwrap_err();
    assert!(matches!(err, EnrichError::Checkpoint(_)));

    // The third batch never started.
    assert_eq!(lookup.calls().len(), 20);
    assert_eq!(sink.writes().len(), 1);
    let salvaged = sink.salvaged.lock().unwrap().clone().unwrap();
    assert_eq!(salvaged.len(), 20);

    let stats = runner.stats().await;
    assert!(stats.finished_at.is_some());
    assert_eq!(stats.total_processed, 20);
}

#[tokio::test(start_paused = true)]
async fn test_empty_work_list_still_writes_output() {
    let lookup = FakeLookup::new();
    let runner = runner(lookup.clone());
    let sink = RecordingSink::default();

    runner.run(Vec::<String>::new(), &sink, None).await.unwrap();

    assert!(lookup.calls().is_empty());
    assert_eq!(sink.writes(), vec![Vec::<String>::new()]);
}

#[tokio::test(start_paused = true)]
async fn test_csv_checkpoint_is_readable_after_every_batch() {
    let dir = tempfile::tempdir().unwrap();
    let sink = RereadingSink::new(&dir.path().join("enriched.csv"));
    let all = keys(25);

    runner(FakeLookup::new())
        .run(all.clone(), &sink, None)
        .await
        .unwrap();

    let on_disk = sink.on_disk();
    assert_eq!(on_disk.len(), 3);
    for (table, expected) in on_disk.iter().zip([10, 20, 25]) {
        assert_eq!(table.as_slice(), &all[..expected]);
    }
}

// ---------------------------------------------------------------------------
// File-based run
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_run_file_end_to_end_and_resume() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("customers.csv");
    let output = dir.path().join("results").join("enriched.csv");
    std::fs::write(
        &input,
        "name,email\nAda,ada@x.com\nBob,BOB@x.com\nCy,nouser@x.com\n",
    )
    .unwrap();

    let lookup = FakeLookup::new();
    lookup.script("nouser@x.com", vec![Ok(LookupResponse::NotFound)]);
    let first = runner(lookup.clone());
    let location = first
        .run_file(&input, "email", &output, false)
        .await
        .unwrap();
    assert_eq!(location, output);

    let records = read_records(&output).unwrap();
    assert_eq!(records.len(), 3);
    let bob = records.iter().find(|r| r.email == "bob@x.com").unwrap();
    assert_eq!(bob.shopify_domain.as_deref(), Some("shop.example.com"));
    assert_eq!(bob.telephone.as_deref(), Some("+1 555 0100"));

    // A second, resumed run adds only the new key.
    std::fs::write(
        &input,
        "name,email\nAda,ada@x.com\nBob,BOB@x.com\nCy,nouser@x.com\nDee,dee@x.com\n",
    )
    .unwrap();
    let second_lookup = FakeLookup::new();
    let second = runner(second_lookup.clone());
    second
        .run_file(&input, "email", &output, true)
        .await
        .unwrap();

    assert_eq!(second_lookup.calls(), vec!["dee@x.com"]);
    assert_eq!(read_records(&output).unwrap().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_run_file_missing_column_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("customers.csv");
    std::fs::write(&input, "name,phone\nAda,123\n").unwrap();

    let lookup = FakeLookup::new();
    let err = runner(lookup.clone())
        .run_file(&input, "email", &dir.path().join("out.csv"), false)
        .await
        .unwrap_err();

    assert!(matches!(err, EnrichError::MissingKeyColumn { .. }));
    assert!(lookup.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_load_failure_still_finalizes_stats() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("customers.csv");
    std::fs::write(&input, "name\nAda\n").unwrap();

    let runner = runner(FakeLookup::new());
    let err = runner
        .run_file(&input, "email", &dir.path().join("out.csv"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, EnrichError::MissingKeyColumn { .. }));

    let stats = runner.stats().await;
    assert!(stats.started_at.is_some());
    assert!(stats.finished_at.is_some());
    assert!(stats.duration().is_some());
    assert!(stats.render().contains("Duration"));
    assert_eq!(stats.total_processed, 0);
}
