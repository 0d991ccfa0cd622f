//! Subscriber Enrichment
//!
//! Enriches a list of customer email addresses by querying a subscriber
//! lookup API, writing the augmented records to a CSV checkpoint that
//! doubles as the final output.
//!
//! # Architecture
//!
//! ```text
//! input keys ──► ResumeStore (skip keys already in the checkpoint)
//!                     │
//!                     ▼
//!               BatchRunner ── batches of N, strictly sequential
//!                     │
//!                     ▼  (concurrent within a batch)
//!               LookupClient ──► RateLimiter ──► SubscriberLookup (HTTP)
//!                     │
//!                     ▼
//!               RunLedger (records + RunStats behind one lock)
//!                     │
//!                     ▼
//!               CheckpointSink (full rewrite after every batch)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use subscriber_enrich::{BatchRunner, EnricherConfig, HttpSubscriberLookup, LogProgress};
//!
//! let config = EnricherConfig::from_env()?;
//! let lookup = HttpSubscriberLookup::from_config(&config)?;
//! let runner = BatchRunner::from_config(&config, Arc::new(lookup), Arc::new(LogProgress));
//! let output = runner
//!     .run_file("customers.csv".as_ref(), &config.key_column, "out.csv".as_ref(), true)
//!     .await?;
//! println!("{}", runner.stats().await.render());
//! ```

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod input;
pub mod ledger;
pub mod logging;
pub mod lookup;
pub mod progress;
pub mod rate_limiter;
pub mod record;
pub mod retry;
pub mod runner;
pub mod stats;

pub use checkpoint::{CheckpointError, CheckpointSink, CsvCheckpoint, ResumeState, ResumeStore};
pub use config::EnricherConfig;
pub use error::{EnrichError, Result};
pub use ledger::RunLedger;
pub use lookup::{
    HttpSubscriberLookup, LookupClient, LookupError, LookupResponse, Subscriber, SubscriberLookup,
};
pub use progress::{LogProgress, ProgressReporter};
pub use rate_limiter::RateLimiter;
pub use record::{normalize_key, EnrichmentRecord, LookupOutcome};
pub use retry::RetryPolicy;
pub use runner::BatchRunner;
pub use stats::RunStats;
