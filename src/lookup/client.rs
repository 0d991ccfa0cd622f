//! Rate-limited lookup client.
//!
//! `lookup` never fails. Throttled calls are retried according to the
//! [`RetryPolicy`]; everything else ends in exactly one terminal outcome,
//! which is counted in the ledger before the record is handed back.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::{LookupResponse, Subscriber, SubscriberLookup};
use crate::ledger::RunLedger;
use crate::rate_limiter::RateLimiter;
use crate::record::{EnrichmentRecord, LookupOutcome};
use crate::retry::RetryPolicy;

pub struct LookupClient {
    lookup: Arc<dyn SubscriberLookup>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    ledger: Arc<RunLedger>,
    domain_field: String,
    phone_field: String,
}

impl LookupClient {
    pub fn new(
        lookup: Arc<dyn SubscriberLookup>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        ledger: Arc<RunLedger>,
    ) -> Self {
        Self {
            lookup,
            limiter,
            retry,
            ledger,
            domain_field: "shopify_domain".to_string(),
            phone_field: "telephone".to_string(),
        }
    }

    /// Override the custom field names copied into the record.
    pub fn with_fields(mut self, domain_field: &str, phone_field: &str) -> Self {
        self.domain_field = domain_field.to_string();
        self.phone_field = phone_field.to_string();
        self
    }

    /// Look up one key and return its record.
    pub async fn lookup(&self, key: &str) -> EnrichmentRecord {
        let outcome = self.resolve(key).await;
        self.ledger.record_outcome(&outcome).await;
        outcome.into_record()
    }

    /// Look up one key until it reaches a terminal outcome.
    ///
    /// Does not touch the ledger's outcome counters; only throttled
    /// responses are counted here.
    pub async fn resolve(&self, key: &str) -> LookupOutcome {
        let mut throttled: u32 = 0;

        loop {
            self.limiter.acquire().await;
            debug!(key, "Fetching subscriber");

            match self.lookup.find_by_key(key).await {
                Ok(LookupResponse::Throttled) => {
                    throttled += 1;
                    self.ledger.note_rate_limited().await;

                    if !self.retry.allows_retry(throttled) {
                        let message =
                            format!("rate limit retries exhausted after {} attempts", throttled);
                        error!(key, attempts = throttled, "Giving up on throttled key");
                        return LookupOutcome::Failed {
                            record: EnrichmentRecord::bare(key),
                            message,
                        };
                    }

                    let cooldown = self.retry.delay_for(throttled);
                    warn!(
                        key,
                        attempt = throttled,
                        cooldown_secs = cooldown.as_secs_f64(),
                        "Rate limit reached, cooling down"
                    );
                    sleep(cooldown).await;
                }
                Ok(LookupResponse::Found(subscriber)) => {
                    let record = self.enrich(key, &subscriber);
                    info!(
                        key,
                        subscriber_id = record.subscriber_id.as_deref().unwrap_or(""),
                        "Retrieved subscriber"
                    );
                    return LookupOutcome::Success(record);
                }
                Ok(LookupResponse::NotFound) => {
                    warn!(key, "No data found");
                    return LookupOutcome::Empty(EnrichmentRecord::bare(key));
                }
                Err(e) => {
                    error!(key, error = %e, "Error fetching subscriber");
                    return LookupOutcome::Failed {
                        record: EnrichmentRecord::bare(key),
                        message: e.to_string(),
                    };
                }
            }
        }
    }

    fn enrich(&self, key: &str, subscriber: &Subscriber) -> EnrichmentRecord {
        EnrichmentRecord {
            email: key.to_string(),
            subscriber_id: subscriber.id.clone(),
            shopify_domain: subscriber.field(&self.domain_field).map(str::to_string),
            telephone: subscriber.field(&self.phone_field).map(str::to_string),
            processed_at: Utc::now(),
        }
    }
}
