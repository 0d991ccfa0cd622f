//! Run configuration.
//!
//! Defaults mirror the production extractor: 10 requests per second,
//! batches of 10 keys and a 10 second cooldown after throttling.
//! Environment overrides are applied by [`EnricherConfig::from_env`].

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EnrichError, Result};
use crate::retry::RetryPolicy;

pub const DEFAULT_API_URL: &str = "https://api.manychat.com/fb/subscriber/findBySystemField";
pub const DEFAULT_TOKEN_ENV: &str = "MANYCHAT_API_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnricherConfig {
    /// Subscriber lookup endpoint
    pub api_url: String,
    /// Environment variable holding the bearer credential
    pub token_env: String,
    /// Input column holding the identity key
    pub key_column: String,
    /// Query parameter the key is sent as
    pub lookup_param: String,
    pub batch_size: usize,
    pub max_requests: usize,
    pub time_window: Duration,
    /// Per-request timeout; `None` leaves the transport default in place
    pub request_timeout: Option<Duration>,
    pub retry: RetryPolicy,
    pub log_dir: PathBuf,
    /// Custom field copied into `shopify_domain`
    pub domain_field: String,
    /// Custom field copied into `telephone`
    pub phone_field: String,
}

impl Default for EnricherConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            key_column: "email".to_string(),
            lookup_param: "email".to_string(),
            batch_size: 10,
            max_requests: 10,
            time_window: Duration::from_secs(1),
            request_timeout: None,
            retry: RetryPolicy::default(),
            log_dir: PathBuf::from("logs"),
            domain_field: "shopify_domain".to_string(),
            phone_field: "telephone".to_string(),
        }
    }
}

impl EnricherConfig {
    /// Defaults with `ENRICH_*` environment overrides applied.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = get("ENRICH_API_URL") {
            config.api_url = url;
        }
        if let Some(v) = parse_var::<usize>(&get, "ENRICH_BATCH_SIZE")? {
            if v == 0 {
                return Err(EnrichError::InvalidConfig {
                    name: "ENRICH_BATCH_SIZE".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            config.batch_size = v;
        }
        if let Some(v) = parse_var::<usize>(&get, "ENRICH_MAX_REQUESTS")? {
            config.max_requests = v;
        }
        if let Some(v) = parse_var::<u64>(&get, "ENRICH_TIME_WINDOW_MS")? {
            config.time_window = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u64>(&get, "ENRICH_COOLDOWN_SECS")? {
            config.retry.cooldown = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u32>(&get, "ENRICH_MAX_RATE_LIMIT_RETRIES")? {
            config.retry.max_attempts = Some(v);
        }
        if let Some(v) = parse_var::<u64>(&get, "ENRICH_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Some(Duration::from_secs(v));
        }
        if let Some(dir) = get("ENRICH_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Read the API credential, failing fast if it is missing.
    pub fn api_token(&self) -> Result<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| EnrichError::MissingCredential {
                var: self.token_env.clone(),
            })
    }
}

fn parse_var<T>(get: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| EnrichError::InvalidConfig {
                name: name.to_string(),
                reason: e.to_string(),
            }),
    }
}
