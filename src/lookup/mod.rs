//! Subscriber lookup
//!
//! This module provides:
//! - The [`SubscriberLookup`] seam: one remote call per key, reporting
//!   found / not found / throttled
//! - [`HttpSubscriberLookup`], the reqwest implementation against the
//!   subscriber API
//! - [`LookupClient`], which rate-limits, retries throttled calls and turns
//!   every other outcome into a terminal record

pub mod client;
pub mod http;

use std::collections::HashMap;

use async_trait::async_trait;

pub use client::LookupClient;
pub use http::HttpSubscriberLookup;

/// A matched subscriber as returned by the lookup API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscriber {
    pub id: Option<String>,
    /// Custom fields keyed by name. A name present with a null value maps
    /// to `None`.
    pub custom_fields: HashMap<String, Option<String>>,
}

impl Subscriber {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            custom_fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_fields
            .entry(name.into())
            .or_insert_with(|| Some(value.into()));
        self
    }

    /// Value of a custom field, if present and non-null.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.custom_fields.get(name).and_then(|v| v.as_deref())
    }
}

/// Raw answer to a single lookup call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupResponse {
    Found(Subscriber),
    NotFound,
    /// The API refused the call because of rate limiting. The only
    /// non-terminal response: the caller cools down and retries.
    Throttled,
}

/// Per-key lookup failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LookupError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for LookupError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            LookupError::Decode(e.to_string())
        } else {
            LookupError::Transport(e.to_string())
        }
    }
}

/// One remote lookup per key.
///
/// Implementations must be Send + Sync; a single instance serves every
/// concurrent lookup in a batch.
#[async_trait]
pub trait SubscriberLookup: Send + Sync {
    async fn find_by_key(&self, key: &str) -> Result<LookupResponse, LookupError>;
}
