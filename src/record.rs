//! Enriched record model and lookup outcomes.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Normalize an identity key: trimmed and lowercased.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// One row of the checkpoint / output table.
///
/// Field order is the column order on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub email: String,
    #[serde(default, alias = "manychat_id")]
    pub subscriber_id: Option<String>,
    #[serde(default)]
    pub shopify_domain: Option<String>,
    #[serde(default)]
    pub telephone: Option<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub processed_at: DateTime<Utc>,
}

/// Accepts RFC 3339 as well as the offset-less ISO timestamps written by
/// earlier versions of the extractor (read as UTC).
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| {
        serde::de::Error::custom(format!("invalid processed_at timestamp: {raw:?}"))
    })
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

impl EnrichmentRecord {
    /// A record carrying only the key and the processing time. Used for
    /// empty and failed lookups.
    pub fn bare(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            subscriber_id: None,
            shopify_domain: None,
            telephone: None,
            processed_at: Utc::now(),
        }
    }

    pub fn is_enriched(&self) -> bool {
        self.subscriber_id.is_some() || self.shopify_domain.is_some() || self.telephone.is_some()
    }
}

/// Terminal result of looking up one key.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    /// A subscriber matched; the record is fully populated.
    Success(EnrichmentRecord),
    /// The API answered but had no matching subscriber.
    Empty(EnrichmentRecord),
    /// The lookup failed for this key only.
    Failed {
        record: EnrichmentRecord,
        message: String,
    },
}

impl LookupOutcome {
    pub fn into_record(self) -> EnrichmentRecord {
        match self {
            LookupOutcome::Success(record) | LookupOutcome::Empty(record) => record,
            LookupOutcome::Failed { record, .. } => record,
        }
    }
}
