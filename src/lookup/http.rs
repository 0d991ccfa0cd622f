//! HTTP lookup against the subscriber API.
//!
//! GET `<api_url>?<param>=<key>` with a bearer credential. A 429 means
//! throttled; any other non-2xx is a per-key failure.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::{LookupError, LookupResponse, Subscriber, SubscriberLookup};
use crate::config::EnricherConfig;
use crate::error::{EnrichError, Result};

const TOO_MANY_REQUESTS: u16 = 429;
const ERROR_BODY_LIMIT: usize = 200;

pub struct HttpSubscriberLookup {
    http: Client,
    api_url: String,
    lookup_param: String,
    token: String,
}

impl HttpSubscriberLookup {
    /// Create a client with an explicit credential.
    pub fn new(config: &EnricherConfig, token: String) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| EnrichError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            lookup_param: config.lookup_param.clone(),
            token,
        })
    }

    /// Create a client reading the credential from the configured variable.
    pub fn from_config(config: &EnricherConfig) -> Result<Self> {
        let token = config.api_token()?;
        Self::new(config, token)
    }
}

#[async_trait]
impl SubscriberLookup for HttpSubscriberLookup {
    async fn find_by_key(&self, key: &str) -> std::result::Result<LookupResponse, LookupError> {
        let response = self
            .http
            .get(&self.api_url)
            .bearer_auth(&self.token)
            .header("Content-Type", "application/json")
            .query(&[(self.lookup_param.as_str(), key)])
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        interpret_response(status, &body)
    }
}

#[derive(Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct ApiSubscriber {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    custom_fields: Vec<ApiCustomField>,
}

#[derive(Deserialize)]
struct ApiCustomField {
    name: String,
    #[serde(default)]
    value: Value,
}

/// Map an HTTP status and body onto a lookup response.
pub fn interpret_response(
    status: u16,
    body: &str,
) -> std::result::Result<LookupResponse, LookupError> {
    if status == TOO_MANY_REQUESTS {
        return Ok(LookupResponse::Throttled);
    }
    if !(200..300).contains(&status) {
        return Err(LookupError::Status {
            status,
            body: body.chars().take(ERROR_BODY_LIMIT).collect(),
        });
    }

    let envelope: ApiEnvelope =
        serde_json::from_str(body).map_err(|e| LookupError::Decode(e.to_string()))?;

    if envelope.status.as_deref() != Some("success") {
        return Ok(LookupResponse::NotFound);
    }

    let data = envelope.data;
    match &data {
        Value::Null => return Ok(LookupResponse::NotFound),
        Value::Object(map) if map.is_empty() => return Ok(LookupResponse::NotFound),
        Value::Array(items) if items.is_empty() => return Ok(LookupResponse::NotFound),
        Value::Object(_) => {}
        other => {
            return Err(LookupError::Decode(format!(
                "unexpected data payload: {}",
                other
            )))
        }
    }

    let raw: ApiSubscriber =
        serde_json::from_value(data).map_err(|e| LookupError::Decode(e.to_string()))?;
    Ok(LookupResponse::Found(into_subscriber(raw)))
}

fn into_subscriber(raw: ApiSubscriber) -> Subscriber {
    let mut custom_fields = HashMap::with_capacity(raw.custom_fields.len());
    for field in raw.custom_fields {
        custom_fields
            .entry(field.name)
            .or_insert_with(|| value_to_string(field.value));
    }
    Subscriber {
        id: value_to_string(raw.id),
        custom_fields,
    }
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}
