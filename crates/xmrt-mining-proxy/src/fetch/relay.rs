use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::transport::JsonTransport;
use crate::error::{ProxyError, Result};
use crate::metrics::RELAY_FALLBACKS;

/// How a relay wraps the body it fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Envelope {
    /// `{"contents": "<json text>", "status": {"http_code": 200}}` (allorigins `/get`).
    Contents,
    /// The upstream body, untouched.
    Direct,
}

impl Envelope {
    fn open(&self, body: Value) -> Result<Value> {
        match self {
            Envelope::Direct => Ok(body),
            Envelope::Contents => {
                if let Some(code) = body.pointer("/status/http_code").and_then(Value::as_u64) {
                    if !(200..300).contains(&code) {
                        return Err(ProxyError::RelayStatus(code as u16));
                    }
                }
                match body.get("contents") {
                    Some(Value::String(text)) => Ok(serde_json::from_str(text)?),
                    Some(Value::Null) | None => {
                        Err(ProxyError::Envelope("relay response has no contents".into()))
                    }
                    Some(inner) => Ok(inner.clone()),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEndpoint {
    pub prefix: String,
    pub envelope: Envelope,
}

impl RelayEndpoint {
    pub fn new(prefix: impl Into<String>, envelope: Envelope) -> Self {
        Self {
            prefix: prefix.into(),
            envelope,
        }
    }

    /// Known providers get their envelope from the prefix; anything else is
    /// assumed to pass the body through.
    pub fn from_prefix(prefix: &str) -> Self {
        let envelope = if prefix.contains("allorigins") {
            Envelope::Contents
        } else {
            Envelope::Direct
        };
        Self::new(prefix.trim(), envelope)
    }

    pub fn relay_url(&self, target_url: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(target_url.as_bytes()).collect();
        format!("{}{}", self.prefix, encoded)
    }
}

/// Walks an ordered relay list until one of them yields a JSON body.
#[derive(Clone)]
pub struct RelayResolver {
    relays: Vec<RelayEndpoint>,
    transport: Arc<dyn JsonTransport>,
    attempt_timeout: Option<Duration>,
}

impl RelayResolver {
    pub fn new(relays: Vec<RelayEndpoint>, transport: Arc<dyn JsonTransport>) -> Self {
        Self {
            relays,
            transport,
            attempt_timeout: None,
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn relays(&self) -> &[RelayEndpoint] {
        &self.relays
    }

    /// Tries each relay once, in order. Fails with
    /// [`ProxyError::AllRelaysExhausted`] after exactly `relays.len()` attempts.
    pub async fn resolve(&self, target_url: &str) -> Result<Value> {
        let mut last_error: Option<ProxyError> = None;

        for (index, relay) in self.relays.iter().enumerate() {
            match self.try_relay(relay, target_url).await {
                Ok(value) => {
                    if index > 0 {
                        RELAY_FALLBACKS.inc();
                        debug!("Relay #{} ({}) answered after {} failures", index, relay.prefix, index);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    warn!("Relay #{} ({}) failed: {}", index, relay.prefix, e);
                    last_error = Some(e);
                }
            }
        }

        Err(ProxyError::AllRelaysExhausted {
            attempts: self.relays.len(),
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no relays configured".to_string()),
        })
    }

    async fn try_relay(&self, relay: &RelayEndpoint, target_url: &str) -> Result<Value> {
        let url = relay.relay_url(target_url);
        let fetch = self.transport.get_json(&url);
        let body = match self.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, fetch)
                .await
                .map_err(|_| ProxyError::Timeout(limit))?,
            None => fetch.await,
        }
        .map_err(|e| match e {
            ProxyError::UpstreamStatus(status) => ProxyError::RelayStatus(status),
            other => other,
        })?;
        relay.envelope.open(body)
    }
}
