//! Public key retrieval for signed tokens.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;

use crate::error::GatewayError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of PEM-encoded public keys, looked up by key id.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn public_key(&self, key_id: &str) -> Result<String, GatewayError>;
}

/// Fetches keys from the device key endpoint.
///
/// The key id is substituted for `{id}` in the URI, or appended as the last
/// path segment. The body is either the PEM itself or `{"public_key": "<pem>"}`.
pub struct HttpKeySource {
    client: reqwest::Client,
    uri: String,
}

#[derive(Deserialize)]
struct KeyResponse {
    public_key: String,
}

impl HttpKeySource {
    pub fn new(uri: impl Into<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(format!("stream-gateway/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Configuration(format!("Failed to build key client: {}", e)))?;

        Ok(Self {
            client,
            uri: uri.into(),
        })
    }

    pub fn key_url(&self, key_id: &str) -> String {
        if self.uri.contains("{id}") {
            self.uri.replace("{id}", key_id)
        } else {
            format!("{}/{}", self.uri.trim_end_matches('/'), key_id)
        }
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    async fn public_key(&self, key_id: &str) -> Result<String, GatewayError> {
        let url = self.key_url(key_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| GatewayError::Authentication(format!("Key fetch from {} failed: {}", url, e)))?;

        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Authentication(format!("Key body from {} unreadable: {}", url, e)))?;

        parse_key_body(&body)
    }
}

fn parse_key_body(body: &str) -> Result<String, GatewayError> {
    let body = body.trim();
    let pem = if body.starts_with('{') {
        serde_json::from_str::<KeyResponse>(body)
            .map_err(|e| GatewayError::Authentication(format!("Malformed key response: {}", e)))?
            .public_key
    } else {
        body.to_string()
    };

    if !pem.contains("-----BEGIN") {
        return Err(GatewayError::Authentication(
            "Key response does not contain a PEM block".to_string(),
        ));
    }
    Ok(pem)
}

/// Fixed set of keys, for tests and pinned deployments.
#[derive(Debug, Clone, Default)]
pub struct StaticKeySource {
    keys: HashMap<String, String>,
}

impl StaticKeySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key_id: impl Into<String>, pem: impl Into<String>) -> Self {
        self.keys.insert(key_id.into(), pem.into());
        self
    }
}

#[async_trait]
impl KeySource for StaticKeySource {
    async fn public_key(&self, key_id: &str) -> Result<String, GatewayError> {
        self.keys
            .get(key_id)
            .cloned()
            .ok_or_else(|| GatewayError::Authentication(format!("Unknown key id: {}", key_id)))
    }
}

struct CachedKey {
    pem: String,
    fetched_at: Instant,
}

/// Per key id cache in front of another source. Failures are not cached.
pub struct CachedKeySource {
    inner: Arc<dyn KeySource>,
    ttl: Duration,
    cache: DashMap<String, CachedKey>,
}

impl CachedKeySource {
    pub fn new(inner: Arc<dyn KeySource>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: DashMap::new(),
        }
    }

    pub fn invalidate(&self, key_id: &str) {
        self.cache.remove(key_id);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    fn cached(&self, key_id: &str) -> Option<String> {
        let entry = self.cache.get(key_id)?;
        if entry.fetched_at.elapsed() < self.ttl {
            Some(entry.pem.clone())
        } else {
            None
        }
    }
}

#[async_trait]
impl KeySource for CachedKeySource {
    async fn public_key(&self, key_id: &str) -> Result<String, GatewayError> {
        if let Some(pem) = self.cached(key_id) {
            return Ok(pem);
        }

        let pem = self.inner.public_key(key_id).await?;
        if !self.ttl.is_zero() {
            self.cache.insert(
                key_id.to_string(),
                CachedKey {
                    pem: pem.clone(),
                    fetched_at: Instant::now(),
                },
            );
        }
        tracing::debug!(key_id = %key_id, "Fetched device public key");
        Ok(pem)
    }
}
