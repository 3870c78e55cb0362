//! Cache entries and the cached response representation.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ProxyError, Result};

/// Upstream response as stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(serialize_with = "serialize_body", deserialize_with = "deserialize_body")]
    pub body: Bytes,
}

impl CachedResponse {
    /// Capture status, end-to-end headers and body of an upstream response.
    pub fn new(status: StatusCode, headers: &HeaderMap, body: Bytes) -> Self {
        let headers = headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            status: status.as_u16(),
            headers,
            body,
        }
    }

    /// Rebuild status and headers. Fails with
    /// [`ProxyError::CacheCorruptEntry`] if anything does not parse.
    pub fn decode(&self, key: &str) -> Result<(StatusCode, HeaderMap)> {
        let corrupt = || ProxyError::CacheCorruptEntry(key.to_string());

        let status = StatusCode::from_u16(self.status).map_err(|_| corrupt())?;
        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| corrupt())?;
            let value = HeaderValue::from_str(value).map_err(|_| corrupt())?;
            headers.append(name, value);
        }
        Ok((status, headers))
    }
}

fn serialize_body<S: Serializer>(body: &Bytes, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_bytes(body)
}

fn deserialize_body<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Bytes, D::Error> {
    Vec::<u8>::deserialize(deserializer).map(Bytes::from)
}

/// One cached value and its bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: CachedResponse,
    /// Unix milliseconds.
    pub created_at_ms: u64,
    /// Unix milliseconds.
    pub last_access_ms: u64,
    pub ttl_ms: u64,
    pub hit_count: u64,
}

impl CacheEntry {
    pub fn new(key: String, value: CachedResponse, ttl: Duration) -> Self {
        let now = current_timestamp_ms();
        Self {
            key,
            value,
            created_at_ms: now,
            last_access_ms: now,
            ttl_ms: ttl.as_millis() as u64,
            hit_count: 0,
        }
    }

    /// Expired once strictly more than `ttl` has passed since creation.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) > self.ttl_ms
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    pub fn size_bytes(&self) -> usize {
        self.value.body.len()
    }
}

/// Current Unix time in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
