//! Cache key derivation.
//!
//! A key is `{service}:{sha256}` where the digest covers the method, the
//! normalized path and the whitelisted query/body parameters in canonical
//! (sorted) form. Parameters outside the whitelist never reach the digest,
//! which keeps key cardinality bounded. The service prefix lets
//! [`ResponseCache::invalidate_prefix`](crate::cache::ResponseCache::invalidate_prefix)
//! drop every entry of one backend.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// Separates the service name from the digest. Service names may not
/// contain it, so one service's prefix never matches another's keys.
pub const KEY_SEPARATOR: char = ':';

/// Request fields that can take part in a cache key.
#[derive(Debug, Clone, Copy)]
pub struct KeyInput<'a> {
    pub service: &'a str,
    pub method: &'a str,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub body: &'a [u8],
}

/// Derive the cache key for a request.
pub fn derive_key(input: KeyInput<'_>, whitelist: &[String]) -> String {
    let canonical = json!({
        "method": input.method.to_ascii_uppercase(),
        "path": normalize_path(input.path),
        "query": whitelisted_query(input.query, whitelist),
        "body": whitelisted_body(input.body, whitelist),
    });

    let mut hasher = Sha256::new();
    hasher.update(input.service.as_bytes());
    hasher.update([0u8]);
    hasher.update(canonical.to_string().as_bytes());
    let digest = hasher.finalize();

    let mut key = String::with_capacity(input.service.len() + 1 + digest.len() * 2);
    key.push_str(input.service);
    key.push(KEY_SEPARATOR);
    for byte in digest {
        key.push_str(&format!("{:02x}", byte));
    }
    key
}

/// Prefix shared by every key of `service`.
pub fn service_prefix(service: &str) -> String {
    format!("{}{}", service, KEY_SEPARATOR)
}

/// Collapse repeated slashes and drop a trailing slash (root stays `/`).
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

fn whitelisted_query(query: Option<&str>, whitelist: &[String]) -> BTreeMap<String, Vec<String>> {
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let Some(query) = query else {
        return params;
    };

    for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if whitelist.iter().any(|w| w.as_str() == name) {
            params.entry(name.into_owned()).or_default().push(value.into_owned());
        }
    }
    params
}

/// Top-level fields of a JSON object body. Other bodies contribute nothing.
fn whitelisted_body(body: &[u8], whitelist: &[String]) -> BTreeMap<String, Value> {
    if body.is_empty() || whitelist.is_empty() {
        return BTreeMap::new();
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) => fields
            .into_iter()
            .filter(|(name, _)| whitelist.iter().any(|w| w == name))
            .collect(),
        _ => BTreeMap::new(),
    }
}
