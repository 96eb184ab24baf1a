//! Shared key/value cache.
//!
//! In-memory implementation of the cache contract the pipeline memoizes
//! upstream responses through: TTL'd `get`/`set`, TTL-preserving `update`,
//! wildcard `keys`, and a singleflight `get_or_fetch` that guarantees at
//! most one concurrent build per key. Values are stored as JSON so callers
//! stay typed at the edges.

use anyhow::Result;
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

#[derive(Debug, Clone)]
struct Entry {
    value: serde_json::Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Clone, Default)]
pub struct SharedCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    inflight: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl SharedCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// In-memory storage is ready as soon as it exists; networked
    /// implementations of the same contract block here instead.
    pub async fn wait_until_ready(&self) {}

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => match serde_json::from_value(entry.value.clone()) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key = %key, error = %e, "Cached value failed to deserialize, dropping");
                    entries.remove(key);
                    None
                }
            },
            None => None,
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Ok(json) = serde_json::to_value(value) else {
            warn!(key = %key, "Value failed to serialize, not caching");
            return;
        };
        let entry = Entry {
            value: json,
            expires_at: Some(Instant::now() + ttl),
        };
        self.entries.lock().await.insert(key.to_string(), entry);
    }

    /// Replaces the value of an existing key, keeping its remaining TTL.
    /// Returns false (and stores nothing) when the key is absent or
    /// already expired.
    pub async fn update<T: Serialize>(&self, key: &str, value: &T) -> bool {
        let Ok(json) = serde_json::to_value(value) else {
            warn!(key = %key, "Value failed to serialize, not caching");
            return false;
        };
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.value = json;
                true
            }
            Some(_) => {
                entries.remove(key);
                false
            }
            None => false,
        }
    }

    pub async fn delete(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    /// Lists live keys matching a `*`-wildcard pattern.
    pub async fn keys(&self, pattern: &str) -> Vec<String> {
        let regex = pattern_to_regex(pattern);
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, entry| !entry.is_expired(now));
        entries
            .keys()
            .filter(|key| regex.as_ref().is_none_or(|re| re.is_match(key)))
            .cloned()
            .collect()
    }

    /// Returns the cached value for `key`, or builds it with at most one
    /// concurrent builder per key; concurrent callers await the winner's
    /// result out of the cache.
    pub async fn get_or_fetch<T, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        build: impl FnOnce() -> Fut,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.get(key).await {
            return Ok(hit);
        }

        let gate = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = gate.lock().await;

        // A concurrent caller may have built the value while we waited.
        if let Some(hit) = self.get(key).await {
            return Ok(hit);
        }

        let result = build().await;
        if let Ok(value) = &result {
            self.set(key, value, ttl).await;
        }
        self.inflight.lock().await.remove(key);
        result
    }
}

fn pattern_to_regex(pattern: &str) -> Option<regex::Regex> {
    let mut anchored = String::with_capacity(pattern.len() + 8);
    anchored.push('^');
    for (position, part) in pattern.split('*').enumerate() {
        if position > 0 {
            anchored.push_str(".*");
        }
        anchored.push_str(&regex::escape(part));
    }
    anchored.push('$');
    match regex::Regex::new(&anchored) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(pattern = %pattern, error = %e, "Invalid key pattern");
            None
        }
    }
}
