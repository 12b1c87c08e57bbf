//! Response Cache (C6): request fingerprinting and TTL-based storage (§4.6).
//!
//! Guarantees at most one stored entry per fingerprint; concurrent `set`s
//! for the same key are last-writer-wins (DashMap's per-key atomicity gives
//! us this for free). Error responses are never cached; responses with
//! `temperature > 0` are cached only when the adapter opts in.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Mutex;

use crate::contract::Request;

/// A stored response plus the bookkeeping §3 requires (`hitCount`,
/// `expiresAt`) for cache-hit metadata decoration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    pub cache_key: String,
    pub provider_name: String,
    pub model: String,
    pub response_text: String,
    pub metadata: HashMap<String, Value>,
    pub tokens_used: u32,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub hit_count: u64,
}

impl CachedResponse {
    pub fn new(
        cache_key: impl Into<String>,
        provider_name: impl Into<String>,
        model: impl Into<String>,
        response_text: impl Into<String>,
        tokens_used: u32,
        duration_ms: u64,
        ttl: Duration,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            cache_key: cache_key.into(),
            provider_name: provider_name.into(),
            model: model.into(),
            response_text: response_text.into(),
            metadata: HashMap::new(),
            tokens_used,
            duration_ms,
            created_at,
            expires_at: created_at + chrono::Duration::from_std(ttl).unwrap_or_default(),
            hit_count: 0,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Response cache contract (§4.6). Implementations must never return an
/// entry whose `expiresAt <= now` and must never cache error responses.
pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &str) -> Option<CachedResponse>;
    fn set(&self, key: &str, response: CachedResponse);
    fn remove(&self, key: &str);
    fn remove_by_prefix(&self, prefix: &str);
    fn purge_expired(&self);
}

/// LRU-bounded, single-process cache. The reference implementation used by
/// tests and small deployments.
pub struct InMemoryResponseCache {
    entries: Mutex<LruCache<String, CachedResponse>>,
}

impl InMemoryResponseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap())),
        }
    }
}

impl ResponseCache for InMemoryResponseCache {
    fn get(&self, key: &str) -> Option<CachedResponse> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(key) {
            Some(cached) if !cached.is_expired() => {
                cached.hit_count += 1;
                Some(cached.clone())
            }
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, response: CachedResponse) {
        let mut entries = self.entries.lock().unwrap();
        entries.put(key.to_string(), response);
    }

    fn remove(&self, key: &str) {
        self.entries.lock().unwrap().pop(key);
    }

    fn remove_by_prefix(&self, prefix: &str) {
        let mut entries = self.entries.lock().unwrap();
        let stale: Vec<String> = entries
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            entries.pop(&key);
        }
    }

    fn purge_expired(&self) {
        let mut entries = self.entries.lock().unwrap();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, v)| v.is_expired())
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            entries.pop(&key);
        }
    }
}

/// Two-tier cache: a bounded local LRU backed by an unbounded [`DashMap`]
/// standing in for a distributed store shared across instances. Writes land
/// in both tiers; reads prefer local, falling back to the shared tier.
pub struct DistributedResponseCache {
    local: InMemoryResponseCache,
    shared: DashMap<String, CachedResponse>,
}

impl DistributedResponseCache {
    pub fn new(local_capacity: usize) -> Self {
        Self {
            local: InMemoryResponseCache::new(local_capacity),
            shared: DashMap::new(),
        }
    }
}

impl ResponseCache for DistributedResponseCache {
    fn get(&self, key: &str) -> Option<CachedResponse> {
        if let Some(hit) = self.local.get(key) {
            return Some(hit);
        }
        match self.shared.get(key) {
            Some(entry) if !entry.is_expired() => {
                let mut cached = entry.clone();
                cached.hit_count += 1;
                self.shared.insert(key.to_string(), cached.clone());
                self.local.set(key, cached.clone());
                Some(cached)
            }
            Some(_) => {
                self.shared.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, response: CachedResponse) {
        self.shared.insert(key.to_string(), response.clone());
        self.local.set(key, response);
    }

    fn remove(&self, key: &str) {
        self.shared.remove(key);
        self.local.remove(key);
    }

    fn remove_by_prefix(&self, prefix: &str) {
        let stale: Vec<String> = self
            .shared
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|k| k.starts_with(prefix))
            .collect();
        for key in stale {
            self.shared.remove(&key);
        }
        self.local.remove_by_prefix(prefix);
    }

    fn purge_expired(&self) {
        let expired: Vec<String> = self
            .shared
            .iter()
            .filter(|entry| entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect();
        for key in expired {
            self.shared.remove(&key);
        }
        self.local.purge_expired();
    }
}

/// Computes the deterministic fingerprint and cache key for a request
/// against a given provider/model (§4.6).
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    /// `fingerprint(request) = hash(providerName . model . sha256(prompt) .
    /// maxTokens . temperature(2dp) . sha256(serialize(additionalParameters)))`
    pub fn fingerprint(provider_name: &str, model: &str, request: &Request) -> String {
        let prompt_hash = Self::sha256_hex(&request.prompt);
        let params_json = serde_json::to_string(&request.additional_parameters).unwrap_or_default();
        let params_hash = Self::sha256_hex(&params_json);

        let mut hasher = Sha256::new();
        hasher.update(provider_name.as_bytes());
        hasher.update(model.as_bytes());
        hasher.update(prompt_hash.as_bytes());
        hasher.update(request.max_tokens.to_le_bytes());
        hasher.update(format!("{:.2}", request.temperature).as_bytes());
        hasher.update(params_hash.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// `"<providerLower>_<fingerprint>"`
    pub fn cache_key(provider_name: &str, model: &str, request: &Request) -> String {
        format!("{}_{}", provider_name.to_lowercase(), Self::fingerprint(provider_name, model, request))
    }

    fn sha256_hex(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Whether a just-completed, successful call should be cached, given the
/// adapter's opt-in for nondeterministic (`temperature > 0`) responses.
/// Open question, decided: default policy caches everything; an adapter
/// that sets `cache_nondeterministic = false` skips `temperature > 0`.
pub fn should_cache(temperature: f32, cache_nondeterministic: bool) -> bool {
    temperature <= 0.0 || cache_nondeterministic
}

/// Shared pointer alias used by adapters wiring a cache into their pipeline.
pub type SharedResponseCache = Arc<dyn ResponseCache>;
