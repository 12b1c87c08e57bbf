//! API Key Manager (C10): the integration seam between an adapter and
//! whatever credential store the embedding application uses.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

#[async_trait]
pub trait ApiKeyManager: Send + Sync {
    /// The key to use for `provider` right now, or `None` if unconfigured
    /// (adapters fall back to their static `ProviderConfiguration::api_key`).
    async fn current_key(&self, provider: &str) -> Option<String>;

    /// Advances to the next key for `provider`, if the implementation keeps
    /// more than one. A no-op for managers with a single fixed key.
    async fn rotate(&self, provider: &str);

    /// Whether `key` is one this manager currently recognizes for `provider`.
    async fn validate(&self, provider: &str, key: &str) -> bool;
}

/// One fixed key per provider, taken verbatim from configuration.
pub struct StaticApiKeyManager {
    keys: HashMap<String, String>,
}

impl StaticApiKeyManager {
    pub fn new(keys: HashMap<String, String>) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl ApiKeyManager for StaticApiKeyManager {
    async fn current_key(&self, provider: &str) -> Option<String> {
        self.keys.get(provider).cloned()
    }

    async fn rotate(&self, _provider: &str) {}

    async fn validate(&self, provider: &str, key: &str) -> bool {
        self.keys.get(provider).is_some_and(|k| k == key)
    }
}

/// Round-robins through a configured pool of keys per provider, so a single
/// adapter can spread load (or work around a per-key rate limit) across
/// several upstream credentials.
pub struct InMemoryRotatingApiKeyManager {
    pools: HashMap<String, Vec<String>>,
    cursors: RwLock<HashMap<String, usize>>,
}

impl InMemoryRotatingApiKeyManager {
    pub fn new(pools: HashMap<String, Vec<String>>) -> Self {
        Self { pools, cursors: RwLock::new(HashMap::new()) }
    }
}

#[async_trait]
impl ApiKeyManager for InMemoryRotatingApiKeyManager {
    async fn current_key(&self, provider: &str) -> Option<String> {
        let pool = self.pools.get(provider)?;
        if pool.is_empty() {
            return None;
        }
        let cursors = self.cursors.read().await;
        let index = cursors.get(provider).copied().unwrap_or(0) % pool.len();
        Some(pool[index].clone())
    }

    async fn rotate(&self, provider: &str) {
        let Some(pool) = self.pools.get(provider) else { return };
        if pool.is_empty() {
            return;
        }
        let mut cursors = self.cursors.write().await;
        let next = (cursors.get(provider).copied().unwrap_or(0) + 1) % pool.len();
        cursors.insert(provider.to_string(), next);
    }

    async fn validate(&self, provider: &str, key: &str) -> bool {
        self.pools.get(provider).is_some_and(|pool| pool.iter().any(|k| k == key))
    }
}
