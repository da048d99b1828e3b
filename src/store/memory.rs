use crate::core::cache::VolatileStore;
use crate::core::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

struct CacheValue {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-process volatile store, used when Redis cannot be reached at startup.
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<String, CacheValue>>>,
    sweeper: Option<JoinHandle<()>>,
}

impl MemoryStore {
    /// Creates a new MemoryStore instance
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            sweeper: None,
        }
    }

    /// Creates a store with a background task evicting expired entries every
    /// `interval`. The task stops when the store is dropped.
    pub fn with_sweeper(interval: Duration) -> Self {
        let inner = Arc::new(Mutex::new(HashMap::new()));
        let sweep_target = Arc::clone(&inner);
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = purge(&sweep_target).await;
                if evicted > 0 {
                    debug!("Memory store sweep evicted {} entries", evicted);
                }
            }
        });
        Self {
            inner,
            sweeper: Some(sweeper),
        }
    }

    /// Removes expired entries and returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        purge(&self.inner).await
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

async fn purge(inner: &Mutex<HashMap<String, CacheValue>>) -> usize {
    let now = Instant::now();
    let mut cache = inner.lock().await;
    let before = cache.len();
    cache.retain(|_, entry| entry.expires_at > now);
    before - cache.len()
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

/// Matches `key` against a glob pattern where `*` matches any run of characters.
pub(crate) fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if !key.starts_with(first) || key.len() < first.len() + last.len() || !key.ends_with(last) {
        return false;
    }

    let mut rest = &key[first.len()..key.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    true
}

#[async_trait]
impl VolatileStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let cache = self.inner.lock().await;
        if let Some(entry) = cache.get(key) {
            if entry.expires_at <= Instant::now() {
                debug!("Cache entry expired for key: {}", key);
                return Ok(None);
            }
            debug!("Cache HIT for key: {}", key);
            return Ok(Some(entry.value.clone()));
        }
        debug!("Cache MISS for key: {}", key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let cache_value = CacheValue {
            value: value.to_vec(),
            expires_at: Instant::now() + ttl,
        };

        let mut cache = self.inner.lock().await;
        debug!("Cache PUT for key: {}", key);
        cache.insert(key.to_string(), cache_value);
        Ok(())
    }

    async fn clear(&self, pattern: &str) -> Result<u64> {
        let mut cache = self.inner.lock().await;
        let before = cache.len();
        cache.retain(|key, _| !glob_match(pattern, key));
        let removed = (before - cache.len()) as u64;
        debug!("Cache CLEAR for pattern {}: {} removed", pattern, removed);
        Ok(removed)
    }
}
