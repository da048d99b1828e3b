use crate::core::cache::{CacheEntry, CacheKey, PriceRepository, VolatileStore, is_fresh};
use crate::core::config::CacheConfig;
use crate::core::error::Result;
use crate::core::quote::{HistoryPoint, Quote, Timeframe};
use crate::store::{MemoryStore, RedisStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    /// Volatile lifetime of price and market data entries.
    pub price: Duration,
    /// Freshness window of persistent quotes.
    pub db: Duration,
    /// Volatile lifetime and persistent freshness of history series.
    pub history: Duration,
}

impl From<&CacheConfig> for CacheTtls {
    fn from(config: &CacheConfig) -> Self {
        CacheTtls {
            price: config.price_ttl(),
            db: config.db_ttl(),
            history: config.history_ttl(),
        }
    }
}

/// Two-tier cache: a volatile byte store in front of the persistent price
/// repository.
///
/// Store failures never escape this type. They are logged and the lookup is
/// treated as a miss, or the write is skipped.
pub struct TieredCache {
    volatile: Arc<dyn VolatileStore>,
    repository: Arc<dyn PriceRepository>,
    ttls: CacheTtls,
}

impl TieredCache {
    pub fn new(
        volatile: Arc<dyn VolatileStore>,
        repository: Arc<dyn PriceRepository>,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            volatile,
            repository,
            ttls,
        }
    }

    /// Picks the volatile store once: Redis when configured and reachable,
    /// otherwise the in-process store with its sweeper.
    pub async fn connect(config: &CacheConfig, repository: Arc<dyn PriceRepository>) -> Self {
        let volatile: Arc<dyn VolatileStore> = match &config.redis_url {
            Some(url) => match RedisStore::connect(url, config.connect_timeout()).await {
                Ok(store) => {
                    info!("Using Redis volatile cache at {}", url);
                    Arc::new(store)
                }
                Err(e) => {
                    warn!(error = %e, "Redis unreachable, falling back to in-process cache");
                    Arc::new(MemoryStore::with_sweeper(config.sweep_interval()))
                }
            },
            None => {
                debug!("No Redis configured, using in-process cache");
                Arc::new(MemoryStore::with_sweeper(config.sweep_interval()))
            }
        };
        Self::new(volatile, repository, CacheTtls::from(config))
    }

    /// Name of the active volatile store.
    pub fn volatile_name(&self) -> &'static str {
        self.volatile.name()
    }

    async fn volatile_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.volatile.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "Volatile cache read failed");
                return None;
            }
        };
        match serde_json::from_slice::<CacheEntry<T>>(&bytes) {
            Ok(entry) => Some(entry.payload),
            Err(e) => {
                warn!(key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    async fn volatile_set<T: Serialize>(&self, key: &str, payload: T, ttl: Duration) {
        let entry = CacheEntry::new(key, payload, ttl);
        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, error = %e, "Failed to encode cache entry");
                return;
            }
        };
        if let Err(e) = self.volatile.set(key, &bytes, ttl).await {
            warn!(key, error = %e, "Volatile cache write failed");
        }
    }

    /// Looks up a `Price` or `MarketData` entry.
    pub async fn get_quote(&self, key: CacheKey<'_>) -> Option<Quote> {
        let cache_key = key.to_string();
        if let Some(quote) = self.volatile_get::<Quote>(&cache_key).await {
            debug!(key = %cache_key, "Volatile cache hit");
            return Some(quote);
        }

        let stored = match self.repository.find_by_symbol(key.symbol()).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                debug!(key = %cache_key, "Cache miss");
                return None;
            }
            Err(e) => {
                warn!(key = %cache_key, error = %e, "Persistent cache read failed");
                return None;
            }
        };
        if !is_fresh(stored.updated_at, self.ttls.db.as_secs(), Utc::now()) {
            debug!(key = %cache_key, "Persistent entry is stale");
            return None;
        }
        if matches!(key, CacheKey::MarketData(_)) && !stored.quote.has_full_market_data() {
            debug!(key = %cache_key, "Persistent entry lacks market data");
            return None;
        }

        debug!(key = %cache_key, "Persistent cache hit, back-filling volatile store");
        self.volatile_set(&cache_key, &stored.quote, self.ttls.price)
            .await;
        Some(stored.quote)
    }

    /// Writes the persistent store first, then the volatile store.
    pub async fn put_quote(&self, key: CacheKey<'_>, quote: &Quote) {
        if let Err(e) = self.repository.upsert(quote).await {
            warn!(symbol = %quote.symbol, error = %e, "Persistent cache write failed");
        }
        self.volatile_set(&key.to_string(), quote, self.ttls.price)
            .await;
    }

    pub async fn get_history(&self, symbol: &str, timeframe: Timeframe) -> Option<Vec<HistoryPoint>> {
        let cache_key = CacheKey::History(symbol, timeframe).to_string();
        if let Some(points) = self.volatile_get::<Vec<HistoryPoint>>(&cache_key).await {
            debug!(key = %cache_key, "Volatile cache hit");
            return Some(points);
        }

        let stored = match self.repository.find_historical_prices(symbol, timeframe).await {
            Ok(Some(stored)) => stored,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %cache_key, error = %e, "Persistent cache read failed");
                return None;
            }
        };
        if !is_fresh(stored.updated_at, self.ttls.history.as_secs(), Utc::now()) {
            debug!(key = %cache_key, "Persistent series is stale");
            return None;
        }

        self.volatile_set(&cache_key, &stored.points, self.ttls.history)
            .await;
        Some(stored.points)
    }

    pub async fn put_history(&self, symbol: &str, timeframe: Timeframe, points: &[HistoryPoint]) {
        if let Err(e) = self
            .repository
            .replace_historical_prices(symbol, timeframe, points)
            .await
        {
            warn!(symbol, error = %e, "Persistent history write failed");
        }
        let mut sorted = points.to_vec();
        sorted.sort_by_key(|p| p.timestamp);
        self.volatile_set(
            &CacheKey::History(symbol, timeframe).to_string(),
            sorted,
            self.ttls.history,
        )
        .await;
    }

    /// Empties the volatile namespaces. Persistent rows are kept and age out
    /// through [`TieredCache::prune`].
    pub async fn clear(&self) -> Result<u64> {
        let mut removed = 0;
        for pattern in CacheKey::NAMESPACES {
            removed += self.volatile.clear(pattern).await?;
        }
        info!("Cleared {} cached entries from {}", removed, self.volatile_name());
        Ok(removed)
    }

    /// Deletes persistent records older than `cutoff`.
    pub async fn prune(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.repository.delete_stale(cutoff).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::error::MarketDataError;
    use crate::store::DiskRepository;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use tempfile::{TempDir, tempdir};

    /// Volatile store whose every call fails.
    pub(crate) struct FailingStore;

    #[async_trait]
    impl VolatileStore for FailingStore {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Err(MarketDataError::cache("connection reset"))
        }

        async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<()> {
            Err(MarketDataError::cache("connection reset"))
        }

        async fn clear(&self, _pattern: &str) -> Result<u64> {
            Err(MarketDataError::cache("connection reset"))
        }
    }

    pub(crate) fn sample_quote(symbol: &str) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            price: dec!(100.5),
            change_1h: None,
            change_24h: dec!(1.25),
            change_7d: None,
            change_30d: None,
            volume_24h: dec!(1000),
            market_cap: dec!(0),
            high_24h: None,
            low_24h: None,
            observed_at: Utc::now(),
            source: "TEST".to_string(),
        }
    }

    pub(crate) const TTLS: CacheTtls = CacheTtls {
        price: Duration::from_secs(60),
        db: Duration::from_secs(120),
        history: Duration::from_secs(300),
    };

    fn setup(ttls: CacheTtls) -> (TieredCache, Arc<MemoryStore>, Arc<DiskRepository>, TempDir) {
        let dir = tempdir().unwrap();
        let repository = Arc::new(DiskRepository::open(dir.path()).unwrap());
        let volatile = Arc::new(MemoryStore::new());
        let cache = TieredCache::new(volatile.clone(), repository.clone(), ttls);
        (cache, volatile, repository, dir)
    }

    #[tokio::test]
    async fn test_put_then_get_quote() {
        let (cache, volatile, _repo, _dir) = setup(TTLS);
        assert!(cache.get_quote(CacheKey::Price("BTC")).await.is_none());

        let quote = sample_quote("BTC");
        cache.put_quote(CacheKey::Price("BTC"), &quote).await;
        assert_eq!(cache.get_quote(CacheKey::Price("BTC")).await, Some(quote));
        assert!(volatile.get("price:BTC").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_persistent_hit_backfills_volatile() {
        let (cache, volatile, repo, _dir) = setup(TTLS);
        let quote = sample_quote("ETH");
        repo.upsert(&quote).await.unwrap();
        assert!(volatile.is_empty().await);

        assert_eq!(cache.get_quote(CacheKey::Price("ETH")).await, Some(quote));
        assert!(volatile.get("price:ETH").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stale_persistent_entry_is_miss() {
        let ttls = CacheTtls {
            db: Duration::ZERO,
            ..TTLS
        };
        let (cache, volatile, repo, _dir) = setup(ttls);
        repo.upsert(&sample_quote("ETH")).await.unwrap();

        assert!(cache.get_quote(CacheKey::Price("ETH")).await.is_none());
        assert!(volatile.is_empty().await);
    }

    #[tokio::test]
    async fn test_market_data_requires_full_record() {
        let (cache, _volatile, repo, _dir) = setup(TTLS);
        let mut quote = sample_quote("SOL");
        repo.upsert(&quote).await.unwrap();
        assert!(cache.get_quote(CacheKey::MarketData("SOL")).await.is_none());
        // The plain price lookup accepts the same record
        assert!(cache.get_quote(CacheKey::Price("SOL")).await.is_some());

        quote.change_1h = Some(dec!(0.1));
        quote.change_7d = Some(dec!(2));
        quote.change_30d = Some(dec!(-3));
        repo.upsert(&quote).await.unwrap();
        assert_eq!(
            cache.get_quote(CacheKey::MarketData("SOL")).await,
            Some(quote)
        );
    }

    #[tokio::test]
    async fn test_volatile_failure_is_absorbed() {
        let dir = tempdir().unwrap();
        let repository = Arc::new(DiskRepository::open(dir.path()).unwrap());
        let cache = TieredCache::new(Arc::new(FailingStore), repository, TTLS);

        let quote = sample_quote("BTC");
        cache.put_quote(CacheKey::Price("BTC"), &quote).await;
        assert_eq!(cache.get_quote(CacheKey::Price("BTC")).await, Some(quote));
        assert!(cache.clear().await.is_err());
    }

    #[tokio::test]
    async fn test_history_round_trip() {
        let (cache, volatile, _repo, _dir) = setup(TTLS);
        let points = vec![
            HistoryPoint {
                timestamp: Utc::now(),
                price: dec!(2),
                volume: dec!(1),
            },
            HistoryPoint {
                timestamp: Utc::now() - chrono::Duration::hours(1),
                price: dec!(1),
                volume: dec!(1),
            },
        ];
        cache.put_history("BTC", Timeframe::OneDay, &points).await;

        let cached = cache.get_history("BTC", Timeframe::OneDay).await.unwrap();
        assert_eq!(cached, vec![points[1], points[0]]);
        assert!(cache.get_history("BTC", Timeframe::OneYear).await.is_none());

        // Served from the persistent store once the volatile copy is gone
        volatile.clear("history:*").await.unwrap();
        let cached = cache.get_history("BTC", Timeframe::OneDay).await.unwrap();
        assert_eq!(cached, vec![points[1], points[0]]);
    }

    #[tokio::test]
    async fn test_clear_only_touches_volatile_namespaces() {
        let (cache, volatile, repo, _dir) = setup(TTLS);
        cache
            .put_quote(CacheKey::Price("BTC"), &sample_quote("BTC"))
            .await;
        cache
            .put_quote(CacheKey::MarketData("ETH"), &sample_quote("ETH"))
            .await;
        volatile
            .set("session:abc", b"keep", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.clear().await.unwrap(), 2);
        assert!(volatile.get("session:abc").await.unwrap().is_some());
        assert!(repo.find_by_symbol("BTC").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_connect_falls_back_to_memory() {
        let dir = tempdir().unwrap();
        let repository = Arc::new(DiskRepository::open(dir.path()).unwrap());
        let config = CacheConfig {
            redis_url: Some("redis://127.0.0.1:1".to_string()),
            connect_timeout_secs: 1,
            ..CacheConfig::default()
        };
        let cache = TieredCache::connect(&config, repository).await;
        assert_eq!(cache.volatile_name(), "memory");

        let quote = sample_quote("BTC");
        cache.put_quote(CacheKey::Price("BTC"), &quote).await;
        assert_eq!(cache.get_quote(CacheKey::Price("BTC")).await, Some(quote));
    }
}
