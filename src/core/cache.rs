//! Store contracts used by the tiered cache.

use crate::core::error::Result;
use crate::core::quote::{HistoryPoint, Quote, Timeframe};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;

/// Namespaced cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey<'a> {
    Price(&'a str),
    MarketData(&'a str),
    History(&'a str, Timeframe),
}

impl CacheKey<'_> {
    pub const NAMESPACES: [&'static str; 3] = ["price:*", "market-data:*", "history:*"];

    pub fn symbol(&self) -> &str {
        match self {
            CacheKey::Price(s) | CacheKey::MarketData(s) | CacheKey::History(s, _) => s,
        }
    }
}

impl Display for CacheKey<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Price(symbol) => write!(f, "price:{symbol}"),
            CacheKey::MarketData(symbol) => write!(f, "market-data:{symbol}"),
            CacheKey::History(symbol, timeframe) => write!(f, "history:{symbol}:{timeframe}"),
        }
    }
}

/// A cached payload together with the time it was written and its lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub key: String,
    pub payload: T,
    pub written_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl<T> CacheEntry<T> {
    pub fn new(key: impl Into<String>, payload: T, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            payload,
            written_at: Utc::now(),
            ttl_seconds: ttl.as_secs(),
        }
    }

    /// Fresh while `now - written_at < ttl_seconds`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        is_fresh(self.written_at, self.ttl_seconds, now)
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }
}

pub fn is_fresh(written_at: DateTime<Utc>, ttl_seconds: u64, now: DateTime<Utc>) -> bool {
    let age = now.signed_duration_since(written_at);
    age < chrono::Duration::seconds(ttl_seconds.min(i64::MAX as u64) as i64)
}

/// Short-lived byte store (Redis, or the in-process map when Redis is down).
#[async_trait]
pub trait VolatileStore: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Removes every key matching a glob `pattern` and returns how many were removed.
    async fn clear(&self, pattern: &str) -> Result<u64>;
}

/// Last stored quote for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredQuote {
    pub quote: Quote,
    pub updated_at: DateTime<Utc>,
}

/// Last stored history series for a `(symbol, timeframe)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredHistory {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub points: Vec<HistoryPoint>,
    pub updated_at: DateTime<Utc>,
}

/// Durable price store that survives restarts.
#[async_trait]
pub trait PriceRepository: Send + Sync {
    async fn find_by_symbol(&self, symbol: &str) -> Result<Option<StoredQuote>>;

    /// Replaces the stored quote for `quote.symbol`.
    async fn upsert(&self, quote: &Quote) -> Result<StoredQuote>;

    async fn find_historical_prices(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<StoredHistory>>;

    /// Atomically replaces the whole series; points are stored ascending by timestamp.
    async fn replace_historical_prices(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        points: &[HistoryPoint],
    ) -> Result<()>;

    /// Deletes quotes observed before `cutoff` and series last written before it.
    async fn delete_stale(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_format() {
        assert_eq!(CacheKey::Price("BTC").to_string(), "price:BTC");
        assert_eq!(CacheKey::MarketData("ETH").to_string(), "market-data:ETH");
        assert_eq!(
            CacheKey::History("SOL", Timeframe::SevenDays).to_string(),
            "history:SOL:7d"
        );
        assert_eq!(CacheKey::History("SOL", Timeframe::OneDay).symbol(), "SOL");
    }

    #[test]
    fn test_freshness_is_strict() {
        let written_at = Utc::now();
        let entry = CacheEntry {
            key: "price:BTC".to_string(),
            payload: 1,
            written_at,
            ttl_seconds: 60,
        };
        assert!(entry.is_fresh_at(written_at));
        assert!(entry.is_fresh_at(written_at + chrono::Duration::seconds(59)));
        assert!(!entry.is_fresh_at(written_at + chrono::Duration::seconds(60)));
        assert!(!entry.is_fresh_at(written_at + chrono::Duration::seconds(61)));
    }
}
