//! Market data orchestration: cache first, then the primary provider, then
//! the fallback, each provider behind its own retry policy.

use crate::core::cache::CacheKey;
use crate::core::error::{MarketDataError, Result};
use crate::core::provider::PriceProvider;
use crate::core::quote::{HistoryPoint, Quote, Timeframe, normalize_symbol};
use crate::core::retry::{RetryPolicy, with_retry};
use crate::market::cache::TieredCache;
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterStatus {
    pub primary: ProviderStatus,
    pub fallback: ProviderStatus,
    /// Only the fallback answers. Informational; routing always starts with
    /// the primary.
    pub active_fallback: bool,
}

pub struct MarketDataService {
    primary: Arc<dyn PriceProvider>,
    fallback: Arc<dyn PriceProvider>,
    cache: TieredCache,
    primary_retry: RetryPolicy,
    fallback_retry: RetryPolicy,
}

impl MarketDataService {
    pub fn new(
        primary: Arc<dyn PriceProvider>,
        fallback: Arc<dyn PriceProvider>,
        cache: TieredCache,
        primary_retry: RetryPolicy,
        fallback_retry: RetryPolicy,
    ) -> Self {
        Self {
            primary,
            fallback,
            cache,
            primary_retry,
            fallback_retry,
        }
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    /// Runs `call` against the primary provider, then the fallback.
    async fn fetch_with_fallback<T, F, Fut>(&self, symbol: &str, operation: &str, call: F) -> Result<T>
    where
        F: Fn(Arc<dyn PriceProvider>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let primary_err = match with_retry(|| call(Arc::clone(&self.primary)), &self.primary_retry).await
        {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        warn!(
            symbol,
            operation,
            provider = self.primary.name(),
            error = %primary_err,
            "Primary provider exhausted, trying fallback"
        );

        match with_retry(|| call(Arc::clone(&self.fallback)), &self.fallback_retry).await {
            Ok(value) => Ok(value),
            Err(fallback_err) => Err(MarketDataError::Unavailable {
                symbol: symbol.to_string(),
                operation: operation.to_string(),
                reason: format!(
                    "{}: {primary_err}; {}: {fallback_err}",
                    self.primary.name(),
                    self.fallback.name()
                ),
            }),
        }
    }

    pub async fn get_current_price(&self, symbol: &str) -> Result<Quote> {
        let symbol = normalize_symbol(symbol)?;
        let key = CacheKey::Price(&symbol);
        if let Some(quote) = self.cache.get_quote(key).await {
            return Ok(quote);
        }

        let quote = self
            .fetch_with_fallback(&symbol, "price", |provider| {
                let symbol = symbol.clone();
                async move { provider.get_current_price(&symbol).await }
            })
            .await?;
        self.cache.put_quote(key, &quote).await;
        Ok(quote)
    }

    /// Quote including the 1h/7d/30d change windows where the serving
    /// provider has them.
    pub async fn get_full_market_data(&self, symbol: &str) -> Result<Quote> {
        let symbol = normalize_symbol(symbol)?;
        let key = CacheKey::MarketData(&symbol);
        if let Some(quote) = self.cache.get_quote(key).await {
            return Ok(quote);
        }

        let quote = self
            .fetch_with_fallback(&symbol, "market data", |provider| {
                let symbol = symbol.clone();
                async move { provider.get_market_data(&symbol).await }
            })
            .await?;
        self.cache.put_quote(key, &quote).await;
        Ok(quote)
    }

    pub async fn get_historical_prices(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<HistoryPoint>> {
        let symbol = normalize_symbol(symbol)?;
        if let Some(points) = self.cache.get_history(&symbol, timeframe).await {
            return Ok(points);
        }

        let operation = format!("history {timeframe}");
        let mut points = self
            .fetch_with_fallback(&symbol, &operation, |provider| {
                let symbol = symbol.clone();
                async move { provider.get_historical_prices(&symbol, timeframe).await }
            })
            .await?;
        points.sort_by_key(|p| p.timestamp);
        self.cache.put_history(&symbol, timeframe, &points).await;
        Ok(points)
    }

    /// Prices for several symbols. Symbols no source knows are left out of
    /// the map; the call only fails when both providers errored and neither
    /// the cache nor a provider resolved any symbol.
    pub async fn get_multiple_prices(&self, symbols: &[String]) -> Result<HashMap<String, Quote>> {
        if symbols.is_empty() {
            return Err(MarketDataError::Validation(
                "At least one symbol is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        let mut requested = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let symbol = normalize_symbol(symbol)?;
            if seen.insert(symbol.clone()) {
                requested.push(symbol);
            }
        }

        let cached = join_all(
            requested
                .iter()
                .map(|symbol| self.cache.get_quote(CacheKey::Price(symbol))),
        )
        .await;

        let mut result = HashMap::new();
        let mut misses = Vec::new();
        for (symbol, quote) in requested.into_iter().zip(cached) {
            match quote {
                Some(quote) => {
                    result.insert(symbol, quote);
                }
                None => misses.push(symbol),
            }
        }
        if misses.is_empty() {
            return Ok(result);
        }
        debug!("Fetching {} uncached symbols", misses.len());

        let mut fetched: HashMap<String, Quote> = HashMap::new();
        let primary_err =
            match with_retry(|| self.primary.get_multiple_prices(&misses), &self.primary_retry).await {
                Ok(quotes) => {
                    fetched.extend(quotes);
                    None
                }
                Err(e) => {
                    warn!(provider = self.primary.name(), error = %e, "Primary batch fetch failed");
                    Some(e)
                }
            };

        let remaining: Vec<String> = misses
            .iter()
            .filter(|s| !fetched.contains_key(*s))
            .cloned()
            .collect();
        let mut fallback_err = None;
        if !remaining.is_empty() {
            match with_retry(
                || self.fallback.get_multiple_prices(&remaining),
                &self.fallback_retry,
            )
            .await
            {
                Ok(quotes) => fetched.extend(quotes),
                Err(e) => {
                    warn!(provider = self.fallback.name(), error = %e, "Fallback batch fetch failed");
                    fallback_err = Some(e);
                }
            }
        }

        fetched.retain(|symbol, _| misses.contains(symbol));
        if fetched.is_empty() && result.is_empty() {
            if let (Some(primary_err), Some(fallback_err)) = (primary_err, fallback_err) {
                return Err(MarketDataError::Unavailable {
                    symbol: misses.join(","),
                    operation: "batch price".to_string(),
                    reason: format!(
                        "{}: {primary_err}; {}: {fallback_err}",
                        self.primary.name(),
                        self.fallback.name()
                    ),
                });
            }
        }

        join_all(
            fetched
                .iter()
                .map(|(symbol, quote)| self.cache.put_quote(CacheKey::Price(symbol), quote)),
        )
        .await;
        result.extend(fetched);
        Ok(result)
    }

    /// Probes both providers concurrently.
    pub async fn get_adapter_status(&self) -> AdapterStatus {
        let (primary, fallback) = tokio::join!(self.primary.is_available(), self.fallback.is_available());
        AdapterStatus {
            primary: ProviderStatus {
                name: self.primary.name().to_string(),
                available: primary,
            },
            fallback: ProviderStatus {
                name: self.fallback.name().to_string(),
                available: fallback,
            },
            active_fallback: !primary && fallback,
        }
    }

    pub async fn clear_cache(&self) -> Result<u64> {
        self.cache.clear().await
    }

    /// Deletes persistent quotes and series older than `retention`.
    pub async fn prune_stale(&self, retention: chrono::Duration) -> Result<usize> {
        let cutoff = Utc::now() - retention;
        let removed = self.cache.prune(cutoff).await?;
        info!("Pruned {} records older than {}", removed, cutoff);
        Ok(removed)
    }
}
