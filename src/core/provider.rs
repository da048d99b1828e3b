//! Provider adapter contract

use crate::core::error::Result;
use crate::core::quote::{HistoryPoint, Quote, Timeframe};
use async_trait::async_trait;
use std::collections::HashMap;

/// A single external quote source.
///
/// Implementations translate a vendor wire format into canonical [`Quote`] and
/// [`HistoryPoint`] records. Symbols passed in are already normalized to
/// uppercase tickers.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Short identifier used in logs, errors and `Quote::source`.
    fn name(&self) -> &'static str;

    async fn get_current_price(&self, symbol: &str) -> Result<Quote>;

    /// Symbols the provider cannot resolve are absent from the map.
    async fn get_multiple_prices(&self, symbols: &[String]) -> Result<HashMap<String, Quote>>;

    /// Full snapshot including the 1h/7d/30d change windows.
    ///
    /// Providers without a richer endpoint degrade to the current price quote.
    async fn get_market_data(&self, symbol: &str) -> Result<Quote> {
        self.get_current_price(symbol).await
    }

    /// Ascending by timestamp, at most the provider's point count for `timeframe`.
    async fn get_historical_prices(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<HistoryPoint>>;

    /// Lightweight liveness probe. Any failure resolves to `false`.
    async fn is_available(&self) -> bool;
}
