//! Binance public REST adapter.
//!
//! Quotes come from the 24h rolling ticker of the `<SYMBOL><QUOTE_ASSET>`
//! pair and history from klines. Binance does not publish market
//! capitalisation, so `market_cap` is always reported as zero.

use crate::core::error::{MarketDataError, Result};
use crate::core::provider::PriceProvider;
use crate::core::quote::{HistoryPoint, Quote, Timeframe};
use crate::providers::util::{self, build_client, build_url, get_json, percent_change};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::future::join_all;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const PROVIDER: &str = "BINANCE";

pub struct BinanceProvider {
    base_url: String,
    quote_asset: String,
    client: Client,
}

impl BinanceProvider {
    pub fn new(base_url: &str, quote_asset: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(BinanceProvider {
            base_url: base_url.to_string(),
            quote_asset: quote_asset.to_uppercase(),
            client: build_client(timeout)?,
        })
    }

    fn pair(&self, symbol: &str) -> String {
        format!("{}{}", symbol, self.quote_asset)
    }

    /// Maps an exchange pair such as `BTCUSDT` back to its ticker.
    fn ticker_for_pair<'a>(&self, pair: &'a str) -> Option<&'a str> {
        pair.strip_suffix(self.quote_asset.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Kline interval and count backing each timeframe.
    pub fn kline_spec(timeframe: Timeframe) -> (&'static str, u32) {
        match timeframe {
            Timeframe::OneHour => ("1m", 60),
            Timeframe::OneDay => ("1h", 24),
            Timeframe::SevenDays => ("4h", 42),
            Timeframe::ThirtyDays => ("1d", 30),
            Timeframe::OneYear => ("1w", 52),
        }
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker24h> {
        let url = build_url(
            PROVIDER,
            &self.base_url,
            "/api/v3/ticker/24hr",
            &[("symbol", &self.pair(symbol))],
        )?;
        get_json(&self.client, PROVIDER, url).await
    }

    /// Like `fetch_ticker`, but an HTTP 400 (unknown pair) is `None`.
    async fn fetch_listed_ticker(&self, symbol: &str) -> Result<Option<Ticker24h>> {
        let url = build_url(
            PROVIDER,
            &self.base_url,
            "/api/v3/ticker/24hr",
            &[("symbol", &self.pair(symbol))],
        )?;
        let response = util::send(&self.client, PROVIDER, url).await?;
        if response.status() == StatusCode::BAD_REQUEST {
            return Ok(None);
        }
        util::parse_json(PROVIDER, response).await.map(Some)
    }

    async fn fetch_klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Kline>> {
        let url = build_url(
            PROVIDER,
            &self.base_url,
            "/api/v3/klines",
            &[
                ("symbol", &self.pair(symbol)),
                ("interval", interval),
                ("limit", &limit.to_string()),
            ],
        )?;
        let rows: Vec<Vec<Value>> = get_json(&self.client, PROVIDER, url).await?;
        rows.iter().map(|row| Kline::from_row(row)).collect()
    }

    /// Change from the close of the oldest kline to `current`, or zero when the
    /// window cannot be computed.
    async fn window_change(&self, symbol: &str, interval: &str, limit: u32, current: Decimal) -> Decimal {
        match self.fetch_klines(symbol, interval, limit).await {
            Ok(klines) => klines
                .first()
                .map_or(Decimal::ZERO, |k| percent_change(k.close, current)),
            Err(e) => {
                warn!(symbol, interval, error = %e, "Could not compute change window");
                Decimal::ZERO
            }
        }
    }

    fn to_quote(&self, symbol: &str, ticker: Ticker24h) -> Quote {
        let observed_at = ticker
            .close_time
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);
        Quote {
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            price: ticker.last_price,
            change_1h: None,
            change_24h: ticker.price_change_percent,
            change_7d: None,
            change_30d: None,
            volume_24h: ticker.quote_volume,
            market_cap: Decimal::ZERO,
            high_24h: ticker.high_price,
            low_24h: ticker.low_price,
            observed_at,
            source: PROVIDER.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    symbol: String,
    last_price: Decimal,
    price_change_percent: Decimal,
    quote_volume: Decimal,
    #[serde(default)]
    high_price: Option<Decimal>,
    #[serde(default)]
    low_price: Option<Decimal>,
    #[serde(default)]
    close_time: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
struct Kline {
    open_time: DateTime<Utc>,
    close: Decimal,
    volume: Decimal,
}

impl Kline {
    /// Parses `[openTime, open, high, low, close, volume, closeTime, ...]`.
    fn from_row(row: &[Value]) -> Result<Self> {
        let malformed = || MarketDataError::provider(PROVIDER, format!("Malformed kline: {row:?}"));
        let decimal_at = |idx: usize| -> Result<Decimal> {
            row.get(idx)
                .and_then(Value::as_str)
                .and_then(|s| Decimal::from_str(s).ok())
                .ok_or_else(malformed)
        };
        let open_time = row
            .first()
            .and_then(Value::as_i64)
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(malformed)?;
        Ok(Kline {
            open_time,
            close: decimal_at(4)?,
            volume: decimal_at(5)?,
        })
    }
}

#[async_trait]
impl PriceProvider for BinanceProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    #[instrument(name = "BinancePriceFetch", skip(self), fields(symbol = %symbol))]
    async fn get_current_price(&self, symbol: &str) -> Result<Quote> {
        let ticker = self.fetch_ticker(symbol).await?;
        debug!(?ticker, "Received Binance ticker");
        Ok(self.to_quote(symbol, ticker))
    }

    async fn get_multiple_prices(&self, symbols: &[String]) -> Result<HashMap<String, Quote>> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }

        let pairs: Vec<String> = symbols.iter().map(|s| self.pair(s)).collect();
        let pairs_param = serde_json::to_string(&pairs)
            .map_err(|e| MarketDataError::provider(PROVIDER, e.to_string()))?;
        let url = build_url(
            PROVIDER,
            &self.base_url,
            "/api/v3/ticker/24hr",
            &[("symbols", &pairs_param)],
        )?;
        let response = util::send(&self.client, PROVIDER, url).await?;

        // Binance rejects the whole batch when one pair is unknown; resolve
        // the symbols one by one instead and keep the ones that are listed.
        if response.status() == StatusCode::BAD_REQUEST {
            debug!("Batch ticker rejected, resolving {} symbols individually", symbols.len());
            let results = join_all(symbols.iter().map(|symbol| async move {
                (symbol, self.fetch_listed_ticker(symbol).await)
            }))
            .await;

            let mut quotes = HashMap::new();
            let mut first_err = None;
            for (symbol, result) in results {
                match result {
                    Ok(Some(ticker)) => {
                        quotes.insert(symbol.clone(), self.to_quote(symbol, ticker));
                    }
                    Ok(None) => debug!(symbol = %symbol, "Symbol not listed, skipping"),
                    Err(e) => {
                        warn!(symbol = %symbol, error = %e, "Single ticker fetch failed");
                        first_err.get_or_insert(e);
                    }
                }
            }
            return match first_err {
                Some(e) if quotes.is_empty() => Err(e),
                _ => Ok(quotes),
            };
        }

        let tickers: Vec<Ticker24h> = util::parse_json(PROVIDER, response).await?;
        let mut quotes = HashMap::new();
        for ticker in tickers {
            let Some(symbol) = self.ticker_for_pair(&ticker.symbol).map(str::to_string) else {
                continue;
            };
            if symbols.contains(&symbol) {
                let quote = self.to_quote(&symbol, ticker);
                quotes.insert(symbol, quote);
            }
        }
        Ok(quotes)
    }

    #[instrument(name = "BinanceMarketDataFetch", skip(self), fields(symbol = %symbol))]
    async fn get_market_data(&self, symbol: &str) -> Result<Quote> {
        let mut quote = self.get_current_price(symbol).await?;
        let (change_1h, change_7d, change_30d) = tokio::join!(
            self.window_change(symbol, "1m", 61, quote.price),
            self.window_change(symbol, "1d", 8, quote.price),
            self.window_change(symbol, "1d", 31, quote.price),
        );
        quote.change_1h = Some(change_1h);
        quote.change_7d = Some(change_7d);
        quote.change_30d = Some(change_30d);
        Ok(quote)
    }

    #[instrument(name = "BinanceHistoryFetch", skip(self), fields(symbol = %symbol, timeframe = %timeframe))]
    async fn get_historical_prices(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<HistoryPoint>> {
        let (interval, limit) = Self::kline_spec(timeframe);
        let mut points: Vec<HistoryPoint> = self
            .fetch_klines(symbol, interval, limit)
            .await?
            .into_iter()
            .map(|k| HistoryPoint {
                timestamp: k.open_time,
                price: k.close,
                volume: k.volume,
            })
            .collect();
        points.sort_by_key(|p| p.timestamp);
        points.truncate(limit as usize);
        Ok(points)
    }

    async fn is_available(&self) -> bool {
        let Ok(url) = build_url(PROVIDER, &self.base_url, "/api/v3/ping", &[]) else {
            return false;
        };
        match util::send(&self.client, PROVIDER, url).await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Binance ping failed");
                false
            }
        }
    }
}
