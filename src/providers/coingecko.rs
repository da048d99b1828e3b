//! CoinGecko public REST adapter.
//!
//! CoinGecko addresses coins by id (`bitcoin`, `ethereum`, ...) rather than
//! ticker, so every request goes through a ticker → id table.

use crate::core::error::{MarketDataError, Result};
use crate::core::provider::PriceProvider;
use crate::core::quote::{HistoryPoint, Quote, Timeframe};
use crate::providers::util::{build_client_with_headers, build_url, get_json};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

const PROVIDER: &str = "COINGECKO";
const API_KEY_HEADER: &str = "x-cg-demo-api-key";

const DEFAULT_COIN_IDS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("USDT", "tether"),
    ("BNB", "binancecoin"),
    ("SOL", "solana"),
    ("XRP", "ripple"),
    ("USDC", "usd-coin"),
    ("ADA", "cardano"),
    ("DOGE", "dogecoin"),
    ("TRX", "tron"),
    ("DOT", "polkadot"),
    ("MATIC", "matic-network"),
    ("LTC", "litecoin"),
    ("AVAX", "avalanche-2"),
    ("LINK", "chainlink"),
    ("ATOM", "cosmos"),
    ("XLM", "stellar"),
    ("BCH", "bitcoin-cash"),
    ("UNI", "uniswap"),
    ("SHIB", "shiba-inu"),
];

pub struct CoinGeckoProvider {
    base_url: String,
    vs_currency: String,
    coin_ids: HashMap<String, String>,
    client: Client,
}

impl CoinGeckoProvider {
    pub fn new(
        base_url: &str,
        vs_currency: &str,
        api_key: Option<&str>,
        extra_coin_ids: &HashMap<String, String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            headers.insert(
                API_KEY_HEADER,
                HeaderValue::from_str(key).context("Invalid CoinGecko API key")?,
            );
        }
        let client = build_client_with_headers(timeout, headers)?;

        let mut coin_ids: HashMap<String, String> = DEFAULT_COIN_IDS
            .iter()
            .map(|(symbol, id)| (symbol.to_string(), id.to_string()))
            .collect();
        for (symbol, id) in extra_coin_ids {
            coin_ids.insert(symbol.to_uppercase(), id.clone());
        }

        Ok(CoinGeckoProvider {
            base_url: base_url.to_string(),
            vs_currency: vs_currency.to_lowercase(),
            coin_ids,
            client,
        })
    }

    fn coin_id(&self, symbol: &str) -> Option<&str> {
        self.coin_ids.get(symbol).map(String::as_str)
    }

    /// `market_chart` day range and the number of trailing samples kept.
    pub fn chart_spec(timeframe: Timeframe) -> (&'static str, usize) {
        match timeframe {
            Timeframe::OneHour => ("1", 12),
            Timeframe::OneDay => ("1", 288),
            Timeframe::SevenDays => ("7", 168),
            Timeframe::ThirtyDays => ("30", 720),
            Timeframe::OneYear => ("365", 365),
        }
    }

    async fn fetch_markets(&self, ids: &[&str]) -> Result<Vec<CoinMarket>> {
        let ids_param = ids.join(",");
        let url = build_url(
            PROVIDER,
            &self.base_url,
            "/api/v3/coins/markets",
            &[
                ("vs_currency", &self.vs_currency),
                ("ids", &ids_param),
                ("price_change_percentage", "1h,24h,7d,30d"),
            ],
        )?;
        get_json(&self.client, PROVIDER, url).await
    }

    fn to_quote(symbol: &str, market: CoinMarket) -> Option<Quote> {
        let price = market.current_price?;
        Some(Quote {
            symbol: symbol.to_string(),
            name: market.name,
            price,
            change_1h: market.price_change_percentage_1h_in_currency,
            change_24h: market
                .price_change_percentage_24h_in_currency
                .or(market.price_change_percentage_24h)
                .unwrap_or_default(),
            change_7d: market.price_change_percentage_7d_in_currency,
            change_30d: market.price_change_percentage_30d_in_currency,
            volume_24h: market.total_volume.unwrap_or_default(),
            market_cap: market.market_cap.unwrap_or_default(),
            high_24h: market.high_24h,
            low_24h: market.low_24h,
            observed_at: market.last_updated.unwrap_or_else(Utc::now),
            source: PROVIDER.to_string(),
        })
    }

    fn unknown_symbol(symbol: &str) -> MarketDataError {
        MarketDataError::provider(PROVIDER, format!("No CoinGecko id known for symbol: {symbol}"))
    }
}

#[derive(Debug, Deserialize)]
struct CoinMarket {
    id: String,
    name: String,
    current_price: Option<Decimal>,
    #[serde(default)]
    market_cap: Option<Decimal>,
    #[serde(default)]
    total_volume: Option<Decimal>,
    #[serde(default)]
    high_24h: Option<Decimal>,
    #[serde(default)]
    low_24h: Option<Decimal>,
    #[serde(default)]
    price_change_percentage_24h: Option<Decimal>,
    #[serde(default)]
    price_change_percentage_1h_in_currency: Option<Decimal>,
    #[serde(default)]
    price_change_percentage_24h_in_currency: Option<Decimal>,
    #[serde(default)]
    price_change_percentage_7d_in_currency: Option<Decimal>,
    #[serde(default)]
    price_change_percentage_30d_in_currency: Option<Decimal>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct MarketChart {
    prices: Vec<(i64, Decimal)>,
    #[serde(default)]
    total_volumes: Vec<(i64, Decimal)>,
}

#[async_trait]
impl PriceProvider for CoinGeckoProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    #[instrument(name = "CoinGeckoPriceFetch", skip(self), fields(symbol = %symbol))]
    async fn get_current_price(&self, symbol: &str) -> Result<Quote> {
        let id = self
            .coin_id(symbol)
            .ok_or_else(|| Self::unknown_symbol(symbol))?;
        let market = self
            .fetch_markets(&[id])
            .await?
            .into_iter()
            .find(|m| m.id == id)
            .ok_or_else(|| {
                MarketDataError::provider(PROVIDER, format!("No price data found for symbol: {symbol}"))
            })?;
        debug!(?market, "Received CoinGecko market");
        Self::to_quote(symbol, market).ok_or_else(|| {
            MarketDataError::provider(PROVIDER, format!("No current price for symbol: {symbol}"))
        })
    }

    async fn get_multiple_prices(&self, symbols: &[String]) -> Result<HashMap<String, Quote>> {
        let mut symbol_by_id: HashMap<&str, &str> = HashMap::new();
        for symbol in symbols {
            match self.coin_id(symbol) {
                Some(id) => {
                    symbol_by_id.insert(id, symbol.as_str());
                }
                None => debug!(symbol = %symbol, "Skipping symbol without CoinGecko id"),
            }
        }
        if symbol_by_id.is_empty() {
            return Ok(HashMap::new());
        }

        let mut ids: Vec<&str> = symbol_by_id.keys().copied().collect();
        ids.sort_unstable();
        let markets = self.fetch_markets(&ids).await?;

        Ok(markets
            .into_iter()
            .filter_map(|market| {
                let symbol = *symbol_by_id.get(market.id.as_str())?;
                Self::to_quote(symbol, market).map(|q| (symbol.to_string(), q))
            })
            .collect())
    }

    async fn get_market_data(&self, symbol: &str) -> Result<Quote> {
        // coins/markets already carries every change window.
        self.get_current_price(symbol).await
    }

    #[instrument(name = "CoinGeckoHistoryFetch", skip(self), fields(symbol = %symbol, timeframe = %timeframe))]
    async fn get_historical_prices(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<HistoryPoint>> {
        let id = self
            .coin_id(symbol)
            .ok_or_else(|| Self::unknown_symbol(symbol))?;
        let (days, keep) = Self::chart_spec(timeframe);
        let url = build_url(
            PROVIDER,
            &self.base_url,
            &format!("/api/v3/coins/{id}/market_chart"),
            &[("vs_currency", &self.vs_currency), ("days", days)],
        )?;
        let chart: MarketChart = get_json(&self.client, PROVIDER, url).await?;

        let volumes: HashMap<i64, Decimal> = chart.total_volumes.into_iter().collect();
        let mut points: Vec<HistoryPoint> = chart
            .prices
            .into_iter()
            .filter_map(|(ms, price)| {
                let timestamp = Utc.timestamp_millis_opt(ms).single()?;
                Some(HistoryPoint {
                    timestamp,
                    price,
                    volume: volumes.get(&ms).copied().unwrap_or_default(),
                })
            })
            .collect();
        points.sort_by_key(|p| p.timestamp);
        if points.len() > keep {
            points.drain(..points.len() - keep);
        }
        Ok(points)
    }

    async fn is_available(&self) -> bool {
        let Ok(url) = build_url(PROVIDER, &self.base_url, "/api/v3/ping", &[]) else {
            return false;
        };
        match get_json::<serde_json::Value>(&self.client, PROVIDER, url).await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "CoinGecko ping failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MARKETS_RESPONSE: &str = r#"[
        {
            "id": "bitcoin",
            "symbol": "btc",
            "name": "Bitcoin",
            "current_price": 50000.5,
            "market_cap": 980000000000,
            "total_volume": 25000000000,
            "high_24h": 51000,
            "low_24h": 49000,
            "price_change_percentage_24h": 1.5,
            "price_change_percentage_1h_in_currency": -0.25,
            "price_change_percentage_24h_in_currency": 1.5,
            "price_change_percentage_7d_in_currency": 4.75,
            "price_change_percentage_30d_in_currency": null,
            "last_updated": "2024-03-01T12:00:00.000Z"
        },
        {
            "id": "ethereum",
            "symbol": "eth",
            "name": "Ethereum",
            "current_price": 3000,
            "market_cap": 360000000000,
            "total_volume": 12000000000,
            "price_change_percentage_24h": -2.5
        }
    ]"#;

    fn provider(server: &MockServer) -> CoinGeckoProvider {
        CoinGeckoProvider::new(
            &server.uri(),
            "usd",
            None,
            &HashMap::new(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_successful_price_fetch() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/markets"))
            .and(query_param("ids", "bitcoin"))
            .and(query_param("vs_currency", "usd"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MARKETS_RESPONSE))
            .mount(&mock_server)
            .await;

        let quote = provider(&mock_server).get_current_price("BTC").await.unwrap();
        assert_eq!(quote.symbol, "BTC");
        assert_eq!(quote.name, "Bitcoin");
        assert_eq!(quote.price, dec!(50000.5));
        assert_eq!(quote.market_cap, dec!(980000000000));
        assert_eq!(quote.change_1h, Some(dec!(-0.25)));
        assert_eq!(quote.change_24h, dec!(1.5));
        assert_eq!(quote.change_7d, Some(dec!(4.75)));
        assert_eq!(quote.change_30d, None);
        assert_eq!(quote.source, "COINGECKO");
        assert_eq!(
            quote.observed_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_unknown_symbol_fails_without_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(0)
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server)
            .get_current_price("NOPE")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Provider error: COINGECKO - No CoinGecko id known for symbol: NOPE"
        );
    }

    #[tokio::test]
    async fn test_batch_skips_unknown_symbols() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/markets"))
            .and(query_param("ids", "bitcoin,ethereum"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MARKETS_RESPONSE))
            .expect(1)
            .mount(&mock_server)
            .await;

        let quotes = provider(&mock_server)
            .get_multiple_prices(&["ETH".to_string(), "BTC".to_string(), "NOPE".to_string()])
            .await
            .unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes["ETH"].price, dec!(3000));
        assert_eq!(quotes["ETH"].change_24h, dec!(-2.5));
        assert!(quotes["ETH"].change_1h.is_none());
    }

    #[tokio::test]
    async fn test_extra_coin_ids_and_api_key() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/markets"))
            .and(query_param("ids", "pepe"))
            .and(header(API_KEY_HEADER, "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"id": "pepe", "name": "Pepe", "current_price": 0.0000012}]"#,
            ))
            .mount(&mock_server)
            .await;

        let extra = HashMap::from([("pepe".to_string(), "pepe".to_string())]);
        let provider = CoinGeckoProvider::new(
            &mock_server.uri(),
            "usd",
            Some("secret"),
            &extra,
            Duration::from_secs(5),
        )
        .unwrap();
        let quote = provider.get_current_price("PEPE").await.unwrap();
        assert_eq!(quote.price, dec!(0.0000012));
        assert_eq!(quote.market_cap, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_historical_prices_keeps_trailing_samples() {
        let mock_server = MockServer::start().await;
        let base = 1_700_000_000_000_i64;
        let prices: Vec<String> = (0..20)
            .map(|i| format!("[{}, {}]", base + i * 300_000, 100 + i))
            .collect();
        let volumes: Vec<String> = (0..20)
            .map(|i| format!("[{}, {}]", base + i * 300_000, 5))
            .collect();
        let body = format!(
            r#"{{"prices": [{}], "market_caps": [], "total_volumes": [{}]}}"#,
            prices.join(","),
            volumes.join(",")
        );
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/bitcoin/market_chart"))
            .and(query_param("days", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;

        let points = provider(&mock_server)
            .get_historical_prices("BTC", Timeframe::OneHour)
            .await
            .unwrap();
        assert_eq!(points.len(), 12);
        assert_eq!(points[0].price, dec!(108));
        assert_eq!(points[11].price, dec!(119));
        assert_eq!(points[0].volume, dec!(5));
    }

    #[tokio::test]
    async fn test_is_available() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/ping"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"gecko_says": "(V3) To the Moon!"}"#),
            )
            .mount(&mock_server)
            .await;
        assert!(provider(&mock_server).is_available().await);

        let failing = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&failing)
            .await;
        assert!(!provider(&failing).is_available().await);
    }
}
