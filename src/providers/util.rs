use crate::core::error::{MarketDataError, Result};
use anyhow::Context;
use reqwest::header::HeaderMap;
use reqwest::{Client, Response, Url};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("pricefolio/", env!("CARGO_PKG_VERSION"));

/// Builds the HTTP client shared by all calls of one provider. The timeout
/// applies per request.
pub fn build_client(timeout: Duration) -> anyhow::Result<Client> {
    build_client_with_headers(timeout, HeaderMap::new())
}

pub fn build_client_with_headers(timeout: Duration, headers: HeaderMap) -> anyhow::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .context("Failed to build HTTP client")
}

/// Joins `path` onto `base_url` and appends url-encoded query parameters.
pub fn build_url(provider: &str, base_url: &str, path: &str, params: &[(&str, &str)]) -> Result<Url> {
    let raw = format!("{}{}", base_url.trim_end_matches('/'), path);
    Url::parse_with_params(&raw, params)
        .map_err(|e| MarketDataError::provider(provider, format!("Invalid URL {raw}: {e}")))
}

/// Sends a GET request. Only transport failures are errors here; the status
/// is left to the caller.
pub async fn send(client: &Client, provider: &str, url: Url) -> Result<Response> {
    debug!("Requesting {} data from {}", provider, url);
    client.get(url.clone()).send().await.map_err(|e| {
        if e.is_timeout() {
            MarketDataError::provider(provider, format!("Request timed out for URL: {url}"))
        } else {
            MarketDataError::provider(provider, format!("Request error: {e} for URL: {url}"))
        }
    })
}

/// Checks the status of `response` and parses its body as JSON.
pub async fn parse_json<T: DeserializeOwned>(provider: &str, response: Response) -> Result<T> {
    let url = response.url().clone();
    if !response.status().is_success() {
        return Err(MarketDataError::provider(
            provider,
            format!("HTTP error: {} for URL: {}", response.status(), url),
        ));
    }

    let text = response
        .text()
        .await
        .map_err(|e| MarketDataError::provider(provider, format!("Failed to read body: {e}")))?;

    serde_json::from_str(&text).map_err(|e| {
        MarketDataError::provider(
            provider,
            format!("Failed to parse JSON response for {url}: {e}"),
        )
    })
}

pub async fn get_json<T: DeserializeOwned>(client: &Client, provider: &str, url: Url) -> Result<T> {
    let response = send(client, provider, url).await?;
    parse_json(provider, response).await
}

/// Percentage change from `reference` to `current`, rounded to 4 places.
/// Zero when the reference price is zero.
pub fn percent_change(reference: Decimal, current: Decimal) -> Decimal {
    if reference.is_zero() {
        return Decimal::ZERO;
    }
    ((current - reference) / reference * Decimal::ONE_HUNDRED).round_dp(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_build_url_encodes_params() {
        let url = build_url(
            "TEST",
            "http://localhost:8080/",
            "/api/v3/ticker/24hr",
            &[("symbols", r#"["BTCUSDT","ETHUSDT"]"#)],
        )
        .unwrap();
        assert_eq!(url.path(), "/api/v3/ticker/24hr");
        assert_eq!(
            url.query_pairs().next().unwrap().1,
            r#"["BTCUSDT","ETHUSDT"]"#
        );
    }

    #[test]
    fn test_percent_change() {
        assert_eq!(percent_change(dec!(100), dec!(110)), dec!(10));
        assert_eq!(percent_change(dec!(200), dec!(150)), dec!(-25));
        assert_eq!(percent_change(dec!(0), dec!(150)), dec!(0));
        assert_eq!(percent_change(dec!(3), dec!(4)), dec!(33.3333));
    }
}
