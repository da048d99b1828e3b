//! Canonical market data records shared by providers, stores and callers.

use crate::core::error::MarketDataError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
    #[serde(rename = "1y")]
    OneYear,
}

impl Timeframe {
    pub const ALL: [Timeframe; 5] = [
        Timeframe::OneHour,
        Timeframe::OneDay,
        Timeframe::SevenDays,
        Timeframe::ThirtyDays,
        Timeframe::OneYear,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::OneHour => "1h",
            Timeframe::OneDay => "24h",
            Timeframe::SevenDays => "7d",
            Timeframe::ThirtyDays => "30d",
            Timeframe::OneYear => "1y",
        }
    }
}

impl Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1h" => Ok(Timeframe::OneHour),
            "24h" | "1d" => Ok(Timeframe::OneDay),
            "7d" => Ok(Timeframe::SevenDays),
            "30d" => Ok(Timeframe::ThirtyDays),
            "1y" => Ok(Timeframe::OneYear),
            _ => Err(MarketDataError::Validation(format!(
                "Invalid timeframe: {s}. Expected one of 1h, 24h, 7d, 30d, 1y"
            ))),
        }
    }
}

/// Price and market snapshot for one asset at one instant.
///
/// Change windows are percentages. A window the provider does not support is
/// `None`; `market_cap` is `0` when the provider cannot supply it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_1h: Option<Decimal>,
    pub change_24h: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_7d: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_30d: Option<Decimal>,
    pub volume_24h: Decimal,
    pub market_cap: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_24h: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_24h: Option<Decimal>,
    pub observed_at: DateTime<Utc>,
    pub source: String,
}

impl Quote {
    /// True when every change window was populated by the provider.
    pub fn has_full_market_data(&self) -> bool {
        self.change_1h.is_some() && self.change_7d.is_some() && self.change_30d.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub volume: Decimal,
}

/// Trims and uppercases a ticker, rejecting anything that is not a plain
/// alphanumeric symbol.
pub fn normalize_symbol(symbol: &str) -> Result<String, MarketDataError> {
    let normalized = symbol.trim().to_uppercase();
    if normalized.is_empty() {
        return Err(MarketDataError::Validation("Symbol must not be empty".into()));
    }
    if !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(MarketDataError::Validation(format!(
            "Invalid symbol: {symbol}"
        )));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_parse_and_display() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.to_string().parse::<Timeframe>().unwrap(), tf);
        }
        assert_eq!("24H".parse::<Timeframe>().unwrap(), Timeframe::OneDay);
        assert_eq!(" 7d ".parse::<Timeframe>().unwrap(), Timeframe::SevenDays);
    }

    #[test]
    fn test_timeframe_invalid() {
        let err = "2w".parse::<Timeframe>().unwrap_err();
        assert!(matches!(err, MarketDataError::Validation(_)));
        assert!(err.to_string().contains("Invalid timeframe: 2w"));
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol(" btc ").unwrap(), "BTC");
        assert!(normalize_symbol("").is_err());
        assert!(normalize_symbol("BTC/USDT").is_err());
    }
}
