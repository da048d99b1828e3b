//! Error taxonomy for market data operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a [`MarketDataError`], used by retry allow-lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Provider,
    Cache,
    Unavailable,
    Validation,
    Unsupported,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketDataError {
    /// Transient vendor-side failure: network, timeout, non-2xx status or an
    /// unparseable body.
    #[error("Provider error: {provider} - {message}")]
    Provider { provider: String, message: String },

    /// Volatile or persistent store failure. Absorbed by the tiered cache and
    /// never returned from a query.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Both providers exhausted.
    #[error("Market data unavailable for {symbol} ({operation}): {reason}")]
    Unavailable {
        symbol: String,
        operation: String,
        reason: String,
    },

    /// Malformed caller input, e.g. an unknown timeframe.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unsupported operation: {operation} on {provider}")]
    Unsupported { provider: String, operation: String },
}

impl MarketDataError {
    pub fn provider(provider: &str, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn cache(message: impl std::fmt::Display) -> Self {
        Self::Cache(message.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Provider { .. } => ErrorKind::Provider,
            Self::Cache(_) => ErrorKind::Cache,
            Self::Unavailable { .. } => ErrorKind::Unavailable,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
        }
    }
}

impl From<redis::RedisError> for MarketDataError {
    fn from(err: redis::RedisError) -> Self {
        Self::cache(err)
    }
}

impl From<fjall::Error> for MarketDataError {
    fn from(err: fjall::Error) -> Self {
        Self::cache(err)
    }
}

impl From<serde_json::Error> for MarketDataError {
    fn from(err: serde_json::Error) -> Self {
        Self::cache(format!("serialization failed: {err}"))
    }
}

pub type Result<T, E = MarketDataError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = MarketDataError::provider("BINANCE", "HTTP 500");
        assert_eq!(error.to_string(), "Provider error: BINANCE - HTTP 500");

        let error = MarketDataError::Unavailable {
            symbol: "BTC".to_string(),
            operation: "current price".to_string(),
            reason: "Provider error: COINGECKO - timeout".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Market data unavailable for BTC (current price): Provider error: COINGECKO - timeout"
        );
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            MarketDataError::provider("X", "boom").kind(),
            ErrorKind::Provider
        );
        assert_eq!(MarketDataError::cache("down").kind(), ErrorKind::Cache);
        assert_eq!(
            MarketDataError::Validation("bad".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            MarketDataError::Unsupported {
                provider: "X".into(),
                operation: "market data".into()
            }
            .kind(),
            ErrorKind::Unsupported
        );
    }
}
