//! Core market data and valuation abstractions

pub mod cache;
pub mod config;
pub mod error;
pub mod log;
pub mod provider;
pub mod quote;
pub mod retry;
pub mod valuation;

// Re-export main types for cleaner imports
pub use error::{ErrorKind, MarketDataError};
pub use provider::PriceProvider;
pub use quote::{HistoryPoint, Quote, Timeframe};
pub use retry::{RetryPolicy, with_retry};
