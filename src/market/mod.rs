pub mod cache;
pub mod service;

pub use cache::{CacheTtls, TieredCache};
pub use service::{AdapterStatus, MarketDataService, ProviderStatus};
