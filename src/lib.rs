pub mod cli;
pub mod core;
pub mod market;
pub mod providers;
pub mod store;

use crate::core::config::AppConfig;
use crate::core::quote::Timeframe;
use crate::market::{MarketDataService, TieredCache};
use crate::providers::{BinanceProvider, CoinGeckoProvider};
use crate::store::DiskRepository;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub enum AppCommand {
    Price { symbols: Vec<String> },
    Market { symbol: String },
    History { symbol: String, timeframe: String },
    Status,
    Portfolio,
    ClearCache,
    Prune { days: Option<u32> },
}

/// Wires the providers, stores and retry policies described by `config`.
pub async fn build_service(config: &AppConfig) -> Result<MarketDataService> {
    let store_path = config.default_data_path()?.join("prices");
    let repository = DiskRepository::open(&store_path)
        .with_context(|| format!("Failed to open price store at {}", store_path.display()))?;
    let cache = TieredCache::connect(&config.cache, Arc::new(repository)).await;

    let binance = &config.providers.binance;
    let primary = BinanceProvider::new(
        &binance.base_url,
        &binance.quote_asset,
        Duration::from_secs(binance.timeout_secs),
    )?;

    let coingecko = &config.providers.coingecko;
    let fallback = CoinGeckoProvider::new(
        &coingecko.base_url,
        &coingecko.vs_currency,
        coingecko.api_key.as_deref(),
        &coingecko.coin_ids,
        Duration::from_secs(coingecko.timeout_secs),
    )?;

    Ok(MarketDataService::new(
        Arc::new(primary),
        Arc::new(fallback),
        cache,
        config.retry.primary.clone(),
        config.retry.fallback.clone(),
    ))
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("pricefolio starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    // Reject bad input before touching any store or provider.
    if let AppCommand::History { timeframe, .. } = &command {
        timeframe.parse::<Timeframe>()?;
    }

    let service = build_service(&config).await?;
    match command {
        AppCommand::Price { symbols } => cli::quotes::run_price(&service, &symbols).await,
        AppCommand::Market { symbol } => cli::quotes::run_market(&service, &symbol).await,
        AppCommand::History { symbol, timeframe } => {
            cli::history::run(&service, &symbol, timeframe.parse()?).await
        }
        AppCommand::Status => cli::status::run(&service).await,
        AppCommand::Portfolio => cli::portfolio::run(&service, &config.portfolios).await,
        AppCommand::ClearCache => cli::maintenance::clear_cache(&service).await,
        AppCommand::Prune { days } => {
            cli::maintenance::prune(&service, days.unwrap_or(config.cache.retention_days)).await
        }
    }
}
