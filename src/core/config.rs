use crate::core::retry::RetryPolicy;
use crate::core::valuation::Holding;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Portfolio {
    pub name: String,
    #[serde(default)]
    pub holdings: Vec<Holding>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BinanceProviderConfig {
    pub base_url: String,
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BinanceProviderConfig {
    fn default() -> Self {
        BinanceProviderConfig {
            base_url: "https://api.binance.com".to_string(),
            quote_asset: default_quote_asset(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoinGeckoProviderConfig {
    pub base_url: String,
    #[serde(default = "default_vs_currency")]
    pub vs_currency: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub api_key: Option<String>,
    /// Extra ticker → CoinGecko id mappings.
    #[serde(default)]
    pub coin_ids: HashMap<String, String>,
}

impl Default for CoinGeckoProviderConfig {
    fn default() -> Self {
        CoinGeckoProviderConfig {
            base_url: "https://api.coingecko.com".to_string(),
            vs_currency: default_vs_currency(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
            coin_ids: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub binance: BinanceProviderConfig,
    #[serde(default)]
    pub coingecko: CoinGeckoProviderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    /// Volatile store; the in-process store is used when unset or unreachable.
    pub redis_url: Option<String>,
    pub connect_timeout_secs: u64,
    pub price_ttl_secs: u64,
    pub db_ttl_secs: u64,
    pub history_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub retention_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            redis_url: None,
            connect_timeout_secs: 2,
            price_ttl_secs: 60,
            db_ttl_secs: 120,
            history_ttl_secs: 300,
            sweep_interval_secs: 60,
            retention_days: 30,
        }
    }
}

impl CacheConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn price_ttl(&self) -> Duration {
        Duration::from_secs(self.price_ttl_secs)
    }

    pub fn db_ttl(&self) -> Duration {
        Duration::from_secs(self.db_ttl_secs)
    }

    pub fn history_ttl(&self) -> Duration {
        Duration::from_secs(self.history_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "RetryPolicy::primary")]
    pub primary: RetryPolicy,
    #[serde(default = "RetryPolicy::fallback")]
    pub fallback: RetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            primary: RetryPolicy::primary(),
            fallback: RetryPolicy::fallback(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub portfolios: Vec<Portfolio>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub data_path: Option<String>,
}

fn default_quote_asset() -> String {
    "USDT".to_string()
}

fn default_vs_currency() -> String {
    "usd".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "pricefolio", "pricefolio")
        .context("Could not determine project directories")
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.yaml"))
    }

    /// Directory of the persistent price store.
    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        Ok(project_dirs()?.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
