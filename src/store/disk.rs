use crate::core::cache::{PriceRepository, StoredHistory, StoredQuote};
use crate::core::error::{MarketDataError, Result};
use crate::core::quote::{HistoryPoint, Quote, Timeframe};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::path::Path;
use tracing::{debug, warn};

const QUOTES_PARTITION: &str = "quotes";
const HISTORY_PARTITION: &str = "history";

/// Persistent price store on a fjall keyspace.
///
/// Quotes are keyed by symbol, history series by `SYMBOL:timeframe`. Values
/// are JSON documents.
pub struct DiskRepository {
    keyspace: Keyspace,
    quotes: PartitionHandle,
    history: PartitionHandle,
}

impl DiskRepository {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .map_err(|e| MarketDataError::cache(format!("{}: {e}", path.display())))?;

        let keyspace = fjall::Config::new(path).open()?;
        let quotes = keyspace.open_partition(QUOTES_PARTITION, PartitionCreateOptions::default())?;
        let history =
            keyspace.open_partition(HISTORY_PARTITION, PartitionCreateOptions::default())?;
        debug!("Opened price store at {}", path.display());
        Ok(Self {
            keyspace,
            quotes,
            history,
        })
    }

    fn history_key(symbol: &str, timeframe: Timeframe) -> String {
        format!("{symbol}:{timeframe}")
    }
}

impl Drop for DiskRepository {
    fn drop(&mut self) {
        if let Err(e) = self.keyspace.persist(PersistMode::SyncAll) {
            warn!(error = %e, "Failed to flush price store");
        }
    }
}

#[async_trait]
impl PriceRepository for DiskRepository {
    async fn find_by_symbol(&self, symbol: &str) -> Result<Option<StoredQuote>> {
        match self.quotes.get(symbol)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, quote: &Quote) -> Result<StoredQuote> {
        let stored = StoredQuote {
            quote: quote.clone(),
            updated_at: Utc::now(),
        };
        self.quotes
            .insert(quote.symbol.as_str(), serde_json::to_vec(&stored)?)?;
        debug!("Stored quote for {}", quote.symbol);
        Ok(stored)
    }

    async fn find_historical_prices(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<StoredHistory>> {
        match self.history.get(Self::history_key(symbol, timeframe))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    async fn replace_historical_prices(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        points: &[HistoryPoint],
    ) -> Result<()> {
        let mut points = points.to_vec();
        points.sort_by_key(|p| p.timestamp);

        let series = StoredHistory {
            symbol: symbol.to_string(),
            timeframe,
            points,
            updated_at: Utc::now(),
        };
        // A single insert swaps the whole series in one write.
        self.history.insert(
            Self::history_key(symbol, timeframe),
            serde_json::to_vec(&series)?,
        )?;
        debug!(
            "Stored {} history points for {} {}",
            series.points.len(),
            symbol,
            timeframe
        );
        Ok(())
    }

    async fn delete_stale(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut stale_quotes = Vec::new();
        for item in self.quotes.iter() {
            let (key, value) = item?;
            let stored: StoredQuote = serde_json::from_slice(&value)?;
            if stored.quote.observed_at < cutoff {
                stale_quotes.push(key);
            }
        }

        let mut stale_series = Vec::new();
        for item in self.history.iter() {
            let (key, value) = item?;
            let stored: StoredHistory = serde_json::from_slice(&value)?;
            if stored.updated_at < cutoff {
                stale_series.push(key);
            }
        }

        let removed = stale_quotes.len() + stale_series.len();
        if removed > 0 {
            let mut batch = self.keyspace.batch();
            for key in stale_quotes {
                batch.remove(&self.quotes, key);
            }
            for key in stale_series {
                batch.remove(&self.history, key);
            }
            batch.commit()?;
        }
        debug!("Deleted {} stale records older than {}", removed, cutoff);
        Ok(removed)
    }
}
