use crate::market::MarketDataService;
use anyhow::Result;

pub async fn clear_cache(service: &MarketDataService) -> Result<()> {
    let removed = service.clear_cache().await?;
    println!(
        "Cleared {removed} cached entries from the {} store.",
        service.cache().volatile_name()
    );
    Ok(())
}

/// Deletes persisted quotes and series older than `retention_days`.
pub async fn prune(service: &MarketDataService, retention_days: u32) -> Result<()> {
    let removed = service
        .prune_stale(chrono::Duration::days(i64::from(retention_days)))
        .await?;
    println!("Pruned {removed} records older than {retention_days} days.");
    Ok(())
}
