use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::store;

/// List the configured channels with their stored thread counts.
pub async fn list_channels(config: &Config) -> Result<()> {
    if config.channels.is_empty() {
        println!("No channels configured. Add [[channels]] entries to the config file.");
        return Ok(());
    }

    let pool = db::connect(config).await?;

    println!("{:<32} {:<32} THREADS", "CHANNEL", "LABEL");
    let mut total = 0i64;
    for channel in &config.channels {
        let label = channel.label();
        let count = store::count_docs(&pool, Some(&label)).await?;
        println!("{:<32} {:<32} {}", channel.display_label(), label, count);
        total += count;
    }
    println!("{:<32} {:<32} {}", "", "total", total);

    pool.close().await;
    Ok(())
}
