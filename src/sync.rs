//! Sync orchestration.
//!
//! Coordinates the full ingestion flow: Teams connector → document store
//! upserts → full index rebuild. A channel that fails to fetch is reported
//! with a warning and skipped; the remaining channels still sync.

use anyhow::{bail, Result};

use crate::config::{ChannelConfig, Config};
use crate::connector_teams::GraphClient;
use crate::db;
use crate::engine::RetrievalEngine;
use crate::store;

/// Run a sync over the configured channels.
///
/// `channel` restricts the run to one channel label; `dry_run` fetches and
/// counts threads without writing or rebuilding. After upserts, the whole
/// index is rebuilt unscoped so searches see the new documents.
pub async fn run_sync(config: &Config, channel: Option<&str>, dry_run: bool) -> Result<()> {
    let Some(graph) = &config.graph else {
        bail!("No [graph] section in config. Set tenant_id and client_id to sync.");
    };
    let channels = select_channels(config, channel)?;

    let client = GraphClient::connect(graph).await?;
    let pool = db::connect(config).await?;

    let mut threads_fetched = 0u64;
    let mut docs_upserted = 0u64;
    let mut channels_failed = 0u64;

    for chan in &channels {
        let label = chan.label();
        println!("Fetching: {}", label);

        let threads = match client
            .fetch_channel_threads(&chan.team_id, &chan.channel_id)
            .await
        {
            Ok(threads) => threads,
            Err(e) => {
                eprintln!("Warning: failed to fetch {}: {}", label, e);
                channels_failed += 1;
                continue;
            }
        };
        threads_fetched += threads.len() as u64;

        if dry_run {
            println!("  {} threads", threads.len());
            continue;
        }

        let mut upserted = 0u64;
        for thread in &threads {
            // Threads that stripped to nothing carry no searchable text.
            if thread.text.is_empty() {
                continue;
            }
            store::upsert_doc(
                &pool,
                &thread.text,
                &label,
                &chan.team_id,
                &chan.channel_id,
                &thread.root_id,
            )
            .await?;
            upserted += 1;
        }
        println!("  Upserted {} threads.", upserted);
        docs_upserted += upserted;
    }

    if dry_run {
        println!("sync (dry-run)");
        println!("  threads fetched: {}", threads_fetched);
        if channels_failed > 0 {
            println!("  channels failed: {}", channels_failed);
        }
        pool.close().await;
        return Ok(());
    }

    // Full rebuild so every stored document is searchable again.
    println!("Rebuilding index...");
    let engine = RetrievalEngine::from_config(config, pool.clone())?;
    let snapshot = engine.rebuild(None).await?;
    let indexed = snapshot.map(|s| s.ids.len()).unwrap_or(0);

    println!("sync");
    println!("  channels: {}", channels.len());
    println!("  threads fetched: {}", threads_fetched);
    println!("  documents upserted: {}", docs_upserted);
    println!("  indexed: {}", indexed);
    if channels_failed > 0 {
        println!("  channels failed: {}", channels_failed);
    }
    println!("ok");

    pool.close().await;
    Ok(())
}

/// Resolve which channels this run covers.
///
/// With no label every configured channel is synced; with a label only the
/// matching channel is. Labels are unique per config validation.
fn select_channels(config: &Config, label: Option<&str>) -> Result<Vec<ChannelConfig>> {
    if config.channels.is_empty() {
        bail!("No channels configured. Add [[channels]] entries to the config file.");
    }

    match label {
        Some(label) => {
            let found: Vec<ChannelConfig> = config
                .channels
                .iter()
                .filter(|c| c.label() == label)
                .cloned()
                .collect();
            if found.is_empty() {
                bail!("Unknown channel label: '{}'", label);
            }
            Ok(found)
        }
        None => Ok(config.channels.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_channels() -> Config {
        toml::from_str(
            r#"
            [[channels]]
            team_name = "Support"
            team_id = "t1"
            channel_name = "General"
            channel_id = "c1"

            [[channels]]
            team_name = "Support"
            team_id = "t1"
            channel_name = "Escalations"
            channel_id = "c2"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn select_channels_defaults_to_all() {
        let config = config_with_channels();
        let selected = select_channels(&config, None).unwrap();
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn select_channels_filters_by_label() {
        let config = config_with_channels();
        let selected = select_channels(&config, Some("Support:Escalations")).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].channel_id, "c2");
    }

    #[test]
    fn select_channels_rejects_unknown_label() {
        let config = config_with_channels();
        let err = select_channels(&config, Some("Support:Nope")).unwrap_err();
        assert!(err.to_string().contains("Unknown channel label"));
    }

    #[test]
    fn select_channels_requires_configuration() {
        let config: Config = toml::from_str("").unwrap();
        assert!(select_channels(&config, None).is_err());
    }
}
