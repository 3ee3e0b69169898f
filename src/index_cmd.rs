use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::engine::RetrievalEngine;

/// Rebuild the vector index from every stored document.
///
/// Embeds all stored texts and writes a fresh snapshot to the index
/// directory, replacing whatever was there.
pub async fn run_reindex(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let engine = RetrievalEngine::from_config(config, pool.clone())?;

    println!("Rebuilding index...");
    match engine.rebuild(None).await? {
        Some(snapshot) => println!("Indexed {} documents.", snapshot.ids.len()),
        None => println!("Store is empty; nothing to index."),
    }

    pool.close().await;
    Ok(())
}
