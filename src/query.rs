use anyhow::Result;

use crate::answer;
use crate::config::Config;
use crate::db;
use crate::engine::RetrievalEngine;

/// Run a semantic query from the command line.
///
/// Prints the top matches in rank order; with `with_answer` also generates
/// an answer grounded in them (requires `OPENAI_API_KEY`).
pub async fn run_query(
    config: &Config,
    text: &str,
    channel: Option<&str>,
    top_k: usize,
    with_answer: bool,
) -> Result<()> {
    if text.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    let top_k = top_k.clamp(1, 10);

    let pool = db::connect(config).await?;
    let engine = RetrievalEngine::from_config(config, pool.clone())?;

    let matches = engine.retrieve(text, channel, top_k).await?;

    if matches.is_empty() {
        println!("{}", answer::NO_MATCHES_ANSWER);
        pool.close().await;
        return Ok(());
    }

    for (i, m) in matches.iter().enumerate() {
        let excerpt = answer::truncate_chars(&m.text, 500).replace('\n', " ");
        println!("{}. [{:.2}] {}", i + 1, m.score, m.channel_label);
        println!("    excerpt: \"{}\"", excerpt.trim());
        println!("    id: {}", m.id);
        println!();
    }

    if with_answer {
        let answer = answer::generate(&config.chat, text, &matches).await?;
        println!("Answer:");
        println!("{}", answer);
    }

    pool.close().await;
    Ok(())
}
