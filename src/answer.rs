//! Answer generation: turn retrieved threads into a natural-language reply.
//!
//! Calls the OpenAI chat completions API with the retrieved thread texts as
//! grounding context. Requires the `OPENAI_API_KEY` environment variable.

use anyhow::{bail, Result};
use std::time::Duration;

use crate::config::ChatConfig;
use crate::models::Match;

/// Fixed reply when retrieval finds nothing. Callers short-circuit with
/// this instead of calling the chat API.
pub const NO_MATCHES_ANSWER: &str =
    "No matches found. Try re-ingesting or widening your query.";

const SYSTEM_PROMPT: &str = "You are a helpful support assistant. \
    Use only the provided context to answer. \
    If the answer isn't in context, say you don't know.";

/// Generate an answer for `query` grounded in the matched threads.
///
/// The context block is the match texts in rank order, each capped at 2000
/// characters, separated by `---` lines.
pub async fn generate(config: &ChatConfig, query: &str, matches: &[Match]) -> Result<String> {
    let api_key =
        std::env::var("OPENAI_API_KEY").map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

    let context = matches
        .iter()
        .map(|m| truncate_chars(&m.text, 2000))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let body = serde_json::json!({
        "model": config.model,
        "messages": [
            {"role": "system", "content": SYSTEM_PROMPT},
            {"role": "user", "content": format!(
                "Question: {}\n\nContext:\n{}\n\nAnswer concisely with steps if applicable.",
                query, context
            )},
        ],
        "temperature": 0.2,
    });

    let response = client
        .post("https://api.openai.com/v1/chat/completions")
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("OpenAI API error {}: {}", status, body_text);
    }

    let json: serde_json::Value = response.json().await?;
    extract_answer(&json)
}

fn extract_answer(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            anyhow::anyhow!("Invalid chat response: missing choices[0].message.content")
        })
}

/// Truncate to at most `max` characters, on a character boundary.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
