//! Microsoft Teams connector.
//!
//! Fetches channel threads (a root message plus all of its replies) from the
//! Microsoft Graph API using client-credentials authentication. Handles
//! Graph's `@odata.nextLink` pagination and flattens HTML message bodies to
//! plain text before thread assembly.
//!
//! # Configuration
//!
//! ```toml
//! [graph]
//! tenant_id = "00000000-0000-0000-0000-000000000000"
//! client_id = "11111111-1111-1111-1111-111111111111"
//! # authority = "https://login.microsoftonline.com"
//! # endpoint = "https://graph.microsoft.com/v1.0"
//! ```
//!
//! # Environment Variables
//!
//! - `GRAPH_CLIENT_SECRET` — required. Client secret of the Azure app
//!   registration.
//!
//! # Authentication
//!
//! Tokens are acquired with the OAuth 2.0 client-credentials grant against
//! `{authority}/{tenant_id}/oauth2/v2.0/token` with scope
//! `https://graph.microsoft.com/.default`. The app registration needs the
//! `ChannelMessage.Read.All` application permission. One token is acquired
//! per [`GraphClient`] and reused for every request it makes.
//!
//! # Pagination
//!
//! Graph returns channel messages in pages. All pages are followed via
//! `@odata.nextLink` until the listing is exhausted.

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::config::GraphConfig;
use crate::models::ChannelThread;

/// An authenticated Microsoft Graph client.
///
/// Holds the bearer token for the lifetime of one sync run.
pub struct GraphClient {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl GraphClient {
    /// Acquire a token and return a client ready to fetch channel content.
    pub async fn connect(graph: &GraphConfig) -> Result<Self> {
        let client = reqwest::Client::new();
        let token = acquire_token(graph, &client).await?;

        Ok(Self {
            client,
            endpoint: graph.endpoint.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Fetch every thread in one channel.
    ///
    /// Lists the channel's root messages, then each root's replies, and
    /// merges each root with its replies into a single [`ChannelThread`].
    /// Threads whose merged text is empty are still returned; the store
    /// drops them at upsert time.
    pub async fn fetch_channel_threads(
        &self,
        team_id: &str,
        channel_id: &str,
    ) -> Result<Vec<ChannelThread>> {
        let roots = self
            .fetch_all_pages(&format!(
                "{}/teams/{}/channels/{}/messages",
                self.endpoint, team_id, channel_id
            ))
            .await?;

        let mut threads = Vec::new();
        for root in &roots {
            // Entries without an id cannot be threaded.
            let Some(root_id) = root.get("id").and_then(Value::as_str) else {
                continue;
            };

            let replies = self
                .fetch_all_pages(&format!(
                    "{}/teams/{}/channels/{}/messages/{}/replies",
                    self.endpoint, team_id, channel_id, root_id
                ))
                .await?;

            threads.push(merge_thread(root_id, root, &replies));
        }

        Ok(threads)
    }

    /// Follow `@odata.nextLink` pagination, accumulating every `value` entry.
    async fn fetch_all_pages(&self, url: &str) -> Result<Vec<Value>> {
        let mut results = Vec::new();
        let mut next = Some(url.to_string());

        while let Some(url) = next {
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .await
                .with_context(|| format!("Graph request failed: {}", url))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                bail!(
                    "Graph API error {} for {}: {}",
                    status,
                    url,
                    body.chars().take(500).collect::<String>()
                );
            }

            let page: Value = resp.json().await?;
            let (values, next_link) = parse_page(&page);
            results.extend(values);
            next = next_link;
        }

        Ok(results)
    }
}

// ============ Token Acquisition ============

/// Acquire an application token via the client-credentials grant.
///
/// The client secret is read from the `GRAPH_CLIENT_SECRET` environment
/// variable; it is never part of the config file.
async fn acquire_token(graph: &GraphConfig, client: &reqwest::Client) -> Result<String> {
    let secret = std::env::var("GRAPH_CLIENT_SECRET")
        .context("GRAPH_CLIENT_SECRET environment variable not set")?;

    let url = format!(
        "{}/{}/oauth2/v2.0/token",
        graph.authority.trim_end_matches('/'),
        graph.tenant_id
    );

    let params = [
        ("client_id", graph.client_id.as_str()),
        ("client_secret", secret.as_str()),
        ("scope", "https://graph.microsoft.com/.default"),
        ("grant_type", "client_credentials"),
    ];

    let resp = client
        .post(&url)
        .form(&params)
        .send()
        .await
        .context("Token request to the Microsoft identity platform failed")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        bail!(
            "Token error {}: {}",
            status,
            body.chars().take(500).collect::<String>()
        );
    }

    let json: Value = resp.json().await?;
    match json.get("access_token").and_then(Value::as_str) {
        Some(token) => Ok(token.to_string()),
        None => bail!("Token error: response contained no access_token"),
    }
}

// ============ Thread Assembly ============

/// Merge a root message and its replies into one retrievable text block.
///
/// The block is one `ROOT: <text>` line followed by one `REPLY: <text>` line
/// per reply, in reply order. Messages whose body strips to nothing
/// contribute no line.
fn merge_thread(root_id: &str, root: &Value, replies: &[Value]) -> ChannelThread {
    let mut parts = Vec::new();

    let root_text = html_to_text(message_body(root));
    if !root_text.is_empty() {
        parts.push(format!("ROOT: {}", root_text));
    }

    for reply in replies {
        let text = html_to_text(message_body(reply));
        if !text.is_empty() {
            parts.push(format!("REPLY: {}", text));
        }
    }

    ChannelThread {
        root_id: root_id.to_string(),
        text: parts.join("\n").trim().to_string(),
    }
}

/// Pull the raw `body.content` string out of a Graph message object.
fn message_body(message: &Value) -> &str {
    message
        .get("body")
        .and_then(|body| body.get("content"))
        .and_then(Value::as_str)
        .unwrap_or("")
}

/// Split one Graph response page into its entries and the next-page link.
fn parse_page(page: &Value) -> (Vec<Value>, Option<String>) {
    let values = page
        .get("value")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let next = page
        .get("@odata.nextLink")
        .and_then(Value::as_str)
        .map(String::from);
    (values, next)
}

// ============ HTML Flattening ============

/// Flatten an HTML message body to plain text.
///
/// Removes `<script>` and `<style>` blocks with their content, replaces the
/// remaining tags with spaces, decodes the common HTML entities, and
/// collapses whitespace runs to a single space.
pub fn html_to_text(content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }

    static SCRIPT_RE: OnceLock<Regex> = OnceLock::new();
    static STYLE_RE: OnceLock<Regex> = OnceLock::new();
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    static SPACE_RE: OnceLock<Regex> = OnceLock::new();

    let script_re =
        SCRIPT_RE.get_or_init(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap());
    let style_re = STYLE_RE.get_or_init(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap());
    let tag_re = TAG_RE.get_or_init(|| Regex::new(r"<[^>]*>").unwrap());
    let space_re = SPACE_RE.get_or_init(|| Regex::new(r"\s+").unwrap());

    let text = script_re.replace_all(content, "");
    let text = style_re.replace_all(&text, "");
    let text = tag_re.replace_all(&text, " ");

    let text = text
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");

    space_re.replace_all(&text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn html_to_text_strips_tags_and_collapses_whitespace() {
        let html = "<div><p>Hello   <b>world</b></p>\n<p>second  line</p></div>";
        assert_eq!(html_to_text(html), "Hello world second line");
    }

    #[test]
    fn html_to_text_decodes_entities() {
        assert_eq!(
            html_to_text("<p>a &amp; b &lt;c&gt; &quot;d&quot; &#39;e&#39;&nbsp;f</p>"),
            "a & b <c> \"d\" 'e' f"
        );
    }

    #[test]
    fn html_to_text_drops_script_and_style_content() {
        let html = "<p>before</p><script type=\"text/javascript\">\nalert('x');\n</script>\
                    <style>\np { color: red; }\n</style><p>after</p>";
        assert_eq!(html_to_text(html), "before after");
    }

    #[test]
    fn html_to_text_passes_plain_text_through() {
        assert_eq!(html_to_text("just plain text"), "just plain text");
        assert_eq!(html_to_text(""), "");
    }

    #[test]
    fn merge_thread_joins_root_and_replies_in_order() {
        let root = json!({"body": {"content": "<p>How do I reset my VPN?</p>"}});
        let replies = vec![
            json!({"body": {"content": "<p>Open the portal settings.</p>"}}),
            json!({"body": {"content": "<p>Then click reset.</p>"}}),
        ];

        let thread = merge_thread("msg-1", &root, &replies);
        assert_eq!(thread.root_id, "msg-1");
        assert_eq!(
            thread.text,
            "ROOT: How do I reset my VPN?\nREPLY: Open the portal settings.\nREPLY: Then click reset."
        );
    }

    #[test]
    fn merge_thread_skips_empty_bodies() {
        // System events carry no body content; the thread is still returned.
        let root = json!({"body": {"content": ""}});
        let replies = vec![
            json!({"messageType": "systemEventMessage"}),
            json!({"body": {"content": "<p>actual reply</p>"}}),
        ];

        let thread = merge_thread("msg-2", &root, &replies);
        assert_eq!(thread.text, "REPLY: actual reply");
    }

    #[test]
    fn merge_thread_with_nothing_to_say_is_empty() {
        let root = json!({});
        let thread = merge_thread("msg-3", &root, &[]);
        assert_eq!(thread.root_id, "msg-3");
        assert_eq!(thread.text, "");
    }

    #[test]
    fn parse_page_extracts_values_and_next_link() {
        let page = json!({
            "value": [{"id": "1"}, {"id": "2"}],
            "@odata.nextLink": "https://graph.microsoft.com/v1.0/next"
        });
        let (values, next) = parse_page(&page);
        assert_eq!(values.len(), 2);
        assert_eq!(next.as_deref(), Some("https://graph.microsoft.com/v1.0/next"));
    }

    #[test]
    fn parse_page_last_page_has_no_next_link() {
        let page = json!({"value": []});
        let (values, next) = parse_page(&page);
        assert!(values.is_empty());
        assert!(next.is_none());
    }
}
