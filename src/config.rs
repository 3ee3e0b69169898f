use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub graph: Option<GraphConfig>,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("db/messages.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
        }
    }
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("db/index")
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_ollama_host")]
    pub host: String,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            host: default_ollama_host(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}
fn default_embedding_model() -> String {
    "mistral".to_string()
}
fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}
fn default_embedding_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            timeout_secs: default_chat_timeout_secs(),
        }
    }
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_chat_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    pub tenant_id: String,
    pub client_id: String,
    #[serde(default = "default_authority")]
    pub authority: String,
    #[serde(default = "default_graph_endpoint")]
    pub endpoint: String,
}

fn default_authority() -> String {
    "https://login.microsoftonline.com".to_string()
}
fn default_graph_endpoint() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    pub team_name: String,
    pub team_id: String,
    pub channel_name: String,
    pub channel_id: String,
}

impl ChannelConfig {
    /// Partition key stored on every document from this channel.
    pub fn label(&self) -> String {
        format!("{}:{}", self.team_name, self.channel_name)
    }

    /// Human-facing form shown in channel listings.
    pub fn display_label(&self) -> String {
        format!("{} / {}", self.team_name, self.channel_name)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate embedding
    match config.embedding.provider.as_str() {
        "ollama" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be ollama or openai.",
            other
        ),
    }
    if config.embedding.model.trim().is_empty() {
        anyhow::bail!("embedding.model must not be empty");
    }

    // Validate chat
    if config.chat.model.trim().is_empty() {
        anyhow::bail!("chat.model must not be empty");
    }

    // Validate server
    if config.server.bind.parse::<std::net::SocketAddr>().is_err() {
        anyhow::bail!(
            "server.bind must be a host:port address, got '{}'",
            config.server.bind
        );
    }

    // Validate graph
    if let Some(graph) = &config.graph {
        if graph.tenant_id.trim().is_empty() || graph.client_id.trim().is_empty() {
            anyhow::bail!("graph.tenant_id and graph.client_id must not be empty");
        }
    }

    // Validate channels
    let mut seen = std::collections::HashSet::new();
    for (i, channel) in config.channels.iter().enumerate() {
        if channel.team_name.trim().is_empty()
            || channel.team_id.trim().is_empty()
            || channel.channel_name.trim().is_empty()
            || channel.channel_id.trim().is_empty()
        {
            anyhow::bail!(
                "channels[{}]: team_name, team_id, channel_name, and channel_id must all be set",
                i
            );
        }
        if !seen.insert(channel.label()) {
            anyhow::bail!("Duplicate channel label: '{}'", channel.label());
        }
    }

    Ok(config)
}
