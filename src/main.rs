//! # Thread Recall CLI (`recall`)
//!
//! The `recall` binary is the primary interface for Thread Recall. It
//! provides commands for database initialization, Teams channel ingestion,
//! semantic search, index maintenance, and starting the HTTP query server.
//!
//! ## Usage
//!
//! ```bash
//! recall --config ./recall.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `recall init` | Create the SQLite database and schema |
//! | `recall channels` | List configured channels and stored thread counts |
//! | `recall sync` | Fetch channel threads from Microsoft Graph and rebuild the index |
//! | `recall query "<text>"` | Search stored threads semantically |
//! | `recall reindex` | Rebuild the vector index from the store |
//! | `recall serve` | Start the HTTP query server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! recall init --config ./recall.toml
//!
//! # Ingest every configured channel
//! recall sync --config ./recall.toml
//!
//! # Ingest one channel, counting only
//! recall sync --channel "Support:General" --dry-run
//!
//! # Search one channel and generate an answer
//! recall query "how do I reset the VPN" --channel "Support:General" --answer
//!
//! # Start the HTTP server
//! recall serve --config ./recall.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use thread_recall::{channels, config, db, index_cmd, query, server, sync};

/// Thread Recall CLI — semantic retrieval and Q&A over Microsoft Teams
/// channel threads.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `recall.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "recall",
    about = "Thread Recall — semantic retrieval and Q&A over Microsoft Teams channel threads",
    version,
    long_about = "Thread Recall ingests Microsoft Teams channel threads, embeds them with a \
    configurable provider (Ollama or OpenAI), and serves semantic search with grounded answer \
    generation via a CLI and a JSON HTTP server."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// All store, index, embedding, chat, server, and channel settings are
    /// read from this file.
    #[arg(long, global = true, default_value = "./recall.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the docs table. This command is
    /// idempotent — running it multiple times is safe.
    Init,

    /// List configured channels and their stored thread counts.
    Channels,

    /// Fetch channel threads from Microsoft Graph and rebuild the index.
    ///
    /// Requires a [graph] config section and the GRAPH_CLIENT_SECRET
    /// environment variable. After the upserts the whole vector index is
    /// rebuilt so new threads become searchable.
    Sync {
        /// Only sync the channel with this label (e.g. "Support:General").
        #[arg(long)]
        channel: Option<String>,

        /// Fetch and count threads without writing or rebuilding.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search stored threads semantically.
    ///
    /// Embeds the query with the configured provider and ranks stored
    /// threads by inner product. With --answer, also generates an answer
    /// grounded in the matches (requires OPENAI_API_KEY).
    Query {
        /// The question or search text.
        text: String,

        /// Restrict matches to one channel label (e.g. "Support:General").
        #[arg(long)]
        channel: Option<String>,

        /// Number of matches to return (clamped to [1, 10]).
        #[arg(long, default_value_t = 5)]
        top_k: usize,

        /// Generate an answer from the matches with the chat model.
        #[arg(long)]
        answer: bool,
    },

    /// Rebuild the vector index from every stored document.
    ///
    /// Useful after switching embedding models or when the index directory
    /// was lost. Sync runs this automatically.
    Reindex,

    /// Start the HTTP query server.
    ///
    /// Binds to the address in [server].bind and exposes /health, /channels,
    /// /query, and /reload.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Channels => {
            channels::list_channels(&cfg).await?;
        }
        Commands::Sync { channel, dry_run } => {
            sync::run_sync(&cfg, channel.as_deref(), dry_run).await?;
        }
        Commands::Query {
            text,
            channel,
            top_k,
            answer,
        } => {
            query::run_query(&cfg, &text, channel.as_deref(), top_k, answer).await?;
        }
        Commands::Reindex => {
            index_cmd::run_reindex(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
