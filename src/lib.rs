//! # Thread Recall
//!
//! Semantic retrieval and Q&A over Microsoft Teams channel threads.
//!
//! Thread Recall ingests channel threads (root messages with their replies)
//! from the Microsoft Graph API, stores them in SQLite, embeds them with a
//! configurable provider (Ollama or OpenAI), and serves similarity search
//! with grounded answer generation via a CLI and a JSON HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌────────────┐
//! │ Teams/Graph  │──▶│     Sync     │──▶│  SQLite +  │
//! │  connector   │   │ upsert+index │   │  snapshot  │
//! └──────────────┘   └──────────────┘   └─────┬──────┘
//!                                             │
//!                         ┌───────────────────┤
//!                         ▼                   ▼
//!                    ┌──────────┐       ┌──────────┐
//!                    │   CLI    │       │   HTTP   │
//!                    │ (recall) │       │ (server) │
//!                    └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! recall init                   # create database
//! recall sync                   # ingest configured Teams channels
//! recall query "vpn reset"      # semantic search
//! recall query "vpn reset" --answer
//! recall serve                  # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`store`] | Document store over SQLite |
//! | [`index`] | Vector index and snapshot persistence |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`engine`] | Retrieval engine and index lifecycle |
//! | [`answer`] | Grounded answer generation |
//! | [`connector_teams`] | Microsoft Teams connector |
//! | [`sync`] | Sync orchestration |
//! | [`server`] | HTTP query server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema setup |

pub mod answer;
pub mod channels;
pub mod config;
pub mod connector_teams;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod index;
pub mod index_cmd;
pub mod migrate;
pub mod models;
pub mod query;
pub mod server;
pub mod store;
pub mod sync;
