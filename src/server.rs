//! HTTP query service.
//!
//! Exposes retrieval and answer generation over a small JSON API so chat
//! frontends can query the store without linking the crate.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/channels` | List configured channels |
//! | `POST` | `/query` | Retrieve matches and generate an answer |
//! | `POST` | `/reload` | Mark the in-memory index stale |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! frontends calling the API directly.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::answer;
use crate::config::Config;
use crate::db;
use crate::engine::RetrievalEngine;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    /// Application configuration (wrapped in `Arc` for cheap cloning across handlers).
    config: Arc<Config>,
    /// The retrieval engine, shared by every in-flight request.
    engine: Arc<RetrievalEngine>,
}

/// Starts the HTTP query server.
///
/// Binds to the address configured in `[server].bind` and registers all
/// route handlers. The server runs indefinitely until the process is
/// terminated.
///
/// # Returns
///
/// Returns `Ok(())` when the server shuts down, or an error if binding fails.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let pool = db::connect(config).await?;
    let engine = Arc::new(RetrievalEngine::from_config(config, pool)?);

    let state = AppState {
        config: Arc::new(config.clone()),
        engine,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/channels", get(handle_channels))
        .route("/query", post(handle_query))
        .route("/reload", post(handle_reload))
        .layer(cors)
        .with_state(state);

    println!("Thread Recall server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Inner error detail with a machine-readable code and human-readable message.
#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Constructs a 400 Bad Request error.
fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

/// Constructs a 500 error, logging the underlying failure to stderr.
fn internal_error(err: anyhow::Error) -> AppError {
    eprintln!("Warning: request failed: {:#}", err);
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
    }
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

/// Handler for `GET /health`.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /channels ============

/// One configured channel as reported to clients.
#[derive(Serialize)]
struct ChannelInfo {
    /// Display form, `"<team> / <channel>"`.
    label: String,
    /// Partition key accepted by `POST /query`, `"<team>:<channel>"`.
    channel_label: String,
    team_id: String,
    channel_id: String,
}

/// JSON response body for `GET /channels`.
#[derive(Serialize)]
struct ChannelsResponse {
    channels: Vec<ChannelInfo>,
}

/// Handler for `GET /channels`.
///
/// Lists the channels from the config file so frontends can populate a
/// filter dropdown without separate configuration.
async fn handle_channels(State(state): State<AppState>) -> Json<ChannelsResponse> {
    let channels = state
        .config
        .channels
        .iter()
        .map(|c| ChannelInfo {
            label: c.display_label(),
            channel_label: c.label(),
            team_id: c.team_id.clone(),
            channel_id: c.channel_id.clone(),
        })
        .collect();

    Json(ChannelsResponse { channels })
}

// ============ POST /query ============

/// JSON request body for `POST /query`.
#[derive(Deserialize)]
struct QueryRequest {
    #[serde(default)]
    query: String,
    /// Channel partition to search; empty or absent means all channels.
    #[serde(default)]
    channel_label: Option<String>,
    /// Number of matches wanted; defaulted to 5 and clamped to [1, 10].
    #[serde(default)]
    top_k: Option<usize>,
}

/// One ranked match as returned to clients.
#[derive(Serialize)]
struct MatchInfo {
    id: i64,
    score: f32,
    channel_label: String,
    /// The match text truncated to 500 characters.
    snippet: String,
}

/// JSON response body for `POST /query`.
#[derive(Serialize)]
struct QueryResponse {
    answer: String,
    matches: Vec<MatchInfo>,
}

/// Handler for `POST /query`.
///
/// Retrieves the closest stored threads and generates an answer grounded in
/// them. A blank query is a `400`; a query with no matches returns the fixed
/// no-matches answer with an empty match list, skipping generation.
async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    let query = req.query.trim();
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let filter = req
        .channel_label
        .as_deref()
        .map(str::trim)
        .filter(|label| !label.is_empty());
    let top_k = req.top_k.unwrap_or(5).clamp(1, 10);

    let matches = state
        .engine
        .retrieve(query, filter, top_k)
        .await
        .map_err(internal_error)?;

    if matches.is_empty() {
        return Ok(Json(QueryResponse {
            answer: answer::NO_MATCHES_ANSWER.to_string(),
            matches: Vec::new(),
        }));
    }

    let answer = answer::generate(&state.config.chat, query, &matches)
        .await
        .map_err(internal_error)?;

    let matches = matches
        .into_iter()
        .map(|m| {
            let snippet = answer::truncate_chars(&m.text, 500).to_string();
            MatchInfo {
                id: m.id,
                score: m.score,
                channel_label: m.channel_label,
                snippet,
            }
        })
        .collect();

    Ok(Json(QueryResponse { answer, matches }))
}

// ============ POST /reload ============

/// Handler for `POST /reload`.
///
/// Marks the engine's in-memory index stale so the next query reloads the
/// snapshot from disk. Called after an external `recall sync` run to pick up
/// the rebuilt index without restarting the server.
async fn handle_reload(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.engine.invalidate().await;
    Json(serde_json::json!({ "status": "ok" }))
}
