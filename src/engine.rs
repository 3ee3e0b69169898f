//! Retrieval engine: owns the index snapshot lifecycle and answers queries.
//!
//! The engine joins three collaborators: the document store (SQLite), the
//! embedding provider, and the flat vector index. Queries embed the query
//! text, rank rows by inner product, then resolve each hit back to a stored
//! document, applying the channel filter at lookup time.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::index::{SimilaritySearch, Snapshot};
use crate::models::Match;
use crate::store;

/// Lifecycle of the in-memory snapshot.
///
/// `Unloaded` means nothing has been served yet; `Stale` means a snapshot
/// was served but an explicit invalidation marked the on-disk state as
/// changed underneath it. Both resolve the same way at the next query:
/// load from disk, else rebuild from the store.
#[derive(Debug, Clone)]
enum IndexState {
    Unloaded,
    Loaded(Arc<Snapshot>),
    Stale,
}

pub struct RetrievalEngine {
    pool: SqlitePool,
    provider: Box<dyn EmbeddingProvider>,
    index_dir: PathBuf,
    state: Mutex<IndexState>,
}

impl RetrievalEngine {
    pub fn new(
        pool: SqlitePool,
        provider: Box<dyn EmbeddingProvider>,
        index_dir: PathBuf,
    ) -> Self {
        Self {
            pool,
            provider,
            index_dir,
            state: Mutex::new(IndexState::Unloaded),
        }
    }

    /// Build an engine from configuration: the provider from `[embedding]`,
    /// the snapshot directory from `[index]`.
    pub fn from_config(config: &Config, pool: SqlitePool) -> Result<Self> {
        let provider = embedding::create_provider(&config.embedding)?;
        Ok(Self::new(pool, provider, config.index.dir.clone()))
    }

    /// Retrieve the most similar threads for `query`, at most `top_k`.
    ///
    /// `channel_filter` is applied after the nearest-neighbor search runs
    /// globally: a small channel can come back with fewer than `top_k`
    /// matches, or none, when its documents fall outside the global top-k.
    /// Filtering removes entries; it never reorders them.
    ///
    /// An empty store is not an error: the result is an empty list.
    pub async fn retrieve(
        &self,
        query: &str,
        channel_filter: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<Match>> {
        let Some(snapshot) = self.ensure_snapshot().await? else {
            return Ok(Vec::new());
        };

        let query_vector = embedding::embed_query(self.provider.as_ref(), query).await?;
        let hits = snapshot.index.search(&query_vector, top_k)?;

        let mut matches = Vec::with_capacity(hits.len());
        for hit in hits {
            // Out-of-range rows are dropped, not propagated.
            let Some(&doc_id) = snapshot.ids.get(hit.row) else {
                continue;
            };
            match store::get_doc(&self.pool, doc_id, channel_filter).await? {
                Some(doc) => matches.push(Match::from_document(doc, hit.score)),
                // Filtered out, or gone since the index was built.
                None => continue,
            }
        }

        Ok(matches)
    }

    /// Re-embed every document in scope and replace the persisted snapshot.
    ///
    /// The persisted index is normally rebuilt unscoped; passing a channel
    /// narrows the snapshot to that channel's documents. An empty scope
    /// yields `None` and leaves any previous snapshot in place, on disk and
    /// in memory.
    pub async fn rebuild(&self, channel: Option<&str>) -> Result<Option<Arc<Snapshot>>> {
        let Some(snapshot) = self.build_snapshot(channel).await? else {
            return Ok(None);
        };
        let mut state = self.state.lock().await;
        *state = IndexState::Loaded(snapshot.clone());
        Ok(Some(snapshot))
    }

    /// Discard the in-memory snapshot so the next query reloads from disk.
    /// Meant for when another process has rebuilt the persisted index.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        if matches!(&*state, IndexState::Loaded(_)) {
            *state = IndexState::Stale;
        }
    }

    /// Current snapshot, loading from disk or rebuilding as needed.
    /// `None` when the store is empty and nothing is persisted.
    ///
    /// The state lock is held across the disk load and the fallback rebuild
    /// so concurrent cold-start queries do not race duplicate embedding
    /// runs; once `Loaded`, queries clone the `Arc` out and embed without
    /// holding the lock.
    async fn ensure_snapshot(&self) -> Result<Option<Arc<Snapshot>>> {
        let mut state = self.state.lock().await;
        if let IndexState::Loaded(snapshot) = &*state {
            return Ok(Some(snapshot.clone()));
        }

        if let Some(snapshot) = Snapshot::load(&self.index_dir)? {
            let snapshot = Arc::new(snapshot);
            *state = IndexState::Loaded(snapshot.clone());
            return Ok(Some(snapshot));
        }

        match self.build_snapshot(None).await? {
            Some(snapshot) => {
                *state = IndexState::Loaded(snapshot.clone());
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    /// Embed all rows in scope and persist a fresh snapshot. `None` when the
    /// scope has no rows.
    async fn build_snapshot(&self, channel: Option<&str>) -> Result<Option<Arc<Snapshot>>> {
        let rows = store::list_texts(&self.pool, channel).await?;
        if rows.is_empty() {
            return Ok(None);
        }

        let ids: Vec<i64> = rows.iter().map(|(id, _)| *id).collect();
        let texts: Vec<String> = rows.into_iter().map(|(_, text)| text).collect();

        let vectors = self.provider.embed(&texts).await?;
        if vectors.len() != ids.len() {
            bail!(
                "embedding provider returned {} vectors for {} texts",
                vectors.len(),
                ids.len()
            );
        }

        let snapshot = Snapshot::from_parts(ids, vectors)?;
        snapshot.save(&self.index_dir)?;
        Ok(Some(Arc::new(snapshot)))
    }
}
