//! Core data models used throughout Thread Recall.
//!
//! These types represent the stored conversation threads, the threads as
//! fetched from a source channel, and the ranked matches returned by the
//! retrieval engine.

/// A conversation thread as stored in the document store.
///
/// `id` is assigned by the store and stays stable across re-ingestion; the
/// pair (`channel_id`, `root_id`) identifies the source thread and is unique.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: i64,
    pub text: String,
    pub channel_label: String,
    pub team_id: String,
    pub channel_id: String,
    pub root_id: String,
}

/// A retrieval result: a stored document plus its similarity score.
///
/// `score` is the raw inner product between the query vector and the
/// document vector; it is only in [0, 1] when the embedding model returns
/// unit-norm vectors.
#[derive(Debug, Clone)]
pub struct Match {
    pub id: i64,
    pub text: String,
    pub channel_label: String,
    pub team_id: String,
    pub channel_id: String,
    pub root_id: String,
    pub score: f32,
}

impl Match {
    pub fn from_document(doc: Document, score: f32) -> Self {
        Self {
            id: doc.id,
            text: doc.text,
            channel_label: doc.channel_label,
            team_id: doc.team_id,
            channel_id: doc.channel_id,
            root_id: doc.root_id,
            score,
        }
    }
}

/// One thread fetched from a source channel, before storage.
///
/// `text` is the merged plain-text transcript (`ROOT:` line plus `REPLY:`
/// lines); it may be empty when every message body stripped to nothing, in
/// which case the store upsert drops it.
#[derive(Debug, Clone)]
pub struct ChannelThread {
    pub root_id: String,
    pub text: String,
}
