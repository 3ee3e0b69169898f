//! Document store operations over the `docs` table.
//!
//! One row per conversation thread, keyed by the source pair
//! (`channel_id`, `root_id`). Row ids are assigned once and survive
//! re-ingestion; the vector index refers to documents by these ids.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::models::Document;

/// Insert or update a thread. A no-op when `text` is empty.
///
/// On a (`channel_id`, `root_id`) conflict the existing row keeps its id and
/// takes the new `text`, `channel_label`, and `team_id`.
pub async fn upsert_doc(
    pool: &SqlitePool,
    text: &str,
    channel_label: &str,
    team_id: &str,
    channel_id: &str,
    root_id: &str,
) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO docs (text, channel_label, team_id, channel_id, root_id)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(channel_id, root_id) DO UPDATE SET
            text = excluded.text,
            channel_label = excluded.channel_label,
            team_id = excluded.team_id
        "#,
    )
    .bind(text)
    .bind(channel_label)
    .bind(team_id)
    .bind(channel_id)
    .bind(root_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch one document by id. With `channel_label` set, the row must also
/// carry that label or the lookup comes back empty.
pub async fn get_doc(
    pool: &SqlitePool,
    id: i64,
    channel_label: Option<&str>,
) -> Result<Option<Document>> {
    let row = if let Some(label) = channel_label {
        sqlx::query(
            "SELECT id, text, channel_label, team_id, channel_id, root_id FROM docs \
             WHERE id = ? AND channel_label = ?",
        )
        .bind(id)
        .bind(label)
        .fetch_optional(pool)
        .await?
    } else {
        sqlx::query("SELECT id, text, channel_label, team_id, channel_id, root_id FROM docs WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?
    };

    Ok(row.map(|row| Document {
        id: row.get("id"),
        text: row.get("text"),
        channel_label: row.get("channel_label"),
        team_id: row.get("team_id"),
        channel_id: row.get("channel_id"),
        root_id: row.get("root_id"),
    }))
}

/// All (id, text) pairs in ascending id order, optionally narrowed to one
/// channel. Index builds depend on this ordering to keep the ids array
/// reproducible.
pub async fn list_texts(
    pool: &SqlitePool,
    channel_label: Option<&str>,
) -> Result<Vec<(i64, String)>> {
    let rows = if let Some(label) = channel_label {
        sqlx::query("SELECT id, text FROM docs WHERE channel_label = ? ORDER BY id")
            .bind(label)
            .fetch_all(pool)
            .await?
    } else {
        sqlx::query("SELECT id, text FROM docs ORDER BY id")
            .fetch_all(pool)
            .await?
    };

    Ok(rows
        .into_iter()
        .map(|row| (row.get("id"), row.get("text")))
        .collect())
}

pub async fn count_docs(pool: &SqlitePool, channel_label: Option<&str>) -> Result<i64> {
    let count: i64 = if let Some(label) = channel_label {
        sqlx::query_scalar("SELECT COUNT(*) FROM docs WHERE channel_label = ?")
            .bind(label)
            .fetch_one(pool)
            .await?
    } else {
        sqlx::query_scalar("SELECT COUNT(*) FROM docs")
            .fetch_one(pool)
            .await?
    };
    Ok(count)
}
