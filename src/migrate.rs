use anyhow::Result;
use sqlx::SqlitePool;

pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    // Create docs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS docs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            text TEXT NOT NULL,
            channel_label TEXT NOT NULL,
            team_id TEXT NOT NULL,
            channel_id TEXT NOT NULL,
            root_id TEXT NOT NULL,
            UNIQUE(channel_id, root_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_docs_channel_label ON docs(channel_label)")
        .execute(pool)
        .await?;

    Ok(())
}
