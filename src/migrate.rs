//! Index schema. Every statement is idempotent and runs on each open.

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per chunk; `id` is "{file_path}::{chunk_index}".
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            file_path TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            content TEXT NOT NULL,
            heading TEXT NOT NULL DEFAULT '',
            heading_level INTEGER NOT NULL DEFAULT 0,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            UNIQUE(file_path, chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Vectors keyed by content hash, shared across paths and kept across clears.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embedding_cache (
            hash TEXT NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (hash, model)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_file_path ON chunks(file_path)")
        .execute(pool)
        .await?;

    Ok(())
}
