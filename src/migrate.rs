//! Idempotent schema creation for the index and ledger databases.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the vector index tables.
pub async fn migrate_index(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            source_path TEXT NOT NULL,
            collection TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            format TEXT NOT NULL,
            hint TEXT,
            text TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            indexed_at INTEGER NOT NULL,
            UNIQUE(source_path, chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Embedding model and dimensionality, recorded on first write.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source_path ON chunks(source_path)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_collection ON chunks(collection)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the change ledger table.
pub async fn migrate_ledger(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ledger (
            path TEXT PRIMARY KEY,
            fingerprint TEXT NOT NULL,
            indexed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create both databases and their schemas. Safe to run repeatedly.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let index = db::connect(&config.db.path).await?;
    migrate_index(&index).await?;
    index.close().await;

    let ledger = db::connect(&config.db.ledger_path).await?;
    migrate_ledger(&ledger).await?;
    ledger.close().await;

    Ok(())
}
