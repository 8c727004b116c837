//! Change ledger: which documents are indexed, and at which fingerprint.
//!
//! The ledger lives in its own SQLite file, separate from the vector index.
//! A document is up to date iff its current fingerprint equals the stored
//! one. Entries are written by the orchestrator only after the document's
//! chunks have been committed to the index, so a crash between the two
//! leaves the document marked stale rather than falsely current.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::db;
use crate::migrate;
use crate::models::LedgerEntry;

#[derive(Clone)]
pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    /// Open (and create if needed) the ledger database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::migrate_ledger(&pool).await?;
        Ok(Self { pool })
    }

    /// `true` unless the ledger holds exactly this fingerprint for `path`.
    pub async fn needs_reindex(&self, path: &str, fingerprint: &str) -> Result<bool> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT fingerprint FROM ledger WHERE path = ?")
                .bind(path)
                .fetch_optional(&self.pool)
                .await?;
        Ok(stored.as_deref() != Some(fingerprint))
    }

    /// Upsert the fingerprint for `path`, stamped with the current time.
    pub async fn record(&self, path: &str, fingerprint: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO ledger (path, fingerprint, indexed_at)
            VALUES (?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                fingerprint = excluded.fingerprint,
                indexed_at = excluded.indexed_at
            "#,
        )
        .bind(path)
        .bind(fingerprint)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All entries, ordered by path.
    pub async fn status(&self) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query("SELECT path, fingerprint, indexed_at FROM ledger ORDER BY path")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| LedgerEntry {
                path: row.get("path"),
                fingerprint: row.get("fingerprint"),
                indexed_at: row.get("indexed_at"),
            })
            .collect())
    }

    pub async fn paths(&self) -> Result<Vec<String>> {
        let paths = sqlx::query_scalar("SELECT path FROM ledger ORDER BY path")
            .fetch_all(&self.pool)
            .await?;
        Ok(paths)
    }

    /// Drop the entry for `path`. Returns whether one existed.
    pub async fn forget(&self, path: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM ledger WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
