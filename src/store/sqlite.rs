//! SQLite-backed [`VectorIndex`].
//!
//! Vectors are stored as little-endian f32 BLOBs next to the chunk text.
//! Similarity search is brute-force cosine over every stored vector, which
//! is fine for corpora of a few hundred thousand chunks.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::migrate;
use crate::models::{Chunk, Format, IndexEntry, ScoredChunk};

use super::{batch_dims, check_dims, rank, CollectionSummary, IndexMeta, VectorIndex};

pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    /// Open (and create if needed) the index database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::migrate_index(&pool).await?;
        Ok(Self { pool })
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn read_meta<'e, E>(executor: E) -> Result<Option<IndexMeta>>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let rows = sqlx::query("SELECT key, value FROM index_meta")
        .fetch_all(executor)
        .await?;

    let mut model = None;
    let mut dims = None;
    for row in &rows {
        let key: String = row.get("key");
        let value: String = row.get("value");
        match key.as_str() {
            "embedding_model" => model = Some(value),
            "dims" => dims = Some(value.parse::<usize>()?),
            _ => {}
        }
    }

    Ok(match (model, dims) {
        (Some(model), Some(dims)) => Some(IndexMeta { model, dims }),
        _ => None,
    })
}

fn parse_format(value: &str) -> Result<Format> {
    Format::parse(value).ok_or_else(|| anyhow::anyhow!("unknown format '{}' in index", value))
}

fn row_to_entry(row: &SqliteRow) -> Result<IndexEntry> {
    let format: String = row.get("format");
    let blob: Vec<u8> = row.get("embedding");
    Ok(IndexEntry {
        chunk: Chunk {
            id: row.get("id"),
            source_path: row.get("source_path"),
            collection: row.get("collection"),
            format: parse_format(&format)?,
            chunk_index: row.get("chunk_index"),
            hint: row.get("hint"),
            text: row.get("text"),
            hash: row.get("content_hash"),
        },
        vector: blob_to_vec(&blob),
    })
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn meta(&self) -> Result<Option<IndexMeta>> {
        read_meta(&self.pool).await
    }

    async fn replace_document(
        &self,
        source_path: &str,
        model: &str,
        entries: &[IndexEntry],
    ) -> Result<()> {
        let dims = batch_dims(entries)?;
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;

        if let Some(dims) = dims {
            let meta = read_meta(&mut *tx).await?;
            check_dims(meta.as_ref(), dims)?;
            if meta.is_none() {
                for (key, value) in [("embedding_model", model.to_string()), ("dims", dims.to_string())] {
                    sqlx::query("INSERT OR REPLACE INTO index_meta (key, value) VALUES (?, ?)")
                        .bind(key)
                        .bind(value)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        for entry in entries {
            let chunk = &entry.chunk;
            sqlx::query(
                r#"
                INSERT INTO chunks (id, source_path, collection, chunk_index, format, hint,
                                    text, content_hash, embedding, indexed_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    collection = excluded.collection,
                    format = excluded.format,
                    hint = excluded.hint,
                    text = excluded.text,
                    content_hash = excluded.content_hash,
                    embedding = excluded.embedding,
                    indexed_at = excluded.indexed_at
                "#,
            )
            .bind(&chunk.id)
            .bind(source_path)
            .bind(&chunk.collection)
            .bind(chunk.chunk_index)
            .bind(chunk.format.as_str())
            .bind(&chunk.hint)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(vec_to_blob(&entry.vector))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM chunks WHERE source_path = ? AND chunk_index >= ?")
            .bind(source_path)
            .bind(entries.len() as i64)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query(
            "SELECT id, source_path, format, chunk_index, hint, text, embedding FROM chunks",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let format: String = row.get("format");
            scored.push(ScoredChunk {
                id: row.get("id"),
                source_path: row.get("source_path"),
                format: parse_format(&format)?,
                chunk_index: row.get("chunk_index"),
                hint: row.get("hint"),
                text: row.get("text"),
                score: cosine_similarity(vector, &blob_to_vec(&blob)) as f64,
            });
        }

        Ok(rank(scored, k))
    }

    async fn entries_for(&self, source_path: &str) -> Result<Vec<IndexEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, source_path, collection, chunk_index, format, hint, text,
                   content_hash, embedding
            FROM chunks
            WHERE source_path = ?
            ORDER BY chunk_index ASC
            "#,
        )
        .bind(source_path)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn remove_document(&self, source_path: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE source_path = ?")
            .bind(source_path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn document_paths(&self) -> Result<Vec<String>> {
        let paths =
            sqlx::query_scalar("SELECT DISTINCT source_path FROM chunks ORDER BY source_path")
                .fetch_all(&self.pool)
                .await?;
        Ok(paths)
    }

    async fn count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }

    async fn collections(&self) -> Result<Vec<CollectionSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT collection,
                   COUNT(DISTINCT source_path) AS documents,
                   COUNT(*) AS chunks
            FROM chunks
            GROUP BY collection
            ORDER BY collection
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| CollectionSummary {
                collection: row.get("collection"),
                documents: row.get::<i64, _>("documents") as u64,
                chunks: row.get::<i64, _>("chunks") as u64,
            })
            .collect())
    }
}
