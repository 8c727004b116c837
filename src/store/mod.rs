//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the seam between the pipeline and the
//! embedded vector database. Entries are keyed by deterministic chunk id,
//! so writes are upserts. Each document is replaced as a unit: its new
//! chunks are upserted and any stale tail (chunks whose index is at or past
//! the new count) is deleted in the same transaction.
//!
//! The index records the embedding model and dimensionality on its first
//! write. Later writes with a different dimensionality are rejected with
//! [`ConfigError::DimensionMismatch`].
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`SqliteIndex`] | persistent index (`[db] path`) |
//! | [`InMemoryIndex`] | tests and throwaway sessions |

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryIndex;
pub use sqlite::SqliteIndex;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::cmp::Ordering;

use crate::error::ConfigError;
use crate::models::{IndexEntry, ScoredChunk};

/// Embedding model identity recorded by the index on first write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexMeta {
    pub model: String,
    pub dims: usize,
}

/// Per-collection totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSummary {
    pub collection: String,
    pub documents: u64,
    pub chunks: u64,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Model and dimensionality, or `None` before the first write.
    async fn meta(&self) -> Result<Option<IndexMeta>>;

    /// Atomically replace every entry of `source_path` with `entries`.
    ///
    /// All entries must carry vectors of one dimensionality, matching the
    /// recorded one if any. A mismatch fails with a [`ConfigError`] (which
    /// callers can recover via `downcast_ref`) and writes nothing.
    async fn replace_document(
        &self,
        source_path: &str,
        model: &str,
        entries: &[IndexEntry],
    ) -> Result<()>;

    /// The `k` entries most similar to `vector`, best first, ties broken by id.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    /// Stored entries of one document, ordered by chunk index.
    async fn entries_for(&self, source_path: &str) -> Result<Vec<IndexEntry>>;

    /// Delete every entry of `source_path`. Returns the number removed.
    async fn remove_document(&self, source_path: &str) -> Result<u64>;

    /// Distinct document paths, sorted.
    async fn document_paths(&self) -> Result<Vec<String>>;

    /// Total number of stored chunks.
    async fn count(&self) -> Result<u64>;

    async fn collections(&self) -> Result<Vec<CollectionSummary>>;
}

/// Fail if `dims` differs from the dimensionality recorded in `meta`.
pub fn check_dims(meta: Option<&IndexMeta>, dims: usize) -> Result<(), ConfigError> {
    match meta {
        Some(m) if m.dims != dims => Err(ConfigError::DimensionMismatch {
            expected: m.dims,
            actual: dims,
            model: m.model.clone(),
        }),
        _ => Ok(()),
    }
}

/// Warn when the index was built by a different embedding model than
/// `model`. Same-width models still produce incomparable vectors, so the
/// index should be rebuilt. Returns whether the models differ.
pub fn warn_on_model_change(meta: Option<&IndexMeta>, model: &str) -> bool {
    match meta {
        Some(m) if m.model != model => {
            tracing::warn!(
                indexed_with = %m.model,
                current = model,
                "index was built with a different embedding model; results may be meaningless until the index is rebuilt"
            );
            true
        }
        _ => false,
    }
}

/// Dimensionality shared by every entry of a write batch.
fn batch_dims(entries: &[IndexEntry]) -> Result<Option<usize>, ConfigError> {
    let Some(first) = entries.first() else {
        return Ok(None);
    };
    let dims = first.vector.len();
    if let Some(bad) = entries.iter().find(|e| e.vector.len() != dims) {
        return Err(ConfigError::Invalid(format!(
            "chunk {} has a {}-dim vector, expected {}",
            bad.chunk.id,
            bad.vector.len(),
            dims
        )));
    }
    if dims == 0 {
        return Err(ConfigError::Invalid("empty embedding vector".to_string()));
    }
    Ok(Some(dims))
}

/// Sort by descending score, then ascending id, and keep the top `k`.
fn rank(mut scored: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Format;

    #[test]
    fn model_change_is_detected_at_equal_width() {
        let meta = IndexMeta {
            model: "all-minilm-l6-v2".to_string(),
            dims: 384,
        };
        assert!(check_dims(Some(&meta), 384).is_ok());
        assert!(warn_on_model_change(Some(&meta), "bge-small-en-v1.5"));
        assert!(!warn_on_model_change(Some(&meta), "all-minilm-l6-v2"));
        assert!(!warn_on_model_change(None, "bge-small-en-v1.5"));
    }

    fn scored(id: &str, score: f64) -> ScoredChunk {
        ScoredChunk {
            id: id.to_string(),
            source_path: "a.md".to_string(),
            format: Format::Markdown,
            chunk_index: 0,
            hint: None,
            text: String::new(),
            score,
        }
    }

    #[test]
    fn rank_orders_by_score_then_id() {
        let out = rank(
            vec![
                scored("c", 0.5),
                scored("b", 0.9),
                scored("a", 0.5),
                scored("d", 0.1),
            ],
            3,
        );
        let ids: Vec<_> = out.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn check_dims_accepts_fresh_index() {
        assert!(check_dims(None, 384).is_ok());
        let meta = IndexMeta {
            model: "all-minilm-l6-v2".into(),
            dims: 384,
        };
        assert!(check_dims(Some(&meta), 384).is_ok());
        assert_eq!(
            check_dims(Some(&meta), 768).unwrap_err(),
            ConfigError::DimensionMismatch {
                expected: 384,
                actual: 768,
                model: "all-minilm-l6-v2".into()
            }
        );
    }
}
