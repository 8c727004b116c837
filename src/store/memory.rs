//! In-memory [`VectorIndex`] for tests and throwaway sessions.
//!
//! Entries live in a `BTreeMap` keyed by chunk id behind `std::sync::RwLock`.
//! Search is brute-force cosine similarity, same as the SQLite backend.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{IndexEntry, ScoredChunk};

use super::{batch_dims, check_dims, rank, CollectionSummary, IndexMeta, VectorIndex};

#[derive(Default)]
struct State {
    meta: Option<IndexMeta>,
    entries: BTreeMap<String, IndexEntry>,
}

#[derive(Default)]
pub struct InMemoryIndex {
    state: RwLock<State>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow::anyhow!("in-memory index lock poisoned")
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn meta(&self) -> Result<Option<IndexMeta>> {
        Ok(self.state.read().map_err(poisoned)?.meta.clone())
    }

    async fn replace_document(
        &self,
        source_path: &str,
        model: &str,
        entries: &[IndexEntry],
    ) -> Result<()> {
        let dims = batch_dims(entries)?;
        let mut state = self.state.write().map_err(poisoned)?;

        if let Some(dims) = dims {
            check_dims(state.meta.as_ref(), dims)?;
            if state.meta.is_none() {
                state.meta = Some(IndexMeta {
                    model: model.to_string(),
                    dims,
                });
            }
        }

        let keep = entries.len() as i64;
        state
            .entries
            .retain(|_, e| e.chunk.source_path != source_path || e.chunk.chunk_index < keep);
        for entry in entries {
            let mut entry = entry.clone();
            entry.chunk.source_path = source_path.to_string();
            state.entries.insert(entry.chunk.id.clone(), entry);
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let state = self.state.read().map_err(poisoned)?;
        let scored = state
            .entries
            .values()
            .map(|e| ScoredChunk {
                id: e.chunk.id.clone(),
                source_path: e.chunk.source_path.clone(),
                format: e.chunk.format,
                chunk_index: e.chunk.chunk_index,
                hint: e.chunk.hint.clone(),
                text: e.chunk.text.clone(),
                score: cosine_similarity(vector, &e.vector) as f64,
            })
            .collect();
        Ok(rank(scored, k))
    }

    async fn entries_for(&self, source_path: &str) -> Result<Vec<IndexEntry>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut entries: Vec<IndexEntry> = state
            .entries
            .values()
            .filter(|e| e.chunk.source_path == source_path)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.chunk.chunk_index);
        Ok(entries)
    }

    async fn remove_document(&self, source_path: &str) -> Result<u64> {
        let mut state = self.state.write().map_err(poisoned)?;
        let before = state.entries.len();
        state.entries.retain(|_, e| e.chunk.source_path != source_path);
        Ok((before - state.entries.len()) as u64)
    }

    async fn document_paths(&self) -> Result<Vec<String>> {
        let state = self.state.read().map_err(poisoned)?;
        let paths: BTreeSet<String> = state
            .entries
            .values()
            .map(|e| e.chunk.source_path.clone())
            .collect();
        Ok(paths.into_iter().collect())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.state.read().map_err(poisoned)?.entries.len() as u64)
    }

    async fn collections(&self) -> Result<Vec<CollectionSummary>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut by_collection: BTreeMap<&str, (BTreeSet<&str>, u64)> = BTreeMap::new();
        for e in state.entries.values() {
            let slot = by_collection.entry(e.chunk.collection.as_str()).or_default();
            slot.0.insert(e.chunk.source_path.as_str());
            slot.1 += 1;
        }
        Ok(by_collection
            .into_iter()
            .map(|(collection, (docs, chunks))| CollectionSummary {
                collection: collection.to_string(),
                documents: docs.len() as u64,
                chunks,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_id;
    use crate::error::ConfigError;
    use crate::models::{Chunk, Format};

    fn entry(path: &str, index: i64, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            chunk: Chunk {
                id: chunk_id(path, index),
                source_path: path.to_string(),
                collection: "cves".to_string(),
                format: Format::Json,
                chunk_index: index,
                hint: None,
                text: format!("{} #{}", path, index),
                hash: String::new(),
            },
            vector,
        }
    }

    #[tokio::test]
    async fn replace_trims_tail_and_keeps_other_documents() {
        let index = InMemoryIndex::new();
        let a: Vec<_> = (0..3).map(|i| entry("a.json", i, vec![1.0, 0.0])).collect();
        index.replace_document("a.json", "m", &a).await.unwrap();
        index
            .replace_document("b.json", "m", &[entry("b.json", 0, vec![0.0, 1.0])])
            .await
            .unwrap();

        index
            .replace_document("a.json", "m", &a[..1])
            .await
            .unwrap();

        assert_eq!(index.count().await.unwrap(), 2);
        assert_eq!(index.entries_for("a.json").await.unwrap(), a[..1].to_vec());
        assert_eq!(
            index.document_paths().await.unwrap(),
            vec!["a.json", "b.json"]
        );
    }

    #[tokio::test]
    async fn rejects_mixed_dimensionality() {
        let index = InMemoryIndex::new();
        index
            .replace_document("a.json", "m", &[entry("a.json", 0, vec![1.0, 0.0])])
            .await
            .unwrap();
        let err = index
            .replace_document("b.json", "m", &[entry("b.json", 0, vec![1.0])])
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[tokio::test]
    async fn equal_scores_break_ties_by_id() {
        let index = InMemoryIndex::new();
        for path in ["z.json", "m.json", "a.json"] {
            index
                .replace_document(path, "m", &[entry(path, 0, vec![1.0, 1.0])])
                .await
                .unwrap();
        }
        let hits = index.query(&[1.0, 1.0], 3).await.unwrap();
        let mut ids: Vec<_> = hits.iter().map(|h| h.id.clone()).collect();
        let returned = ids.clone();
        ids.sort();
        assert_eq!(returned, ids);
    }

    #[tokio::test]
    async fn collections_summarize_documents_and_chunks() {
        let index = InMemoryIndex::new();
        let a: Vec<_> = (0..2).map(|i| entry("a.json", i, vec![1.0])).collect();
        index.replace_document("a.json", "m", &a).await.unwrap();
        let summary = index.collections().await.unwrap();
        assert_eq!(summary[0].documents, 1);
        assert_eq!(summary[0].chunks, 2);
    }
}
