//! Top-k semantic retrieval.
//!
//! Embeds the question with the same provider used at index time and asks
//! the vector index for the nearest chunks. The provider's dimensionality
//! is checked against the one recorded in the index before any query runs.
//!
//! An empty result (blank question, empty index) is a normal outcome.
//! A broken embedding backend or store surfaces as
//! [`RetrievalError::Unavailable`] so callers can tell the two apart.

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::{ConfigError, RetrievalError};
use crate::models::RetrievalResult;
use crate::store::{check_dims, warn_on_model_change, VectorIndex};

pub struct Retriever<'a> {
    index: &'a dyn VectorIndex,
    embedder: &'a dyn EmbeddingProvider,
}

impl<'a> Retriever<'a> {
    pub fn new(index: &'a dyn VectorIndex, embedder: &'a dyn EmbeddingProvider) -> Self {
        Self { index, embedder }
    }

    pub async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult, RetrievalError> {
        if k == 0 {
            return Err(ConfigError::InvalidTopK.into());
        }
        if query.trim().is_empty() {
            return Ok(RetrievalResult::default());
        }

        let meta = self.index.meta().await.map_err(unavailable)?;
        let Some(meta) = meta else {
            tracing::debug!("index is empty; nothing to retrieve");
            return Ok(RetrievalResult::default());
        };
        check_dims(Some(&meta), self.embedder.dims())?;
        warn_on_model_change(Some(&meta), self.embedder.model_name());

        let vector = embed_query(self.embedder, query)
            .await
            .map_err(unavailable)?;
        let chunks = self.index.query(&vector, k).await.map_err(unavailable)?;

        tracing::debug!(k, hits = chunks.len(), "retrieval finished");
        Ok(RetrievalResult { chunks })
    }
}

/// Config errors pass through; everything else means the backend is down.
fn unavailable(err: anyhow::Error) -> RetrievalError {
    match err.downcast::<ConfigError>() {
        Ok(config) => RetrievalError::Config(config),
        Err(other) => RetrievalError::Unavailable(format!("{:#}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_id;
    use crate::embedding::{DisabledProvider, HashingProvider};
    use crate::models::{Chunk, Format, IndexEntry};
    use crate::store::InMemoryIndex;

    async fn seeded(provider: &HashingProvider, docs: &[(&str, &str)]) -> InMemoryIndex {
        let index = InMemoryIndex::new();
        for (path, text) in docs {
            let vector = embed_query(provider, text).await.unwrap();
            let entry = IndexEntry {
                chunk: Chunk {
                    id: chunk_id(path, 0),
                    source_path: path.to_string(),
                    collection: "kb".to_string(),
                    format: Format::Markdown,
                    chunk_index: 0,
                    hint: None,
                    text: text.to_string(),
                    hash: String::new(),
                },
                vector,
            };
            index
                .replace_document(path, provider.model_name(), &[entry])
                .await
                .unwrap();
        }
        index
    }

    #[tokio::test]
    async fn zero_k_is_config_error() {
        let provider = HashingProvider::new(32);
        let index = InMemoryIndex::new();
        let err = Retriever::new(&index, &provider)
            .retrieve("xss", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Config(ConfigError::InvalidTopK)));
    }

    #[tokio::test]
    async fn blank_query_and_empty_index_return_nothing() {
        let provider = HashingProvider::new(32);
        let index = InMemoryIndex::new();
        let retriever = Retriever::new(&index, &provider);
        assert!(retriever.retrieve("   ", 5).await.unwrap().is_empty());
        assert!(retriever.retrieve("what is xss", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn most_relevant_document_ranks_first() {
        let provider = HashingProvider::new(256);
        let index = seeded(
            &provider,
            &[
                ("xss.md", "cross site scripting injects script into web pages"),
                ("sqli.md", "sql injection manipulates database queries"),
            ],
        )
        .await;
        let result = Retriever::new(&index, &provider)
            .retrieve("how does sql injection manipulate queries", 2)
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.chunks[0].source_path, "sqli.md");
        assert!(result.chunks[0].score >= result.chunks[1].score);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_config_error() {
        let indexed_with = HashingProvider::new(64);
        let index = seeded(&indexed_with, &[("a.md", "buffer overflow")]).await;
        let queried_with = HashingProvider::new(32);
        let err = Retriever::new(&index, &queried_with)
            .retrieve("overflow", 3)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::Config(ConfigError::DimensionMismatch {
                expected: 64,
                actual: 32,
                ..
            })
        ));
    }

    struct OfflineEmbedder;

    #[async_trait::async_trait]
    impl EmbeddingProvider for OfflineEmbedder {
        fn model_name(&self) -> &str {
            "hashing"
        }
        fn dims(&self) -> usize {
            16
        }
        async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn broken_embedder_is_unavailable_not_empty() {
        let indexed_with = HashingProvider::new(16);
        let index = seeded(&indexed_with, &[("a.md", "phishing")]).await;
        let err = Retriever::new(&index, &OfflineEmbedder)
            .retrieve("phishing", 3)
            .await
            .unwrap_err();
        match err {
            RetrievalError::Unavailable(reason) => assert!(reason.contains("connection refused")),
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn disabled_embedder_cannot_query_a_populated_index() {
        let indexed_with = HashingProvider::new(8);
        let index = seeded(&indexed_with, &[("a.md", "ransomware")]).await;
        let err = Retriever::new(&index, &DisabledProvider)
            .retrieve("ransomware", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Config(_)));
    }
}
