//! The assistant context: everything a command needs, built once.
//!
//! [`Samatha`] owns the configuration, the vector index, the change ledger,
//! the embedding provider and the language model. The CLI opens it at
//! startup and passes it by reference; tests assemble one from doubles with
//! [`Samatha::with_parts`].

use anyhow::Result;
use std::sync::Arc;

use crate::answer::{self, AnswerSettings};
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::RetrievalError;
use crate::indexer::{IndexOptions, Indexer};
use crate::ledger::Ledger;
use crate::llm::{self, LanguageModel};
use crate::models::{Answer, IndexReport, RetrievalResult};
use crate::progress::ProgressReporter;
use crate::retrieve::Retriever;
use crate::store::{SqliteIndex, VectorIndex};

pub struct Samatha {
    config: Config,
    index: Arc<dyn VectorIndex>,
    ledger: Ledger,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LanguageModel>,
}

impl Samatha {
    /// Open the databases named in `config` and build the configured
    /// providers. The local embedding model is loaded on first use.
    pub async fn open(config: Config) -> Result<Self> {
        let index = SqliteIndex::open(&config.db.path).await?;
        let ledger = Ledger::open(&config.db.ledger_path).await?;
        let embedder = embedding::create_provider(&config.embedding)?;
        let llm = llm::create_model(&config.generation);
        tracing::debug!(
            embedding = embedder.model_name(),
            generation = llm.name(),
            "assistant context ready"
        );
        Ok(Self::with_parts(
            config,
            Arc::new(index),
            ledger,
            embedder,
            llm,
        ))
    }

    pub fn with_parts(
        config: Config,
        index: Arc<dyn VectorIndex>,
        ledger: Ledger,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            config,
            index,
            ledger,
            embedder,
            llm,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn embedder(&self) -> &dyn EmbeddingProvider {
        self.embedder.as_ref()
    }

    pub fn llm(&self) -> &dyn LanguageModel {
        self.llm.as_ref()
    }

    pub fn generation_enabled(&self) -> bool {
        self.llm.name() != "disabled"
    }

    /// Reindex the configured corpus root.
    pub async fn reindex(
        &self,
        force: bool,
        progress: &dyn ProgressReporter,
    ) -> Result<IndexReport> {
        let indexer = Indexer::new(
            self.index(),
            &self.ledger,
            self.embedder(),
            IndexOptions::from_config(&self.config),
        );
        indexer
            .reindex(&self.config.corpus.root, force, progress)
            .await
    }

    /// Top-k retrieval; `k` defaults to `[retrieval] top_k`.
    pub async fn retrieve(
        &self,
        query: &str,
        k: Option<usize>,
    ) -> Result<RetrievalResult, RetrievalError> {
        let k = k.unwrap_or(self.config.retrieval.top_k);
        Retriever::new(self.index(), self.embedder())
            .retrieve(query, k)
            .await
    }

    /// Retrieve, then compose an answer.
    pub async fn ask(&self, query: &str, k: Option<usize>) -> Result<Answer, RetrievalError> {
        let result = self.retrieve(query, k).await?;
        let settings = AnswerSettings::from(&self.config.generation);
        Ok(answer::answer(self.llm(), query, &result, &settings).await)
    }
}
