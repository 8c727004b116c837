//! Incremental indexing orchestrator.
//!
//! One pass of `reindex`:
//!
//! ```text
//! lock → walk corpus → per file: read → fingerprint → ledger check
//!      → load → chunk → embed (batched) → replace in index → record in ledger
//!      → (forced passes) prune documents gone from disk
//! ```
//!
//! Per-document failures are recorded in the [`IndexReport`] and the pass
//! moves on. A [`ConfigError`] (bad chunking, embedding dimensionality that
//! disagrees with the index) aborts the pass.
//!
//! The ledger is written only after the index transaction for a document
//! commits, so an interrupted pass can leave a document stale but never
//! marked current with missing chunks.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::chunk;
use crate::config::Config;
use crate::discover;
use crate::embedding::EmbeddingProvider;
use crate::error::{ConfigError, IndexWriteError};
use crate::ledger::Ledger;
use crate::loader;
use crate::models::{FailedDocument, FailureStage, IndexEntry, IndexReport, SourceDocument};
use crate::progress::{IndexProgressEvent, ProgressReporter};
use crate::store::{check_dims, warn_on_model_change, VectorIndex};

/// Knobs for a reindex pass, usually taken from [`Config`].
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub chunk_size: usize,
    pub overlap: usize,
    pub batch_size: usize,
    pub exclude_globs: Vec<String>,
    pub follow_symlinks: bool,
    /// Single-writer lock file. `None` disables locking (in-memory indexes).
    pub lock_path: Option<PathBuf>,
}

impl IndexOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.chunking.chunk_size,
            overlap: config.chunking.overlap,
            batch_size: config.embedding.batch_size,
            exclude_globs: config.corpus.exclude_globs.clone(),
            follow_symlinks: config.corpus.follow_symlinks,
            lock_path: Some(lock_path_for(&config.db.path)),
        }
    }
}

/// `<index db>.lock`, next to the index database.
pub fn lock_path_for(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Single-writer lock on `<index db>.lock`.
///
/// An advisory OS lock on the file, held through the guard returned by
/// [`IndexLock::try_acquire`]. The kernel drops it when the holding process
/// exits, however it exits, so a lock file left on disk never blocks a
/// later pass by itself.
pub struct IndexLock {
    path: PathBuf,
    file: fd_lock::RwLock<File>,
}

impl IndexLock {
    /// Open (or create) the lock file without locking it.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: fd_lock::RwLock::new(file),
        })
    }

    /// Take the lock for as long as the guard lives. Fails immediately if
    /// another pass holds it.
    pub fn try_acquire(&mut self) -> Result<fd_lock::RwLockWriteGuard<'_, File>> {
        let path = self.path.display().to_string();
        let mut guard = match self.file.try_write() {
            Ok(guard) => guard,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                bail!("another indexing pass is running (lock held on {})", path)
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to lock {}", path)),
        };
        // Holder pid, informational only.
        if guard.set_len(0).is_ok() {
            let _ = writeln!(&mut *guard, "{}", std::process::id());
        }
        Ok(guard)
    }
}

/// SHA-256 hex digest of file contents.
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

enum Outcome {
    Skipped,
    Processed { chunks: u64 },
    Failed(FailedDocument),
}

fn failed(doc: &SourceDocument, stage: FailureStage, reason: impl ToString) -> Outcome {
    Outcome::Failed(FailedDocument {
        path: doc.path.clone(),
        stage,
        reason: reason.to_string(),
    })
}

/// Pull a [`ConfigError`] out of an error chain; anything else is per-document.
fn split_config_error(err: anyhow::Error) -> Result<anyhow::Error> {
    match err.downcast::<ConfigError>() {
        Ok(config) => Err(config.into()),
        Err(other) => Ok(other),
    }
}

pub struct Indexer<'a> {
    index: &'a dyn VectorIndex,
    ledger: &'a Ledger,
    embedder: &'a dyn EmbeddingProvider,
    options: IndexOptions,
}

impl<'a> Indexer<'a> {
    pub fn new(
        index: &'a dyn VectorIndex,
        ledger: &'a Ledger,
        embedder: &'a dyn EmbeddingProvider,
        options: IndexOptions,
    ) -> Self {
        Self {
            index,
            ledger,
            embedder,
            options,
        }
    }

    /// Bring the index up to date with the files under `root`.
    ///
    /// With `force`, every document is reprocessed regardless of the ledger
    /// and documents no longer on disk are pruned.
    pub async fn reindex(
        &self,
        root: &Path,
        force: bool,
        progress: &dyn ProgressReporter,
    ) -> Result<IndexReport> {
        let started = Instant::now();
        chunk::validate(self.options.chunk_size, self.options.overlap)?;
        if self.options.batch_size == 0 {
            return Err(ConfigError::Invalid("embedding.batch_size must be > 0".into()).into());
        }
        if self.embedder.dims() == 0 {
            bail!("embedding provider '{}' is disabled; cannot index", self.embedder.model_name());
        }

        let mut lock = match &self.options.lock_path {
            Some(path) => Some(IndexLock::open(path)?),
            None => None,
        };
        let _guard = match lock.as_mut() {
            Some(lock) => Some(lock.try_acquire()?),
            None => None,
        };

        let meta = self.index.meta().await?;
        check_dims(meta.as_ref(), self.embedder.dims())?;
        warn_on_model_change(meta.as_ref(), self.embedder.model_name());

        progress.report(IndexProgressEvent::Discovering {
            root: root.display().to_string(),
        });
        let docs = discover::scan_corpus(
            root,
            &self.options.exclude_globs,
            self.options.follow_symlinks,
        )?;
        let total = docs.len() as u64;
        tracing::info!(root = %root.display(), documents = total, force, "reindex started");

        let mut report = IndexReport {
            discovered: total,
            ..Default::default()
        };

        for (i, doc) in docs.iter().enumerate() {
            match self.process(doc, force).await? {
                Outcome::Skipped => report.skipped += 1,
                Outcome::Processed { chunks } => {
                    report.processed += 1;
                    report.chunks_written += chunks;
                }
                Outcome::Failed(failure) => {
                    tracing::warn!(
                        path = %failure.path,
                        stage = ?failure.stage,
                        reason = %failure.reason,
                        "document failed"
                    );
                    report.failed += 1;
                    report.failures.push(failure);
                }
            }
            progress.report(IndexProgressEvent::Indexing {
                n: i as u64 + 1,
                total,
            });
        }

        if force {
            let on_disk: BTreeSet<&str> = docs.iter().map(|d| d.path.as_str()).collect();
            report.pruned = self.prune(&on_disk, progress).await?;
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed,
            pruned = report.pruned,
            chunks = report.chunks_written,
            elapsed_ms = report.elapsed_ms,
            "reindex finished"
        );
        Ok(report)
    }

    async fn process(&self, doc: &SourceDocument, force: bool) -> Result<Outcome> {
        let bytes = match tokio::fs::read(&doc.abs_path).await {
            Ok(bytes) => bytes,
            Err(e) => return Ok(failed(doc, FailureStage::Read, e)),
        };
        let fp = fingerprint(&bytes);

        if !force && !self.ledger.needs_reindex(&doc.path, &fp).await? {
            tracing::debug!(path = %doc.path, "unchanged, skipping");
            return Ok(Outcome::Skipped);
        }

        let units = match loader::load_bytes(&doc.abs_path, doc.format, &bytes) {
            Ok(units) => units,
            Err(e) => return Ok(failed(doc, FailureStage::Load, e.reason)),
        };

        let chunks =
            chunk::chunk_document(doc, &units, self.options.chunk_size, self.options.overlap)?;
        if chunks.is_empty() {
            return Ok(failed(doc, FailureStage::Load, "no text could be extracted"));
        }

        let mut entries = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.options.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = match self.embedder.embed(&texts).await {
                Ok(vectors) => vectors,
                Err(e) => {
                    let e = split_config_error(e)?;
                    return Ok(failed(doc, FailureStage::Embed, format!("{:#}", e)));
                }
            };
            if vectors.len() != batch.len() {
                return Ok(failed(
                    doc,
                    FailureStage::Embed,
                    format!("expected {} embeddings, got {}", batch.len(), vectors.len()),
                ));
            }
            entries.extend(
                batch
                    .iter()
                    .cloned()
                    .zip(vectors)
                    .map(|(chunk, vector)| IndexEntry { chunk, vector }),
            );
        }

        let written = entries.len() as u64;
        if let Err(e) = self
            .index
            .replace_document(&doc.path, self.embedder.model_name(), &entries)
            .await
        {
            let e = split_config_error(e)?;
            let err = IndexWriteError {
                path: doc.path.clone(),
                reason: format!("{:#}", e),
            };
            return Ok(failed(doc, FailureStage::Index, err));
        }

        if let Err(e) = self.ledger.record(&doc.path, &fp).await {
            // Chunks are committed; the document is reprocessed next pass.
            return Ok(failed(doc, FailureStage::Index, format!("ledger update failed: {:#}", e)));
        }

        tracing::debug!(path = %doc.path, chunks = written, "indexed");
        Ok(Outcome::Processed { chunks: written })
    }

    /// Remove documents known to the index or ledger but absent on disk.
    async fn prune(&self, on_disk: &BTreeSet<&str>, progress: &dyn ProgressReporter) -> Result<u64> {
        let mut gone: BTreeSet<String> = BTreeSet::new();
        for path in self.index.document_paths().await? {
            if !on_disk.contains(path.as_str()) {
                gone.insert(path);
            }
        }
        for path in self.ledger.paths().await? {
            if !on_disk.contains(path.as_str()) {
                gone.insert(path);
            }
        }
        if gone.is_empty() {
            return Ok(0);
        }

        progress.report(IndexProgressEvent::Pruning {
            count: gone.len() as u64,
        });
        for path in &gone {
            let removed = self.index.remove_document(path).await?;
            self.ledger.forget(path).await?;
            tracing::info!(path = %path, chunks = removed, "pruned deleted document");
        }
        Ok(gone.len() as u64)
    }
}
