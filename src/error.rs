//! Error taxonomy for the indexing and retrieval pipeline.
//!
//! Per-document failures ([`LoadError`], [`IndexWriteError`]) are collected
//! into the [`IndexReport`](crate::models::IndexReport) and never abort a
//! pass. [`ConfigError`] is fatal wherever it appears. [`RetrievalError`]
//! and [`GenerationError`] are surfaced on the query path, the latter only
//! as a degraded [`Answer`](crate::models::Answer).

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Invalid configuration or an embedding-model mismatch. Never worked around.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid chunking parameters: overlap ({overlap}) must be smaller than chunk_size ({chunk_size}) and chunk_size must be > 0")]
    InvalidChunking { chunk_size: usize, overlap: usize },

    #[error("top-k must be >= 1")]
    InvalidTopK,

    #[error("embedding dimensionality mismatch: index was built with {expected}-dim vectors ({model}), but the configured model produces {actual}")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        model: String,
    },

    #[error("{0}")]
    Invalid(String),
}

/// Why a single document could not be turned into text.
#[derive(Debug, Error)]
pub enum LoadFailure {
    #[error("unsupported file extension")]
    Unsupported,

    #[error("file is empty")]
    Empty,

    #[error("no text could be extracted")]
    NoText,

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),

    #[error("structured data parse failed: {0}")]
    Parse(String),
}

/// A per-document load failure, tagged with the offending path.
#[derive(Debug, Error)]
#[error("{}: {reason}", path.display())]
pub struct LoadError {
    pub path: PathBuf,
    #[source]
    pub reason: LoadFailure,
}

impl LoadError {
    pub fn new(path: impl Into<PathBuf>, reason: LoadFailure) -> Self {
        Self {
            path: path.into(),
            reason,
        }
    }
}

/// The vector store rejected a write for one document.
#[derive(Debug, Error)]
#[error("index write failed for {path}: {reason}")]
pub struct IndexWriteError {
    pub path: String,
    pub reason: String,
}

/// Failure on the retrieval path.
///
/// `Unavailable` is distinct from a legitimately empty result: callers
/// render it as "no results available".
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no results available: {0}")]
    Unavailable(String),
}

/// Failure calling the external language model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// Network errors, rate limits, server errors. Eligible for retry.
    #[error("transient generation failure: {0}")]
    Transient(String),

    /// Bad request, auth failure, disabled model. Not retried.
    #[error("generation failed: {0}")]
    Permanent(String),

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
}

impl GenerationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }
}
