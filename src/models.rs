//! Core data models used throughout Cyber Samatha.
//!
//! These types represent the documents, chunks, retrieval results, and
//! answers that flow through the indexing and query pipeline.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// File formats the loader understands, keyed by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Text,
    Markdown,
    Json,
    Yaml,
    Pdf,
    Docx,
    Pptx,
}

/// Extension table. Other tooling relies on this mapping; keep it stable.
pub const SUPPORTED_EXTENSIONS: &[(&str, Format)] = &[
    ("txt", Format::Text),
    ("md", Format::Markdown),
    ("markdown", Format::Markdown),
    ("json", Format::Json),
    ("yaml", Format::Yaml),
    ("yml", Format::Yaml),
    ("pdf", Format::Pdf),
    ("docx", Format::Docx),
    ("pptx", Format::Pptx),
];

impl Format {
    /// Resolve a format from a path's extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Format> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        SUPPORTED_EXTENSIONS
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, f)| *f)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Text => "text",
            Format::Markdown => "markdown",
            Format::Json => "json",
            Format::Yaml => "yaml",
            Format::Pdf => "pdf",
            Format::Docx => "docx",
            Format::Pptx => "pptx",
        }
    }

    pub fn parse(s: &str) -> Option<Format> {
        match s {
            "text" => Some(Format::Text),
            "markdown" => Some(Format::Markdown),
            "json" => Some(Format::Json),
            "yaml" => Some(Format::Yaml),
            "pdf" => Some(Format::Pdf),
            "docx" => Some(Format::Docx),
            "pptx" => Some(Format::Pptx),
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file discovered under the corpus root.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Path relative to the corpus root, `/`-separated. Used as the identity.
    pub path: String,
    pub abs_path: PathBuf,
    pub format: Format,
    /// First path component under the root: which data source it came from.
    pub collection: String,
}

/// One text unit produced by the loader (a whole file, a PDF page, a slide).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedText {
    pub text: String,
    /// Optional section/page hint such as `page 3`.
    pub hint: Option<String>,
}

/// A chunk of a document's text, ready to embed.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// UUIDv5 of `(source_path, chunk_index)`.
    pub id: String,
    pub source_path: String,
    pub collection: String,
    pub format: Format,
    pub chunk_index: i64,
    pub hint: Option<String>,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
}

/// A stored index entry: a chunk plus its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A retrieved chunk with its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub id: String,
    pub source_path: String,
    pub format: Format,
    pub chunk_index: i64,
    pub hint: Option<String>,
    pub text: String,
    pub score: f64,
}

/// Ranked retrieval output, highest similarity first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub chunks: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }
}

/// A persisted ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub path: String,
    pub fingerprint: String,
    /// Unix timestamp of the last successful index of this fingerprint.
    pub indexed_at: i64,
}

/// Pipeline stage at which a document failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Read,
    Load,
    Embed,
    Index,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Read => "read",
            FailureStage::Load => "load",
            FailureStage::Embed => "embed",
            FailureStage::Index => "index",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedDocument {
    pub path: String,
    pub stage: FailureStage,
    pub reason: String,
}

/// Machine-readable outcome of a reindex pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexReport {
    pub discovered: u64,
    pub processed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub chunks_written: u64,
    pub pruned: u64,
    pub failures: Vec<FailedDocument>,
    pub elapsed_ms: u64,
}

/// How an answer was (or was not) produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnswerStatus {
    Generated,
    /// Retrieval returned nothing; the model was not called.
    NoContext,
    /// The model failed; sources are still surfaced.
    GenerationUnavailable { reason: String },
}

/// A composed answer with citations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: Option<String>,
    #[serde(flatten)]
    pub status: AnswerStatus,
    /// Distinct source paths of the chunks included in the prompt, first-seen order.
    pub citations: Vec<String>,
    /// Chunks actually included in the prompt, most similar first.
    pub sources: Vec<ScoredChunk>,
}
