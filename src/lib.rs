//! # Cyber Samatha
//!
//! A local-first security knowledge assistant.
//!
//! Samatha indexes a folder of security documents (advisories, playbooks,
//! OWASP notes, CVE dumps in Markdown, PDF, Office, JSON or YAML), embeds
//! them, and answers questions with the passages that support them. A hosted
//! language model writes the answer when an API key is configured; without
//! one the assistant still returns ranked sources.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌─────────────┐
//! │  Corpus    │──▶│ Load, chunk, │──▶│ SQLite index │
//! │ (files)    │   │    embed     │   │  + ledger    │
//! └────────────┘   └──────────────┘   └──────┬──────┘
//!                                            │
//!                        ┌───────────────────┤
//!                        ▼                   ▼
//!                  ┌───────────┐      ┌────────────┐
//!                  │ Retriever │─────▶│  Answerer  │──▶ LLM
//!                  └───────────┘      └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! samatha init                  # create the index and ledger
//! samatha index                 # index ./data/sources
//! samatha ask "how do I prevent stored XSS?"
//! samatha chat                  # interactive session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`error`] | Typed errors for loading, retrieval and generation |
//! | [`discover`] | Corpus walk with exclude globs |
//! | [`loader`] | Format detection and text extraction dispatch |
//! | [`extract`] | PDF, DOCX and PPTX text extraction |
//! | [`chunk`] | Overlapping character-window chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector index trait, SQLite and in-memory backends |
//! | [`ledger`] | Per-document fingerprint ledger |
//! | [`indexer`] | Incremental reindex pipeline |
//! | [`retrieve`] | Query embedding and top-k ranking |
//! | [`llm`] | Hosted language model clients |
//! | [`answer`] | Prompt assembly, generation and rendering |
//! | [`context`] | The assembled assistant |
//! | [`chat`] | Interactive loop |
//! | [`stats`] | Index statistics and ledger status |
//! | [`sources`] | Corpus collections versus index contents |
//! | [`progress`] | Indexing progress reporting |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod context;
pub mod db;
pub mod discover;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod indexer;
pub mod ledger;
pub mod llm;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod retrieve;
pub mod sources;
pub mod stats;
pub mod store;
