//! Index statistics and ledger status.
//!
//! A quick summary of what's indexed: chunk and document counts, the
//! embedding model the index was built with, database sizes, and the
//! per-collection breakdown. Used by `samatha stats`, `samatha status`, and
//! the `stats` command inside chat.

use anyhow::Result;
use serde::Serialize;
use std::io::Write;

use crate::context::Samatha;
use crate::models::LedgerEntry;
use crate::store::CollectionSummary;

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub total_chunks: u64,
    pub documents: u64,
    /// Model recorded in the index, or the configured one before the first write.
    pub embedding_model: String,
    pub dims: usize,
    pub index_path: String,
    pub index_bytes: u64,
    pub ledger_path: String,
    pub ledger_entries: u64,
    pub generation_enabled: bool,
    pub generation_model: String,
    pub collections: Vec<CollectionSummary>,
}

pub async fn collect_stats(samatha: &Samatha) -> Result<IndexStats> {
    let config = samatha.config();
    let index = samatha.index();
    let meta = index.meta().await?;
    let collections = index.collections().await?;
    let ledger_entries = samatha.ledger().paths().await?.len() as u64;

    let (embedding_model, dims) = match meta {
        Some(m) => (m.model, m.dims),
        None => (
            samatha.embedder().model_name().to_string(),
            samatha.embedder().dims(),
        ),
    };

    Ok(IndexStats {
        total_chunks: index.count().await?,
        documents: collections.iter().map(|c| c.documents).sum(),
        embedding_model,
        dims,
        index_path: config.db.path.display().to_string(),
        index_bytes: file_size(&config.db.path),
        ledger_path: config.db.ledger_path.display().to_string(),
        ledger_entries,
        generation_enabled: samatha.generation_enabled(),
        generation_model: samatha.llm().name().to_string(),
        collections,
    })
}

/// Database size including its WAL file.
fn file_size(path: &std::path::Path) -> u64 {
    let main = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let mut wal = path.as_os_str().to_owned();
    wal.push("-wal");
    main + std::fs::metadata(wal).map(|m| m.len()).unwrap_or(0)
}

pub fn write_stats(out: &mut impl Write, stats: &IndexStats) -> std::io::Result<()> {
    writeln!(out, "Cyber Samatha: Index Stats")?;
    writeln!(out, "==========================")?;
    writeln!(out)?;
    writeln!(out, "  Index:       {}", stats.index_path)?;
    writeln!(out, "  Size:        {}", format_bytes(stats.index_bytes))?;
    writeln!(out, "  Ledger:      {} ({} entries)", stats.ledger_path, stats.ledger_entries)?;
    writeln!(out)?;
    writeln!(out, "  Documents:   {}", stats.documents)?;
    writeln!(out, "  Chunks:      {}", stats.total_chunks)?;
    writeln!(out, "  Embedding:   {} ({} dims)", stats.embedding_model, stats.dims)?;
    writeln!(
        out,
        "  AI answers:  {}",
        if stats.generation_enabled {
            format!("enabled ({})", stats.generation_model)
        } else {
            "disabled (retrieval only)".to_string()
        }
    )?;

    if !stats.collections.is_empty() {
        writeln!(out)?;
        writeln!(out, "  By collection:")?;
        writeln!(out, "  {:<28} {:>6} {:>8}", "COLLECTION", "DOCS", "CHUNKS")?;
        writeln!(out, "  {}", "-".repeat(44))?;
        for c in &stats.collections {
            writeln!(out, "  {:<28} {:>6} {:>8}", c.collection, c.documents, c.chunks)?;
        }
    }
    writeln!(out)?;
    Ok(())
}

/// Print ledger entries: path, short fingerprint, and when it was indexed.
pub fn write_status(out: &mut impl Write, entries: &[LedgerEntry]) -> std::io::Result<()> {
    if entries.is_empty() {
        writeln!(out, "Ledger is empty. Run `samatha index` first.")?;
        return Ok(());
    }
    writeln!(out, "{:<56} {:<14} INDEXED", "PATH", "FINGERPRINT")?;
    for e in entries {
        let short: String = e.fingerprint.chars().take(12).collect();
        writeln!(
            out,
            "{:<56} {:<14} {}",
            e.path,
            short,
            format_ts_relative(e.indexed_at)
        )?;
    }
    writeln!(out)?;
    writeln!(out, "{} documents", entries.len())?;
    Ok(())
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
