use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

use crate::context::Samatha;
use crate::discover;
use crate::models::SourceDocument;

/// Files on disk versus documents in the index, per collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub collection: String,
    pub files: u64,
    pub indexed: u64,
}

pub fn summarize(docs: &[SourceDocument], indexed: &BTreeMap<String, u64>) -> Vec<SourceSummary> {
    let mut files: BTreeMap<&str, u64> = BTreeMap::new();
    for doc in docs {
        *files.entry(doc.collection.as_str()).or_default() += 1;
    }
    for collection in indexed.keys() {
        files.entry(collection.as_str()).or_default();
    }
    files
        .into_iter()
        .map(|(collection, files)| SourceSummary {
            collection: collection.to_string(),
            files,
            indexed: indexed.get(collection).copied().unwrap_or(0),
        })
        .collect()
}

pub async fn list_sources(samatha: &Samatha, out: &mut impl Write) -> Result<()> {
    let corpus = &samatha.config().corpus;
    let docs = discover::scan_corpus(&corpus.root, &corpus.exclude_globs, corpus.follow_symlinks)?;
    let indexed: BTreeMap<String, u64> = samatha
        .index()
        .collections()
        .await?
        .into_iter()
        .map(|c| (c.collection, c.documents))
        .collect();

    writeln!(out, "Corpus root: {}", corpus.root.display())?;
    writeln!(out, "{:<28} {:>8} {:>8}", "COLLECTION", "FILES", "INDEXED")?;
    for s in summarize(&docs, &indexed) {
        writeln!(out, "{:<28} {:>8} {:>8}", s.collection, s.files, s.indexed)?;
    }
    Ok(())
}
