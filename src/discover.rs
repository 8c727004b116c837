//! Corpus discovery: walk the root directory and list indexable files.
//!
//! Files are kept when their extension is in the loader's table and no
//! exclude glob matches their root-relative path. Output is sorted by
//! path so passes are deterministic.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Component, Path};
use walkdir::WalkDir;

use crate::models::{Format, SourceDocument};

/// Collection name for files placed directly in the corpus root.
pub const ROOT_COLLECTION: &str = "(root)";

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

pub fn scan_corpus(
    root: &Path,
    exclude_globs: &[String],
    follow_symlinks: bool,
) -> Result<Vec<SourceDocument>> {
    if !root.is_dir() {
        bail!("Corpus root does not exist: {}", root.display());
    }

    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.extend(exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut docs = Vec::new();

    for entry in WalkDir::new(root).follow_links(follow_symlinks) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable corpus entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative_key(relative);

        if exclude_set.is_match(&rel_str) {
            continue;
        }

        let Some(format) = Format::from_path(path) else {
            continue;
        };

        docs.push(SourceDocument {
            collection: collection_of(&rel_str),
            path: rel_str,
            abs_path: path.to_path_buf(),
            format,
        });
    }

    docs.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(docs)
}

/// `/`-separated relative path, independent of the host separator.
fn relative_key(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn collection_of(rel_path: &str) -> String {
    match rel_path.split_once('/') {
        Some((first, _)) => first.to_string(),
        None => ROOT_COLLECTION.to_string(),
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
