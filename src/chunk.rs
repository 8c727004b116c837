//! Overlapping sliding-window text chunker.
//!
//! Splits normalized text into windows of `chunk_size` characters with
//! `overlap` characters shared between consecutive windows. When a window
//! is not the last one, its end is pulled back to the nearest sentence end
//! (`". "`) or newline, provided that boundary lies in the second half of
//! the window, so chunks rarely cut a sentence in two.
//!
//! Each chunk receives a deterministic UUIDv5 derived from its document path
//! and index, plus a SHA-256 hash of its text. Re-chunking an unchanged
//! document therefore yields the same ids, and upserts overwrite in place.
//!
//! # Example
//!
//! ```rust
//! use cybersamatha::chunk::chunk;
//!
//! let pieces: Vec<_> = chunk("XSS is a web vulnerability.", 500, 50)
//!     .unwrap()
//!     .collect();
//! assert_eq!(pieces.len(), 1);
//! assert_eq!(pieces[0].text, "XSS is a web vulnerability.");
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ConfigError;
use crate::models::{Chunk, LoadedText, SourceDocument};

/// Namespace for chunk ids. Changing it invalidates every stored id.
const CHUNK_NAMESPACE: Uuid = Uuid::from_u128(0x6c1f_3a52_8d0e_4b7a_9e21_5f0c_d4a8_b731);

/// A window of text borrowed from the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk<'a> {
    /// Position in the sequence, starting at 0.
    pub index: usize,
    /// Byte offset of `text` within the input.
    pub offset: usize,
    pub text: &'a str,
}

/// Lazy iterator over the chunks of a text. Built by [`chunk`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    chunk_size: usize,
    overlap: usize,
    start: usize,
    index: usize,
    done: bool,
}

/// Split `text` into overlapping windows.
///
/// Fails with [`ConfigError::InvalidChunking`] unless
/// `0 < chunk_size` and `overlap < chunk_size`. Empty or whitespace-only
/// text yields an empty sequence.
pub fn chunk(text: &str, chunk_size: usize, overlap: usize) -> Result<Chunks<'_>, ConfigError> {
    validate(chunk_size, overlap)?;
    Ok(Chunks {
        text,
        chunk_size,
        overlap,
        start: 0,
        index: 0,
        done: text.trim().is_empty(),
    })
}

/// Check chunking parameters without chunking anything.
pub fn validate(chunk_size: usize, overlap: usize) -> Result<(), ConfigError> {
    if chunk_size == 0 || overlap >= chunk_size {
        return Err(ConfigError::InvalidChunking {
            chunk_size,
            overlap,
        });
    }
    Ok(())
}

impl<'a> Iterator for Chunks<'a> {
    type Item = TextChunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let rest = &self.text[self.start..];
            let window_end = byte_offset_of_char(rest, self.chunk_size);
            let end = if window_end < rest.len() {
                pull_back_to_boundary(&rest[..window_end], self.chunk_size)
            } else {
                window_end
            };

            let raw = &rest[..end];
            let piece = raw.trim();
            let leading = raw.len() - raw.trim_start().len();
            let offset = self.start + leading;

            if self.start + end >= self.text.len() {
                self.done = true;
            } else {
                self.start += next_start(raw, self.overlap);
            }

            if piece.is_empty() {
                continue;
            }

            let item = TextChunk {
                index: self.index,
                offset,
                text: piece,
            };
            self.index += 1;
            return Some(item);
        }
        None
    }
}

/// Byte offset of the `n`-th char of `s`, or `s.len()` if shorter.
fn byte_offset_of_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

/// Prefer a sentence end, then a newline, in the second half of the window.
fn pull_back_to_boundary(window: &str, chunk_size: usize) -> usize {
    let half = byte_offset_of_char(window, chunk_size / 2);
    if let Some(pos) = window.rfind(". ").filter(|&p| p > half) {
        return pos + 1;
    }
    if let Some(pos) = window.rfind('\n').filter(|&p| p > half) {
        return pos + 1;
    }
    window.len()
}

/// Advance past `raw`, stepping back `overlap` chars, but always forward.
fn next_start(raw: &str, overlap: usize) -> usize {
    if overlap == 0 {
        return raw.len();
    }
    match raw.char_indices().rev().nth(overlap - 1) {
        Some((back, _)) if back > 0 => back,
        _ => raw.len(),
    }
}

/// Chunk every text unit of a document into [`Chunk`]s with contiguous
/// indices across units.
pub fn chunk_document(
    doc: &SourceDocument,
    units: &[LoadedText],
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, ConfigError> {
    let mut chunks = Vec::new();
    for unit in units {
        for piece in chunk(&unit.text, chunk_size, overlap)? {
            let index = chunks.len() as i64;
            chunks.push(make_chunk(doc, index, unit.hint.clone(), piece.text));
        }
    }
    Ok(chunks)
}

/// Deterministic id for the `index`-th chunk of `source_path`.
pub fn chunk_id(source_path: &str, index: i64) -> String {
    let name = format!("{}#{}", source_path, index);
    Uuid::new_v5(&CHUNK_NAMESPACE, name.as_bytes()).to_string()
}

fn make_chunk(doc: &SourceDocument, index: i64, hint: Option<String>, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: chunk_id(&doc.path, index),
        source_path: doc.path.clone(),
        collection: doc.collection.clone(),
        format: doc.format,
        chunk_index: index,
        hint,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Format;
    use std::path::PathBuf;

    fn collect(text: &str, size: usize, overlap: usize) -> Vec<String> {
        chunk(text, size, overlap)
            .unwrap()
            .map(|c| c.text.to_string())
            .collect()
    }

    fn doc(path: &str) -> SourceDocument {
        SourceDocument {
            path: path.to_string(),
            abs_path: PathBuf::from(path),
            format: Format::Markdown,
            collection: "handbooks".to_string(),
        }
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = collect("  Hello, world!  ", 500, 50);
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn test_empty_and_whitespace_yield_nothing() {
        assert!(collect("", 500, 50).is_empty());
        assert!(collect(" \n\t \n", 500, 50).is_empty());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let err = chunk("text", 50, 50).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidChunking {
                chunk_size: 50,
                overlap: 50
            }
        );
        assert!(chunk("text", 0, 0).is_err());
        assert!(chunk("text", 10, 9).is_ok());
    }

    #[test]
    fn test_windows_overlap() {
        // No sentence or newline boundaries: plain fixed windows.
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = collect(text, 10, 3);
        assert_eq!(chunks[0], "abcdefghij");
        assert_eq!(chunks[1], "hijklmnopq");
        assert_eq!(chunks[2], "opqrstuvwx");
        assert_eq!(chunks[3], "vwxyz");
        assert_eq!(chunks.len(), 4);
    }

    #[test]
    fn test_final_chunk_may_be_shorter() {
        let text = "x".repeat(25);
        let chunks = collect(&text, 10, 0);
        assert_eq!(
            chunks.iter().map(|c| c.len()).collect::<Vec<_>>(),
            vec![10, 10, 5]
        );
    }

    #[test]
    fn test_prefers_sentence_boundary() {
        let text = "First sentence here. Second sentence continues on and on.";
        let chunks = collect(text, 30, 5);
        assert_eq!(chunks[0], "First sentence here.");
    }

    #[test]
    fn test_ignores_boundary_in_first_half() {
        let text = "Hi. abcdefghijklmnopqrstuvwxyz0123456789";
        let chunks = collect(text, 20, 0);
        assert_eq!(chunks[0], "Hi. abcdefghijklmnop");
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘";
        let chunks = collect(text, 7, 2);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.chars().count() <= 7);
        }
    }

    #[test]
    fn test_offsets_point_into_input() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        for c in chunk(text, 12, 4).unwrap() {
            assert_eq!(&text[c.offset..c.offset + c.text.len()], c.text);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Lorem ipsum dolor sit amet. ".repeat(80);
        let a: Vec<_> = chunk(&text, 500, 50).unwrap().collect();
        let b: Vec<_> = chunk(&text, 500, 50).unwrap().collect();
        assert_eq!(a, b);
        assert!(a.len() > 1);
    }

    #[test]
    fn test_large_overlap_still_progresses() {
        let text = "word ".repeat(200);
        let chunks = collect(&text, 10, 9);
        assert!(!chunks.is_empty());
        assert!(chunks.len() < text.len());
    }

    #[test]
    fn test_chunk_document_indices_contiguous_across_units() {
        let units = vec![
            LoadedText {
                text: "a".repeat(25),
                hint: Some("page 1".into()),
            },
            LoadedText {
                text: "   ".into(),
                hint: Some("page 2".into()),
            },
            LoadedText {
                text: "b".repeat(15),
                hint: Some("page 3".into()),
            },
        ];
        let chunks = chunk_document(&doc("h/guide.md"), &units, 10, 0).unwrap();
        assert_eq!(chunks.len(), 5);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert_eq!(c.id, chunk_id("h/guide.md", i as i64));
        }
        assert_eq!(chunks[4].hint.as_deref(), Some("page 3"));
    }

    #[test]
    fn test_chunk_ids_stable_and_distinct() {
        assert_eq!(chunk_id("a.md", 0), chunk_id("a.md", 0));
        assert_ne!(chunk_id("a.md", 0), chunk_id("a.md", 1));
        assert_ne!(chunk_id("a.md", 0), chunk_id("b.md", 0));
    }
}
