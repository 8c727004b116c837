//! Document loader: file on disk → plain-text units.
//!
//! Dispatch is a closed registry keyed by [`Format`]: plain text and
//! markdown pass through, JSON and YAML are parsed and re-serialized into
//! readable text, and PDF/Office formats go through [`crate::extract`].
//!
//! The loader never panics and never aborts a batch. Every problem comes
//! back as a [`LoadError`] carrying the path and a reason, which the
//! orchestrator records before moving on.

use std::path::Path;

use crate::error::{LoadError, LoadFailure};
use crate::extract;
use crate::models::{Format, LoadedText};

/// Read `path` from disk and convert it to text units.
pub fn load(path: &Path) -> Result<Vec<LoadedText>, LoadError> {
    let format =
        Format::from_path(path).ok_or_else(|| LoadError::new(path, LoadFailure::Unsupported))?;
    let bytes = std::fs::read(path).map_err(|e| LoadError::new(path, LoadFailure::Io(e)))?;
    load_bytes(path, format, &bytes)
}

/// Convert already-read bytes. Used by the orchestrator, which reads each
/// file once for both fingerprinting and extraction.
pub fn load_bytes(path: &Path, format: Format, bytes: &[u8]) -> Result<Vec<LoadedText>, LoadError> {
    if bytes.is_empty() {
        return Err(LoadError::new(path, LoadFailure::Empty));
    }

    let units = extract_units(format, bytes).map_err(|reason| LoadError::new(path, reason))?;

    let units: Vec<LoadedText> = units
        .into_iter()
        .filter(|u| !u.text.trim().is_empty())
        .collect();
    if units.is_empty() {
        return Err(LoadError::new(path, LoadFailure::NoText));
    }
    Ok(units)
}

fn extract_units(format: Format, bytes: &[u8]) -> Result<Vec<LoadedText>, LoadFailure> {
    match format {
        Format::Text | Format::Markdown => Ok(single(String::from_utf8_lossy(bytes).into_owned())),
        Format::Json => read_json(bytes).map(single),
        Format::Yaml => read_yaml(bytes).map(single),
        Format::Pdf => extract::extract_pdf(bytes),
        Format::Docx => extract::extract_docx(bytes),
        Format::Pptx => extract::extract_pptx(bytes),
    }
}

fn single(text: String) -> Vec<LoadedText> {
    vec![LoadedText { text, hint: None }]
}

fn read_json(bytes: &[u8]) -> Result<String, LoadFailure> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| LoadFailure::Parse(e.to_string()))?;
    serde_json::to_string_pretty(&value).map_err(|e| LoadFailure::Parse(e.to_string()))
}

fn read_yaml(bytes: &[u8]) -> Result<String, LoadFailure> {
    let value: serde_yaml::Value =
        serde_yaml::from_slice(bytes).map_err(|e| LoadFailure::Parse(e.to_string()))?;
    serde_yaml::to_string(&value).map_err(|e| LoadFailure::Parse(e.to_string()))
}
