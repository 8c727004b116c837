//! Indexing progress reporting.
//!
//! Reports what `samatha index` is doing so users see how much of the
//! corpus is left. Progress goes to **stderr** so stdout stays parseable.

use std::io::Write;

/// A single progress event for a reindex pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexProgressEvent {
    /// Walking the corpus root. Total unknown.
    Discovering { root: String },
    /// `n` of `total` documents handled (processed, skipped, or failed).
    Indexing { n: u64, total: u64 },
    /// Removing documents that disappeared from disk.
    Pruning { count: u64 },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: IndexProgressEvent);
}

fn human_line(event: &IndexProgressEvent) -> String {
    match event {
        IndexProgressEvent::Discovering { root } => format!("index {}  discovering...", root),
        IndexProgressEvent::Indexing { n, total } => format!(
            "index  {} / {} documents",
            format_number(*n),
            format_number(*total)
        ),
        IndexProgressEvent::Pruning { count } => {
            format!("index  pruning {} deleted documents", format_number(*count))
        }
    }
}

fn json_line(event: &IndexProgressEvent) -> serde_json::Value {
    match event {
        IndexProgressEvent::Discovering { root } => serde_json::json!({
            "event": "progress",
            "phase": "discovering",
            "root": root
        }),
        IndexProgressEvent::Indexing { n, total } => serde_json::json!({
            "event": "progress",
            "phase": "indexing",
            "n": n,
            "total": total
        }),
        IndexProgressEvent::Pruning { count } => serde_json::json!({
            "event": "progress",
            "phase": "pruning",
            "count": count
        }),
    }
}

/// Human-friendly progress on stderr: "index  1,234 / 5,000 documents".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: IndexProgressEvent) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{}", human_line(&event));
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: IndexProgressEvent) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{}", json_line(&event));
        let _ = stderr.flush();
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: IndexProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
