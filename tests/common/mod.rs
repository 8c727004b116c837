//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use async_trait::async_trait;
use cybersamatha::error::GenerationError;
use cybersamatha::llm::LanguageModel;
use tempfile::TempDir;

pub fn write(root: &Path, rel: &str, body: impl AsRef<[u8]>) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

pub fn samatha_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("samatha");
    path
}

/// Temp workspace with a config using the hashing embedder and no model.
/// Returns the temp dir, the config path and the corpus root.
pub fn setup_cli_env() -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let corpus = root.join("corpus");
    fs::create_dir_all(&corpus).unwrap();
    fs::create_dir_all(root.join("config")).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/index.sqlite"
ledger_path = "{root}/data/ledger.sqlite"

[corpus]
root = "{root}/corpus"

[chunking]
chunk_size = 200
overlap = 20

[retrieval]
top_k = 3

[embedding]
provider = "hashing"
dims = 128

[generation]
provider = "disabled"
"#,
        root = root.display()
    );
    let config_path = root.join("config").join("samatha.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path, corpus)
}

pub fn run_samatha(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = samatha_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run samatha binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Security notes with disjoint vocabulary so the hashing embedder can tell
/// them apart.
pub fn seed_security_corpus(corpus: &Path) {
    write(
        corpus,
        "owasp/xss.md",
        "# Cross-site scripting\n\nCross-site scripting (XSS) lets attackers inject script into pages. \
         Prevent XSS by escaping output, validating input and setting a Content Security Policy.",
    );
    write(
        corpus,
        "owasp/sqli.md",
        "# SQL injection\n\nSQL injection abuses string-built queries against the database. \
         Use parameterized statements and least-privilege database accounts.",
    );
    write(
        corpus,
        "playbooks/ransomware.txt",
        "Ransomware response: isolate hosts, preserve backups offline, rotate credentials.",
    );
}

/// Replays canned outcomes and records every prompt it receives.
pub struct ScriptedModel {
    outcomes: Mutex<VecDeque<Result<String, GenerationError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(outcomes: Vec<Result<String, GenerationError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        prompt: &str,
        _max_output_tokens: u32,
    ) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::Permanent("script exhausted".into())))
    }
}

fn zip_with(entries: &[(&str, String)]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        for (name, body) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

pub fn minimal_docx_with_text(phrase: &str) -> Vec<u8> {
    let xml = format!(
        "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:body></w:document>",
        phrase
    );
    zip_with(&[("word/document.xml", xml)])
}

pub fn minimal_pptx_with_slides(slides: &[&str]) -> Vec<u8> {
    let entries: Vec<(String, String)> = slides
        .iter()
        .enumerate()
        .map(|(i, text)| {
            (
                format!("ppt/slides/slide{}.xml", i + 1),
                format!(
                    "<?xml version=\"1.0\"?><p:sld xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\" xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\"><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>",
                    text
                ),
            )
        })
        .collect();
    let borrowed: Vec<(&str, String)> = entries
        .iter()
        .map(|(name, body)| (name.as_str(), body.clone()))
        .collect();
    zip_with(&borrowed)
}
