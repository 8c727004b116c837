//! End-to-end pipeline tests against the library: indexing, incremental
//! passes, pruning, retrieval and answer composition.

mod common;

use std::path::Path;
use std::sync::Arc;

use common::{seed_security_corpus, write, ScriptedModel};
use cybersamatha::config::Config;
use cybersamatha::context::Samatha;
use cybersamatha::embedding::HashingProvider;
use cybersamatha::error::{ConfigError, GenerationError};
use cybersamatha::indexer::{IndexLock, IndexOptions, Indexer};
use cybersamatha::ledger::Ledger;
use cybersamatha::models::{AnswerStatus, FailureStage};
use cybersamatha::progress::NoProgress;
use cybersamatha::store::{InMemoryIndex, SqliteIndex, VectorIndex};
use tempfile::TempDir;

fn options(tmp: &Path) -> IndexOptions {
    IndexOptions {
        chunk_size: 200,
        overlap: 20,
        batch_size: 8,
        exclude_globs: Vec::new(),
        follow_symlinks: false,
        lock_path: Some(tmp.join("index.sqlite.lock")),
    }
}

fn config_for(tmp: &Path) -> Config {
    let mut config = Config::default();
    config.db.path = tmp.join("index.sqlite");
    config.db.ledger_path = tmp.join("ledger.sqlite");
    config.corpus.root = tmp.join("corpus");
    config.chunking.chunk_size = 200;
    config.chunking.overlap = 20;
    config.retrieval.top_k = 3;
    config.embedding.provider = "hashing".to_string();
    config.embedding.dims = Some(256);
    config
}

async fn assistant(tmp: &Path, llm: Arc<ScriptedModel>) -> Samatha {
    let ledger = Ledger::open(&tmp.join("ledger.sqlite")).await.unwrap();
    Samatha::with_parts(
        config_for(tmp),
        Arc::new(InMemoryIndex::new()),
        ledger,
        Arc::new(HashingProvider::new(256)),
        llm,
    )
}

#[tokio::test]
async fn unchanged_corpus_second_pass_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let corpus = tmp.path().join("corpus");
    seed_security_corpus(&corpus);
    write(&corpus, "owasp/long.md", "Threat modeling session notes. ".repeat(40));

    let index = SqliteIndex::open(&tmp.path().join("index.sqlite")).await.unwrap();
    let ledger = Ledger::open(&tmp.path().join("ledger.sqlite")).await.unwrap();
    let embedder = HashingProvider::new(64);
    let indexer = Indexer::new(&index, &ledger, &embedder, options(tmp.path()));

    let first = indexer.reindex(&corpus, false, &NoProgress).await.unwrap();
    assert_eq!(first.discovered, 4);
    assert_eq!(first.processed, 4);
    assert!(first.chunks_written > 4);

    let mut before = Vec::new();
    for path in index.document_paths().await.unwrap() {
        before.push(index.entries_for(&path).await.unwrap());
    }

    let second = indexer.reindex(&corpus, false, &NoProgress).await.unwrap();
    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped, 4);
    assert_eq!(second.chunks_written, 0);

    let mut after = Vec::new();
    for path in index.document_paths().await.unwrap() {
        after.push(index.entries_for(&path).await.unwrap());
    }
    assert_eq!(before, after);
}

#[tokio::test]
async fn same_shape_edit_keeps_chunk_ids() {
    let tmp = TempDir::new().unwrap();
    let corpus = tmp.path().join("corpus");
    write(&corpus, "notes/rotate.txt", "alpha ".repeat(100));

    let index = InMemoryIndex::new();
    let ledger = Ledger::open(&tmp.path().join("ledger.sqlite")).await.unwrap();
    let embedder = HashingProvider::new(64);
    let indexer = Indexer::new(&index, &ledger, &embedder, options(tmp.path()));

    indexer.reindex(&corpus, false, &NoProgress).await.unwrap();
    let before = index.entries_for("notes/rotate.txt").await.unwrap();

    write(&corpus, "notes/rotate.txt", "omega ".repeat(100));
    let report = indexer.reindex(&corpus, false, &NoProgress).await.unwrap();
    assert_eq!(report.processed, 1);

    let after = index.entries_for("notes/rotate.txt").await.unwrap();
    assert_eq!(before.len(), after.len());
    for (old, new) in before.iter().zip(&after) {
        assert_eq!(old.chunk.id, new.chunk.id);
        assert_ne!(old.chunk.hash, new.chunk.hash);
        assert!(new.chunk.text.starts_with("omega"));
    }
}

#[tokio::test]
async fn shrinking_document_drops_stale_tail_chunks() {
    let tmp = TempDir::new().unwrap();
    let corpus = tmp.path().join("corpus");
    write(&corpus, "notes/ir.txt", "incident ".repeat(120));

    let index = InMemoryIndex::new();
    let ledger = Ledger::open(&tmp.path().join("ledger.sqlite")).await.unwrap();
    let embedder = HashingProvider::new(64);
    let indexer = Indexer::new(&index, &ledger, &embedder, options(tmp.path()));

    indexer.reindex(&corpus, false, &NoProgress).await.unwrap();
    let long = index.entries_for("notes/ir.txt").await.unwrap().len();
    assert!(long > 2);

    write(&corpus, "notes/ir.txt", "incident response summary");
    indexer.reindex(&corpus, false, &NoProgress).await.unwrap();

    let short = index.entries_for("notes/ir.txt").await.unwrap();
    assert_eq!(short.len(), 1);
    assert_eq!(short[0].chunk.chunk_index, 0);
    assert_eq!(index.count().await.unwrap(), 1);
}

#[tokio::test]
async fn corrupt_pdf_fails_alone() {
    let tmp = TempDir::new().unwrap();
    let corpus = tmp.path().join("corpus");
    for i in 0..9 {
        write(
            &corpus,
            &format!("advisories/adv-{}.md", i),
            format!("Advisory {} covers patch level {} for the VPN appliance.", i, i),
        );
    }
    write(&corpus, "advisories/broken.pdf", b"%PDF-1.4 this is not really a pdf");

    let index = InMemoryIndex::new();
    let ledger = Ledger::open(&tmp.path().join("ledger.sqlite")).await.unwrap();
    let embedder = HashingProvider::new(64);
    let report = Indexer::new(&index, &ledger, &embedder, options(tmp.path()))
        .reindex(&corpus, false, &NoProgress)
        .await
        .unwrap();

    assert_eq!(report.discovered, 10);
    assert_eq!(report.processed, 9);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].path, "advisories/broken.pdf");
    assert_eq!(report.failures[0].stage, FailureStage::Load);
    assert_eq!(index.document_paths().await.unwrap().len(), 9);
}

#[tokio::test]
async fn forced_pass_reprocesses_everything_and_prunes_deleted_files() {
    let tmp = TempDir::new().unwrap();
    let corpus = tmp.path().join("corpus");
    seed_security_corpus(&corpus);

    let index = InMemoryIndex::new();
    let ledger = Ledger::open(&tmp.path().join("ledger.sqlite")).await.unwrap();
    let embedder = HashingProvider::new(64);
    let indexer = Indexer::new(&index, &ledger, &embedder, options(tmp.path()));
    indexer.reindex(&corpus, false, &NoProgress).await.unwrap();

    std::fs::remove_file(corpus.join("playbooks/ransomware.txt")).unwrap();

    // An ordinary pass leaves the deleted document alone.
    let normal = indexer.reindex(&corpus, false, &NoProgress).await.unwrap();
    assert_eq!(normal.pruned, 0);
    assert_eq!(index.document_paths().await.unwrap().len(), 3);

    let forced = indexer.reindex(&corpus, true, &NoProgress).await.unwrap();
    assert_eq!(forced.processed, 2);
    assert_eq!(forced.skipped, 0);
    assert_eq!(forced.pruned, 1);
    assert_eq!(
        index.document_paths().await.unwrap(),
        vec!["owasp/sqli.md".to_string(), "owasp/xss.md".to_string()]
    );
    assert!(!ledger
        .paths()
        .await
        .unwrap()
        .contains(&"playbooks/ransomware.txt".to_string()));
}

#[tokio::test]
async fn changing_embedding_width_is_a_config_error() {
    let tmp = TempDir::new().unwrap();
    let corpus = tmp.path().join("corpus");
    seed_security_corpus(&corpus);

    let index = SqliteIndex::open(&tmp.path().join("index.sqlite")).await.unwrap();
    let ledger = Ledger::open(&tmp.path().join("ledger.sqlite")).await.unwrap();
    Indexer::new(&index, &ledger, &HashingProvider::new(32), options(tmp.path()))
        .reindex(&corpus, false, &NoProgress)
        .await
        .unwrap();
    let count = index.count().await.unwrap();

    let err = Indexer::new(&index, &ledger, &HashingProvider::new(48), options(tmp.path()))
        .reindex(&corpus, true, &NoProgress)
        .await
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<ConfigError>(),
        Some(&ConfigError::DimensionMismatch {
            expected: 32,
            actual: 48,
            model: "hashing".to_string(),
        })
    );
    assert_eq!(index.count().await.unwrap(), count);
    let mut lock = IndexLock::open(&tmp.path().join("index.sqlite.lock")).unwrap();
    assert!(lock.try_acquire().is_ok());
}

#[tokio::test]
async fn sqlite_index_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let corpus = tmp.path().join("corpus");
    seed_security_corpus(&corpus);
    let db = tmp.path().join("index.sqlite");

    let (count, meta) = {
        let index = SqliteIndex::open(&db).await.unwrap();
        let ledger = Ledger::open(&tmp.path().join("ledger.sqlite")).await.unwrap();
        Indexer::new(&index, &ledger, &HashingProvider::new(64), options(tmp.path()))
            .reindex(&corpus, false, &NoProgress)
            .await
            .unwrap();
        let out = (index.count().await.unwrap(), index.meta().await.unwrap());
        index.close().await;
        ledger.close().await;
        out
    };

    let reopened = SqliteIndex::open(&db).await.unwrap();
    assert_eq!(reopened.count().await.unwrap(), count);
    let meta = meta.unwrap();
    assert_eq!(reopened.meta().await.unwrap(), Some(meta.clone()));
    assert_eq!(meta.model, "hashing");
    assert_eq!(meta.dims, 64);
}

#[tokio::test]
async fn xss_question_cites_only_the_xss_note() {
    let tmp = TempDir::new().unwrap();
    seed_security_corpus(&tmp.path().join("corpus"));
    let llm = Arc::new(ScriptedModel::new(vec![Ok(
        "Escape output and set a Content Security Policy.".to_string(),
    )]));
    let samatha = assistant(tmp.path(), llm.clone()).await;
    samatha.reindex(false, &NoProgress).await.unwrap();

    let answer = samatha
        .ask("How do I prevent cross-site scripting XSS?", Some(1))
        .await
        .unwrap();

    assert_eq!(answer.status, AnswerStatus::Generated);
    assert_eq!(
        answer.text.as_deref(),
        Some("Escape output and set a Content Security Policy.")
    );
    assert_eq!(answer.citations, vec!["owasp/xss.md".to_string()]);
    assert_eq!(answer.sources.len(), 1);

    let prompts = llm.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("[Document 1: owasp/xss.md | Relevance:"));
    assert!(!prompts[0].contains("owasp/sqli.md"));
}

#[tokio::test]
async fn repeated_queries_rank_identically() {
    let tmp = TempDir::new().unwrap();
    seed_security_corpus(&tmp.path().join("corpus"));
    let samatha = assistant(tmp.path(), Arc::new(ScriptedModel::new(vec![]))).await;
    samatha.reindex(false, &NoProgress).await.unwrap();

    let first = samatha.retrieve("database injection", None).await.unwrap();
    let second = samatha.retrieve("database injection", None).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.chunks[0].source_path, "owasp/sqli.md");
    assert!(first
        .chunks
        .windows(2)
        .all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn empty_index_answers_without_calling_the_model() {
    let tmp = TempDir::new().unwrap();
    let llm = Arc::new(ScriptedModel::new(vec![Ok("unused".to_string())]));
    let samatha = assistant(tmp.path(), llm.clone()).await;

    let answer = samatha.ask("what is phishing?", None).await.unwrap();
    assert_eq!(answer.status, AnswerStatus::NoContext);
    assert!(answer.citations.is_empty());
    assert!(llm.prompts().is_empty());
}

#[tokio::test]
async fn model_failure_still_returns_sources() {
    let tmp = TempDir::new().unwrap();
    seed_security_corpus(&tmp.path().join("corpus"));
    let llm = Arc::new(ScriptedModel::new(vec![Err(GenerationError::Permanent(
        "invalid API key".to_string(),
    ))]));
    let samatha = assistant(tmp.path(), llm.clone()).await;
    samatha.reindex(false, &NoProgress).await.unwrap();

    let answer = samatha.ask("ransomware backups", Some(2)).await.unwrap();
    assert!(matches!(
        answer.status,
        AnswerStatus::GenerationUnavailable { .. }
    ));
    assert!(answer.text.is_none());
    assert_eq!(answer.sources.len(), 2);
    assert_eq!(answer.citations[0], "playbooks/ransomware.txt");
    assert_eq!(llm.prompts().len(), 1);
}

#[tokio::test]
async fn what_is_xss_two_document_scenario() {
    let tmp = TempDir::new().unwrap();
    let corpus = tmp.path().join("corpus");
    write(
        &corpus,
        "web/xss.txt",
        "XSS is a web vulnerability that lets attackers run script in a victim's browser.",
    );
    write(
        &corpus,
        "web/sqli.txt",
        "SQL injection targets databases through unsanitized query parameters.",
    );
    let llm = Arc::new(ScriptedModel::new(vec![Ok("Cross-site scripting.".to_string())]));
    let samatha = assistant(tmp.path(), llm).await;
    let report = samatha.reindex(false, &NoProgress).await.unwrap();
    assert_eq!(report.processed, 2);

    let top = samatha.retrieve("What is XSS?", Some(5)).await.unwrap();
    assert_eq!(top.chunks[0].source_path, "web/xss.txt");
    assert_eq!(top, samatha.retrieve("What is XSS?", Some(5)).await.unwrap());

    let answer = samatha.ask("What is XSS?", Some(1)).await.unwrap();
    assert_eq!(answer.citations, vec!["web/xss.txt".to_string()]);
}
