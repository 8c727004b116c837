//! # Cyber Samatha CLI (`samatha`)
//!
//! The `samatha` binary indexes a local security corpus and answers
//! questions against it.
//!
//! ## Usage
//!
//! ```bash
//! samatha --config ./config/samatha.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `samatha init` | Create the index and ledger databases |
//! | `samatha index` | Incrementally (re)index the corpus root |
//! | `samatha ask "<question>"` | Retrieve sources and compose an answer |
//! | `samatha search "<query>"` | Ranked chunks only, no generation |
//! | `samatha chat` | Interactive question loop |
//! | `samatha stats` | Index statistics |
//! | `samatha status` | Per-document ledger entries |
//! | `samatha sources` | Corpus collections versus index contents |
//! | `samatha completions <shell>` | Print a shell completion script |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `warn`).

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use cybersamatha::answer;
use cybersamatha::chat::{self, ChatOptions};
use cybersamatha::config::{self, DEFAULT_CONFIG_PATH};
use cybersamatha::context::Samatha;
use cybersamatha::migrate;
use cybersamatha::models::IndexReport;
use cybersamatha::progress::{format_number, ProgressMode};
use cybersamatha::sources;
use cybersamatha::stats;

/// Cyber Samatha: a local-first security knowledge assistant.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Every section is optional; missing keys take their defaults.
#[derive(Parser)]
#[command(
    name = "samatha",
    about = "Cyber Samatha: a local-first security knowledge assistant",
    version,
    long_about = "Cyber Samatha indexes a folder of security documents (Markdown, text, PDF, \
    DOCX, PPTX, JSON, YAML), embeds them into a local SQLite vector index, and answers questions \
    with cited sources. A hosted model writes the answer when GEMINI_API_KEY or OPENAI_API_KEY \
    is set; otherwise the retrieved sources are shown."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the index and ledger databases. Safe to run repeatedly.
    Init,

    /// Index new and changed documents under the corpus root.
    ///
    /// Unchanged files (same SHA-256 fingerprint as the ledger) are skipped.
    /// A failing document is reported and does not stop the pass.
    Index {
        /// Reprocess every document and prune ones that no longer exist.
        #[arg(long)]
        force: bool,

        /// Print the final report as JSON on stdout.
        #[arg(long)]
        json: bool,

        /// Progress on stderr: `human`, `json`, or `off`.
        /// Defaults to `human` when stderr is a terminal.
        #[arg(long, value_parser = ["human", "json", "off"])]
        progress: Option<String>,
    },

    /// Answer a question from the indexed corpus.
    Ask {
        question: String,

        /// Number of chunks to retrieve (defaults to `[retrieval] top_k`).
        #[arg(long)]
        k: Option<usize>,

        /// Show chunk excerpts under each source.
        #[arg(long, short)]
        verbose: bool,

        /// Hide the source list.
        #[arg(long)]
        no_sources: bool,

        /// Print the answer as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the top-k chunks for a query without generating an answer.
    Search {
        query: String,

        #[arg(long)]
        k: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Start an interactive question session.
    Chat {
        #[arg(long)]
        k: Option<usize>,

        #[arg(long, short)]
        verbose: bool,

        #[arg(long)]
        no_sources: bool,
    },

    /// Show index statistics.
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// List ledger entries: every indexed document with its fingerprint.
    Status,

    /// List corpus collections and how many of their files are indexed.
    Sources,

    /// Print a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn progress_mode(flag: Option<&str>) -> ProgressMode {
    match flag {
        Some("json") => ProgressMode::Json,
        Some("off") => ProgressMode::Off,
        Some(_) => ProgressMode::Human,
        None => ProgressMode::default_for_tty(),
    }
}

fn print_report(report: &IndexReport) {
    println!("Index complete");
    println!("  discovered:     {}", format_number(report.discovered));
    println!("  processed:      {}", format_number(report.processed));
    println!("  skipped:        {}", format_number(report.skipped));
    println!("  failed:         {}", format_number(report.failed));
    println!("  chunks written: {}", format_number(report.chunks_written));
    if report.pruned > 0 {
        println!("  pruned:         {}", format_number(report.pruned));
    }
    println!("  elapsed:        {} ms", report.elapsed_ms);
    for failure in &report.failures {
        println!(
            "  FAILED {} [{}]: {}",
            failure.path,
            failure.stage.as_str(),
            failure.reason
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(
            *shell,
            &mut Cli::command(),
            "samatha",
            &mut std::io::stdout(),
        );
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let samatha = Samatha::open(cfg).await?;
    let mut stdout = std::io::stdout();

    match cli.command {
        Commands::Index {
            force,
            json,
            progress,
        } => {
            let reporter = progress_mode(progress.as_deref()).reporter();
            let report = samatha.reindex(force, reporter.as_ref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Ask {
            question,
            k,
            verbose,
            no_sources,
            json,
        } => {
            let result = samatha.ask(&question, k).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print!("{}", answer::render(&result, verbose, !no_sources));
            }
        }
        Commands::Search { query, k, json } => {
            let result = samatha.retrieve(&query, k).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if result.is_empty() {
                println!("No results.");
            } else {
                for (i, chunk) in result.chunks.iter().enumerate() {
                    let excerpt: String = chunk.text.chars().take(160).collect();
                    println!(
                        "{}. [{:.2}] {} #{}",
                        i + 1,
                        chunk.score,
                        chunk.source_path,
                        chunk.chunk_index
                    );
                    println!("    excerpt: \"{}\"", excerpt.replace('\n', " ").trim());
                }
            }
        }
        Commands::Chat {
            k,
            verbose,
            no_sources,
        } => {
            let input = tokio::io::BufReader::new(tokio::io::stdin());
            let options = ChatOptions {
                k,
                verbose,
                show_sources: !no_sources,
            };
            chat::run_chat(&samatha, input, &mut stdout, options).await?;
        }
        Commands::Stats { json } => {
            let s = stats::collect_stats(&samatha).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&s)?);
            } else {
                stats::write_stats(&mut stdout, &s)?;
            }
        }
        Commands::Status => {
            let entries = samatha.ledger().status().await?;
            stats::write_status(&mut stdout, &entries)?;
        }
        Commands::Sources => {
            sources::list_sources(&samatha, &mut stdout).await?;
        }
        Commands::Init | Commands::Completions { .. } => {}
    }

    Ok(())
}
