//! Interactive question loop for `samatha chat`.
//!
//! Reads one question per line. `quit`, `exit`, `bye` or `q` ends the
//! session; `stats`, `status` or `info` prints index statistics; blank lines
//! are ignored. A failed question is reported and the loop continues.

use anyhow::Result;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::answer;
use crate::context::Samatha;
use crate::stats;

#[derive(Debug, Clone, Copy, Default)]
pub struct ChatOptions {
    pub k: Option<usize>,
    pub verbose: bool,
    pub show_sources: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Quit,
    Stats,
    Skip,
    Ask(&'a str),
}

fn parse_line(line: &str) -> Command<'_> {
    let trimmed = line.trim();
    match trimmed.to_lowercase().as_str() {
        "" => Command::Skip,
        "quit" | "exit" | "bye" | "q" => Command::Quit,
        "stats" | "status" | "info" => Command::Stats,
        _ => Command::Ask(trimmed),
    }
}

fn write_banner(out: &mut impl Write, samatha: &Samatha) -> std::io::Result<()> {
    writeln!(out, "Cyber Samatha: security knowledge assistant")?;
    if samatha.generation_enabled() {
        writeln!(out, "AI answers via {}.", samatha.llm().name())?;
    } else {
        writeln!(out, "AI answers disabled; showing retrieved sources only.")?;
    }
    writeln!(out, "Type a question, 'stats' for index info, or 'quit' to leave.")?;
    writeln!(out)?;
    Ok(())
}

pub async fn run_chat<R, W>(
    samatha: &Samatha,
    input: R,
    out: &mut W,
    options: ChatOptions,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    write_banner(out, samatha)?;
    let mut lines = input.lines();

    loop {
        write!(out, "> ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            break;
        };

        match parse_line(&line) {
            Command::Skip => continue,
            Command::Quit => {
                writeln!(out, "Goodbye.")?;
                break;
            }
            Command::Stats => {
                let s = stats::collect_stats(samatha).await?;
                stats::write_stats(out, &s)?;
            }
            Command::Ask(question) => match samatha.ask(question, options.k).await {
                Ok(a) => {
                    let rendered = answer::render(&a, options.verbose, options.show_sources);
                    writeln!(out, "{}", rendered)?;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "question failed");
                    writeln!(out, "Error: {}", e)?;
                    writeln!(out)?;
                }
            },
        }
    }

    Ok(())
}
