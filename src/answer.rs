//! Answer composition: retrieved chunks → prompt → model → cited answer.
//!
//! Chunks enter the prompt most-similar first until the context budget is
//! spent; the least similar are the ones dropped. Citations list the
//! distinct source paths of the chunks that were actually included.
//!
//! The model call is bounded by a timeout and retried on transient
//! failures with capped exponential backoff. If generation still fails the
//! answer degrades to [`AnswerStatus::GenerationUnavailable`] with its
//! sources intact; no text is ever made up.

use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::GenerationError;
use crate::llm::LanguageModel;
use crate::models::{Answer, AnswerStatus, RetrievalResult, ScoredChunk};

/// Characters of chunk text shown per source in verbose and degraded output.
pub const EXCERPT_CHARS: usize = 500;

const BLOCK_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone)]
pub struct AnswerSettings {
    pub context_budget_chars: usize,
    pub max_output_tokens: u32,
    pub timeout: Duration,
    pub max_retries: u32,
    /// First retry delay; doubles per attempt, capped at 32x.
    pub backoff_base: Duration,
}

impl From<&GenerationConfig> for AnswerSettings {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            context_budget_chars: config.context_budget_chars,
            max_output_tokens: config.max_output_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// The context section of a prompt and what went into it.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptContext {
    pub prompt: String,
    /// Chunks included, most similar first.
    pub included: Vec<ScoredChunk>,
    pub citations: Vec<String>,
}

fn block_header(position: usize, chunk: &ScoredChunk) -> String {
    format!(
        "[Document {}: {} | Relevance: {:.2}]",
        position, chunk.source_path, chunk.score
    )
}

/// Build the prompt for `query` from `result`, keeping the context part
/// within `budget_chars` characters.
pub fn compose_prompt(query: &str, result: &RetrievalResult, budget_chars: usize) -> PromptContext {
    let mut context = String::new();
    let mut used = 0usize;
    let mut included: Vec<ScoredChunk> = Vec::new();

    for chunk in &result.chunks {
        let header = block_header(included.len() + 1, chunk);
        let separator = if included.is_empty() { 0 } else { BLOCK_SEPARATOR.len() };
        let block_len = header.chars().count() + 1 + chunk.text.chars().count();

        if used + separator + block_len <= budget_chars {
            if separator > 0 {
                context.push_str(BLOCK_SEPARATOR);
            }
            context.push_str(&header);
            context.push('\n');
            context.push_str(&chunk.text);
            used += separator + block_len;
            included.push(chunk.clone());
            continue;
        }

        if included.is_empty() {
            // Nothing fits: send a truncated first block rather than no context.
            let room = budget_chars.saturating_sub(header.chars().count() + 1);
            let text: String = chunk.text.chars().take(room).collect();
            context.push_str(&header);
            context.push('\n');
            context.push_str(&text);
            included.push(ScoredChunk {
                text,
                ..chunk.clone()
            });
        }
        break;
    }

    if included.len() < result.chunks.len() {
        tracing::debug!(
            included = included.len(),
            dropped = result.chunks.len() - included.len(),
            budget_chars,
            "context budget reached"
        );
    }

    let mut citations: Vec<String> = Vec::new();
    for chunk in &included {
        if !citations.contains(&chunk.source_path) {
            citations.push(chunk.source_path.clone());
        }
    }

    let prompt = format!(
        "Based on the following cybersecurity documentation, please answer the question thoroughly and accurately.

CONTEXT DOCUMENTS:
{context}

QUESTION: {query}

INSTRUCTIONS:
- Provide a comprehensive answer based strictly on the context provided
- If the context doesn't contain enough information, acknowledge this limitation
- Include specific references to source documents when possible
- Format your response in a clear, organized manner
- Focus on actionable cybersecurity insights
- Be concise but thorough"
    );

    PromptContext {
        prompt,
        included,
        citations,
    }
}

/// Answer `query` from `result` using `llm`.
///
/// Never fails: generation problems are reported in [`Answer::status`].
pub async fn answer(
    llm: &dyn LanguageModel,
    query: &str,
    result: &RetrievalResult,
    settings: &AnswerSettings,
) -> Answer {
    if result.is_empty() {
        return Answer {
            text: None,
            status: AnswerStatus::NoContext,
            citations: Vec::new(),
            sources: Vec::new(),
        };
    }

    let ctx = compose_prompt(query, result, settings.context_budget_chars);

    match generate(llm, &ctx.prompt, settings).await {
        Ok(text) => Answer {
            text: Some(text),
            status: AnswerStatus::Generated,
            citations: ctx.citations,
            sources: ctx.included,
        },
        Err(err) => {
            tracing::warn!(model = llm.name(), error = %err, "answer generation failed");
            Answer {
                text: None,
                status: AnswerStatus::GenerationUnavailable {
                    reason: err.to_string(),
                },
                citations: ctx.citations,
                sources: ctx.included,
            }
        }
    }
}

async fn generate(
    llm: &dyn LanguageModel,
    prompt: &str,
    settings: &AnswerSettings,
) -> Result<String, GenerationError> {
    let mut attempt = 0u32;
    loop {
        let outcome = tokio::time::timeout(
            settings.timeout,
            llm.complete(prompt, settings.max_output_tokens),
        )
        .await
        .unwrap_or(Err(GenerationError::Timeout(settings.timeout)));

        match outcome {
            Ok(text) => return Ok(text),
            Err(err) if err.is_transient() && attempt < settings.max_retries => {
                attempt += 1;
                let delay = backoff_delay(settings.backoff_base, attempt);
                tracing::info!(attempt, error = %err, ?delay, "retrying generation");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1 << attempt.saturating_sub(1).min(5))
}

fn excerpt(text: &str) -> String {
    let mut out: String = text.chars().take(EXCERPT_CHARS).collect();
    if text.chars().count() > EXCERPT_CHARS {
        out.push_str("...");
    }
    out
}

fn source_lines(sources: &[ScoredChunk], with_excerpts: bool) -> String {
    let mut out = String::new();
    for (i, chunk) in sources.iter().enumerate() {
        let location = chunk
            .hint
            .as_deref()
            .map(|h| format!(", {}", h))
            .unwrap_or_default();
        out.push_str(&format!(
            "  {}. {}{} (relevance: {:.1}%)\n",
            i + 1,
            chunk.source_path,
            location,
            chunk.score * 100.0
        ));
        if with_excerpts {
            for line in excerpt(&chunk.text).lines() {
                out.push_str("     ");
                out.push_str(line);
                out.push('\n');
            }
            out.push('\n');
        }
    }
    out
}

/// Human-readable rendering of an answer.
///
/// `verbose` adds chunk excerpts to the source list. In degraded mode the
/// excerpts are always shown since they are the only content.
pub fn render(answer: &Answer, verbose: bool, show_sources: bool) -> String {
    match &answer.status {
        AnswerStatus::NoContext => "No relevant information found in the knowledge base.\n\
             Try indexing some documents first: samatha index\n"
            .to_string(),
        AnswerStatus::Generated => {
            let mut out = answer.text.clone().unwrap_or_default();
            out.push('\n');
            if show_sources {
                out.push_str("\nSources:\n");
                out.push_str(&source_lines(&answer.sources, verbose));
            }
            out
        }
        AnswerStatus::GenerationUnavailable { reason } => {
            let mut out = format!("Answer generation unavailable: {}\n\n", reason);
            out.push_str(&format!(
                "Retrieved context ({} sources):\n",
                answer.sources.len()
            ));
            out.push_str(&source_lines(&answer.sources, true));
            out
        }
    }
}
