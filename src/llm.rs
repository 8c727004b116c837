//! Language model boundary.
//!
//! The answer composer talks to a hosted model through [`LanguageModel`]:
//! a prompt and an output-token limit in, text or a classified
//! [`GenerationError`] out. Rate limits, 5xx responses and network errors
//! are transient; everything else is permanent.
//!
//! When no API key is configured the process runs with [`DisabledModel`]
//! and answers degrade to a source listing.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::GenerationConfig;
use crate::error::GenerationError;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, prompt: &str, max_output_tokens: u32)
        -> Result<String, GenerationError>;
}

/// Retrieval-only mode: every call fails permanently.
pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str, _max: u32) -> Result<String, GenerationError> {
        Err(GenerationError::Permanent("generation disabled".to_string()))
    }
}

/// Google Generative Language API (`models/{model}:generateContent`).
pub struct GeminiModel {
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiModel {
    pub fn new(model: &str, base_url: Option<&str>, api_key: String) -> Self {
        Self {
            model: model.to_string(),
            base_url: base_url
                .unwrap_or("https://generativelanguage.googleapis.com/v1beta")
                .trim_end_matches('/')
                .to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String, GenerationError> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "maxOutputTokens": max_output_tokens },
        });

        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let json = read_json(response, "Gemini").await?;
        parse_gemini_response(&json)
    }
}

fn parse_gemini_response(json: &serde_json::Value) -> Result<String, GenerationError> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            let reason = json
                .pointer("/promptFeedback/blockReason")
                .and_then(|r| r.as_str())
                .unwrap_or("missing candidates");
            GenerationError::Permanent(format!("Gemini returned no answer: {}", reason))
        })?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    non_empty(text)
}

/// OpenAI chat completions, or any server speaking the same protocol.
pub struct OpenAiModel {
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiModel {
    pub fn new(model: &str, base_url: Option<&str>, api_key: String) -> Self {
        Self {
            model: model.to_string(),
            base_url: base_url
                .unwrap_or("https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String, GenerationError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": max_output_tokens,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let json = read_json(response, "OpenAI").await?;
        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                GenerationError::Permanent("OpenAI response missing message content".to_string())
            })?;
        non_empty(text.to_string())
    }
}

fn non_empty(text: String) -> Result<String, GenerationError> {
    if text.trim().is_empty() {
        return Err(GenerationError::Permanent(
            "model returned an empty answer".to_string(),
        ));
    }
    Ok(text)
}

async fn read_json(
    response: reqwest::Response,
    service: &str,
) -> Result<serde_json::Value, GenerationError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(status.as_u16(), service, &body));
    }
    response
        .json()
        .await
        .map_err(|e| GenerationError::Permanent(format!("{} returned invalid JSON: {}", service, e)))
}

/// 429 and 5xx are worth retrying; other statuses are not.
fn classify_status(status: u16, service: &str, body: &str) -> GenerationError {
    let message = format!("{} API error {}: {}", service, status, body.trim());
    if status == 429 || (500..600).contains(&status) {
        GenerationError::Transient(message)
    } else {
        GenerationError::Permanent(message)
    }
}

fn classify_transport(e: reqwest::Error) -> GenerationError {
    if e.is_builder() {
        GenerationError::Permanent(e.to_string())
    } else {
        GenerationError::Transient(e.to_string())
    }
}

/// Build the configured model. A missing API key selects [`DisabledModel`]
/// so the assistant still answers with sources.
pub fn create_model(config: &GenerationConfig) -> Arc<dyn LanguageModel> {
    let key_var = match config.provider.as_str() {
        "gemini" => "GEMINI_API_KEY",
        "openai" => "OPENAI_API_KEY",
        _ => return Arc::new(DisabledModel),
    };

    let api_key = match std::env::var(key_var) {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            tracing::warn!(
                provider = %config.provider,
                "{} not set; running in retrieval-only mode",
                key_var
            );
            return Arc::new(DisabledModel);
        }
    };

    let base_url = config.base_url.as_deref();
    match config.provider.as_str() {
        "openai" => Arc::new(OpenAiModel::new(&config.model, base_url, api_key)),
        _ => Arc::new(GeminiModel::new(&config.model, base_url, api_key)),
    }
}
