//! Google Gemini `generateContent`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    map_http_error, open_turn, system_instruction, CompletionRequest, LlmClient, ProviderConfig,
    DEFAULT_OPENAI_BASE_URL,
};
use crate::session::{Role, Session, Turn};
use crate::{Error, Result};

/// Default Gemini endpoint root.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Client for `POST {base}/models/{model}:generateContent`.
///
/// An empty `base_url`, or the OpenAI default left over from switching
/// providers, means the public Gemini endpoint.
#[derive(Debug, Clone, Default)]
pub struct GeminiClient {
    http: reqwest::Client,
}

impl GeminiClient {
    /// Client with a fresh connection pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Client sharing an existing `reqwest` pool.
    #[must_use]
    pub fn with_http(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn send(
        &self,
        request: &CompletionRequest,
        config: &ProviderConfig,
        session: Option<&Session>,
    ) -> Result<String> {
        let (pending, turns) = open_turn(request, session);
        let body = build_request(config, system_instruction(request, session), &turns);
        let url = endpoint(&config.base_url, &config.model);
        debug!(%url, turns = turns.len(), "gemini request");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &config.api_key)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &text));
        }

        let parsed: GenerateContentResponse = response.json().await?;
        let reply = extract_text_response(parsed)?;

        if let Some(pending) = pending {
            pending.commit(reply.clone());
        }
        Ok(reply)
    }
}

fn endpoint(base_url: &str, model: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let base = if base.is_empty() || base == DEFAULT_OPENAI_BASE_URL {
        DEFAULT_GEMINI_BASE_URL
    } else {
        base
    };
    format!("{base}/models/{model}:generateContent")
}

fn build_request<'a>(
    config: &ProviderConfig,
    system_instruction: &'a str,
    turns: &'a [Turn],
) -> GenerateContentRequest<'a> {
    let contents = turns
        .iter()
        .map(|turn| Content {
            role: Some(match turn.role {
                Role::User => "user",
                Role::Assistant => "model",
            }),
            parts: vec![Part { text: &turn.text }],
        })
        .collect();

    let system_instruction = (!system_instruction.trim().is_empty()).then(|| Content {
        role: None,
        parts: vec![Part {
            text: system_instruction,
        }],
    });

    GenerateContentRequest {
        contents,
        system_instruction,
        generation_config: GenerationConfig {
            temperature: config.temperature,
        },
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

fn extract_text_response(response: GenerateContentResponse) -> Result<String> {
    let parts = response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts)
        .unwrap_or_default();

    let texts: Vec<String> = parts.into_iter().filter_map(|part| part.text).collect();
    if texts.is_empty() {
        return Err(Error::InvalidResponse(
            "no text in the first candidate".into(),
        ));
    }
    Ok(texts.concat())
}
