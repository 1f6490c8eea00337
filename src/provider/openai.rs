//! OpenAI chat completions and compatible endpoints.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    map_http_error, open_turn, system_instruction, CompletionRequest, LlmClient, ProviderConfig,
};
use crate::session::{Role, Session, Turn};
use crate::{Error, Result};

/// Client for `POST {base_url}/chat/completions`.
///
/// Works with anything that speaks the OpenAI chat protocol (local servers,
/// proxies, other vendors) by pointing `base_url` elsewhere.
#[derive(Debug, Clone, Default)]
pub struct OpenAiClient {
    http: reqwest::Client,
}

impl OpenAiClient {
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
impl LlmClient for OpenAiClient {
    async fn send(
        &self,
        request: &CompletionRequest,
        config: &ProviderConfig,
        session: Option<&Session>,
    ) -> Result<String> {
        let (pending, turns) = open_turn(request, session);
        let body = build_request(config, system_instruction(request, session), &turns);
        let url = endpoint(&config.base_url);
        debug!(%url, model = %config.model, turns = turns.len(), "openai request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&config.api_key)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &text));
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        let reply = extract_text_response(parsed)?;

        if let Some(pending) = pending {
            pending.commit(reply.clone());
        }
        Ok(reply)
    }
}

fn endpoint(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

fn build_request<'a>(
    config: &'a ProviderConfig,
    system_instruction: &'a str,
    turns: &'a [Turn],
) -> ChatCompletionRequest<'a> {
    let mut messages = Vec::with_capacity(turns.len() + 1);
    messages.push(ChatMessage {
        role: "system",
        content: system_instruction,
    });
    messages.extend(turns.iter().map(|turn| ChatMessage {
        role: match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        },
        content: &turn.text,
    }));

    ChatCompletionRequest {
        model: &config.model,
        messages,
        temperature: config.temperature,
        stream: false,
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

fn extract_text_response(response: ChatCompletionResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| Error::InvalidResponse("no content in choices[0].message".into()))
}
