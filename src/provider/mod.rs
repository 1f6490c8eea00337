//! LLM provider clients.
//!
//! Every provider sits behind [`LlmClient`]. The dispatcher holds one
//! `Arc<dyn LlmClient>`, usually a [`ProviderRouter`] that forwards to the
//! client registered for `config.provider`.
//!
//! ```text
//! Dispatcher --send--> ProviderRouter --OpenAiCompatible--> OpenAiClient
//!                                     \--Gemini-----------> GeminiClient
//! ```
//!
//! Clients are stateless apart from their HTTP connection pool. Everything
//! that varies per request (credential, model, temperature) comes in through
//! [`ProviderConfig`], so a config change never requires rebuilding a client.

mod gemini;
mod openai;
mod router;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use gemini::GeminiClient;
pub use openai::OpenAiClient;
pub use router::ProviderRouter;

use crate::session::{PendingTurn, Session, Turn};
use crate::{Error, Result};

/// Default endpoint for OpenAI-compatible providers.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Process the following text fragment.";

/// Which wire protocol to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProviderKind {
    /// OpenAI chat completions, or anything that mimics them.
    #[default]
    #[serde(rename = "openai")]
    OpenAiCompatible,
    /// Google Gemini `generateContent`.
    #[serde(rename = "gemini")]
    Gemini,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OpenAiCompatible => "openai",
            Self::Gemini => "gemini",
        })
    }
}

/// Connection and sampling settings for one provider.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Wire protocol.
    pub provider: ProviderKind,
    /// Credential.
    pub api_key: String,
    /// Endpoint root, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Base system prompt, before any glossary block.
    pub system_prompt: String,
    /// Client-side timeout per request.
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAiCompatible,
            api_key: String::new(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: "gpt-4o".to_string(),
            temperature: 0.7,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            request_timeout_secs: 120,
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "<redacted>" })
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("system_prompt", &self.system_prompt)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// One request as the dispatcher builds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// Effective system instruction. Ignored when a session is passed; the
    /// session's own instruction wins.
    pub system_instruction: String,
    /// The user message: pre-prompt and fragment content.
    pub message: String,
}

/// A chat-completion backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send one message and return the reply text.
    ///
    /// With a session, the session's history goes out ahead of the message
    /// and the exchange is appended to it on success only.
    async fn send(
        &self,
        request: &CompletionRequest,
        config: &ProviderConfig,
        session: Option<&Session>,
    ) -> Result<String>;

    /// Open a conversation.
    ///
    /// The default checks that a credential and a model are configured.
    /// Nothing is sent: the REST providers keep no server-side state, so
    /// the conversation lives entirely in the returned [`Session`].
    fn create_session(&self, config: &ProviderConfig, system_instruction: &str) -> Result<Session> {
        if config.api_key.trim().is_empty() {
            return Err(Error::SessionInit("API key is missing".into()));
        }
        if config.model.trim().is_empty() {
            return Err(Error::SessionInit("model is not set".into()));
        }
        Ok(Session::new(config.provider, system_instruction))
    }
}

/// The turns to send and, with a session, the guard that records them.
fn open_turn<'s>(
    request: &CompletionRequest,
    session: Option<&'s Session>,
) -> (Option<PendingTurn<'s>>, Vec<Turn>) {
    match session {
        Some(session) => {
            let pending = session.begin_turn(request.message.clone());
            let turns = pending.transcript().to_vec();
            (Some(pending), turns)
        }
        None => (None, vec![Turn::user(request.message.clone())]),
    }
}

fn system_instruction<'a>(request: &'a CompletionRequest, session: Option<&'a Session>) -> &'a str {
    session.map_or(request.system_instruction.as_str(), Session::system_instruction)
}

/// Error body shared by both REST APIs: `{"error": {"message": "..."}}`.
#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

fn map_http_error(status: reqwest::StatusCode, body: &str) -> Error {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|wrapper| wrapper.error.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| format!("HTTP Error: {}", status.as_u16()));
    Error::Dispatch(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Refusing;

    #[async_trait]
    impl LlmClient for Refusing {
        async fn send(
            &self,
            _request: &CompletionRequest,
            _config: &ProviderConfig,
            _session: Option<&Session>,
        ) -> Result<String> {
            Err(Error::Dispatch("nope".into()))
        }
    }

    #[test]
    fn test_defaults_follow_openai() {
        let config = ProviderConfig::default();
        assert_eq!(config.provider, ProviderKind::OpenAiCompatible);
        assert_eq!(config.base_url, DEFAULT_OPENAI_BASE_URL);
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.request_timeout_secs, 120);
    }

    #[test]
    fn test_debug_redacts_credential() {
        let config = ProviderConfig {
            api_key: "sk-secret".into(),
            ..ProviderConfig::default()
        };
        let shown = format!("{config:?}");
        assert!(!shown.contains("sk-secret"));
        assert!(shown.contains("<redacted>"));
    }

    #[test]
    fn test_provider_kind_serde_names() {
        let json = serde_json::to_string(&ProviderKind::OpenAiCompatible).unwrap();
        assert_eq!(json, "\"openai\"");
        let kind: ProviderKind = serde_json::from_str("\"gemini\"").unwrap();
        assert_eq!(kind, ProviderKind::Gemini);
    }

    #[test]
    fn test_default_session_requires_credential_and_model() {
        let mut config = ProviderConfig::default();
        assert!(matches!(
            Refusing.create_session(&config, "sys"),
            Err(Error::SessionInit(_))
        ));

        config.api_key = "k".into();
        config.model = "  ".into();
        assert!(matches!(
            Refusing.create_session(&config, "sys"),
            Err(Error::SessionInit(_))
        ));

        config.model = "m".into();
        let session = Refusing.create_session(&config, "sys").unwrap();
        assert_eq!(session.system_instruction(), "sys");
    }

    #[test]
    fn test_http_error_prefers_body_message() {
        let err = map_http_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"message":"Rate limit reached"}}"#,
        );
        assert_eq!(err.to_string(), "Rate limit reached");
    }

    #[test]
    fn test_http_error_falls_back_to_status() {
        let err = map_http_error(reqwest::StatusCode::BAD_GATEWAY, "<html>oops</html>");
        assert_eq!(err.to_string(), "HTTP Error: 502");
    }

    #[test]
    fn test_open_turn_without_session_sends_only_message() {
        let request = CompletionRequest {
            system_instruction: "sys".into(),
            message: "hello".into(),
        };
        let (pending, turns) = open_turn(&request, None);
        assert!(pending.is_none());
        assert_eq!(turns, vec![Turn::user("hello")]);
        assert_eq!(system_instruction(&request, None), "sys");
    }

    #[test]
    fn test_open_turn_with_session_sends_history() {
        let session = Session::new(ProviderKind::Gemini, "fixed");
        session.begin_turn("q1").commit("a1");

        let request = CompletionRequest {
            system_instruction: "ignored".into(),
            message: "q2".into(),
        };
        let (pending, turns) = open_turn(&request, Some(&session));
        assert_eq!(turns.len(), 3);
        assert_eq!(system_instruction(&request, Some(&session)), "fixed");

        drop(pending);
        assert_eq!(session.turns().len(), 2);
    }
}
