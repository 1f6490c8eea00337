use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{
    CompletionRequest, GeminiClient, LlmClient, OpenAiClient, ProviderConfig, ProviderKind,
};
use crate::session::Session;
use crate::{Error, Result};

/// Routes each call to the client registered for `config.provider`.
#[derive(Clone, Default)]
pub struct ProviderRouter {
    clients: HashMap<ProviderKind, Arc<dyn LlmClient>>,
}

impl ProviderRouter {
    /// Router with no clients.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Router with [`OpenAiClient`] and [`GeminiClient`] sharing one pool.
    #[must_use]
    pub fn with_defaults() -> Self {
        let http = reqwest::Client::new();
        let mut router = Self::new();
        router.register(
            ProviderKind::OpenAiCompatible,
            Arc::new(OpenAiClient::with_http(http.clone())),
        );
        router.register(ProviderKind::Gemini, Arc::new(GeminiClient::with_http(http)));
        router
    }

    /// Register (or replace) the client for `kind`.
    pub fn register(&mut self, kind: ProviderKind, client: Arc<dyn LlmClient>) {
        self.clients.insert(kind, client);
    }

    /// Client for `kind`.
    #[must_use]
    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn LlmClient>> {
        self.clients.get(&kind).cloned()
    }

    /// Whether `kind` has a client.
    #[must_use]
    pub fn has(&self, kind: ProviderKind) -> bool {
        self.clients.contains_key(&kind)
    }

    fn client(&self, kind: ProviderKind) -> Result<&dyn LlmClient> {
        self.clients
            .get(&kind)
            .map(|client| &**client)
            .ok_or(Error::UnsupportedProvider(kind))
    }
}

impl std::fmt::Debug for ProviderRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRouter")
            .field("providers", &self.clients.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl LlmClient for ProviderRouter {
    async fn send(
        &self,
        request: &CompletionRequest,
        config: &ProviderConfig,
        session: Option<&Session>,
    ) -> Result<String> {
        self.client(config.provider)?
            .send(request, config, session)
            .await
    }

    fn create_session(&self, config: &ProviderConfig, system_instruction: &str) -> Result<Session> {
        self.client(config.provider)?
            .create_session(config, system_instruction)
    }
}
