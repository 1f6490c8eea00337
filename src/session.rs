//! Conversation sessions for contextual serial runs.
//!
//! ## One Session, Many Turns
//!
//! In contextual mode every fragment is one exchange in a single ongoing
//! conversation. Fragment 7 is answered by a model that has seen fragments
//! 1-6 and its own replies to them:
//!
//! ```text
//! system:    <instruction, fixed when the session is created>
//! user:      fragment 1
//! assistant: result 1
//! user:      fragment 2
//! assistant: result 2
//! user:      fragment 3      <- in flight
//! ```
//!
//! ## Transactional Turns
//!
//! A failed request must not leave a question without an answer in the
//! history, or every later request would carry it. [`Session::begin_turn`]
//! appends the user turn and hands back a [`PendingTurn`]. Committing it
//! appends the reply; dropping it uncommitted (an early `?` return, a
//! panic) removes the user turn again.
//!
//! ## Invalidation
//!
//! A session is tied to the provider, credential, model and system prompt it
//! was created with. [`SessionManager::observe_config`] drops it when any of
//! those change, so the next dispatch starts a fresh conversation instead of
//! continuing one the new settings never saw.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::provider::{LlmClient, ProviderConfig, ProviderKind};
use crate::{Error, Result};

/// Who said a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The fragment text we sent.
    User,
    /// The model's reply.
    Assistant,
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Speaker.
    pub role: Role,
    /// Message text.
    pub text: String,
}

impl Turn {
    /// A user turn.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    /// An assistant turn.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Opaque handle to one multi-turn conversation.
///
/// Cloning is cheap and clones share history. The dispatcher is the only
/// owner that outlives a call; clients receive a borrow for the duration of
/// one request.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    id: Uuid,
    provider: ProviderKind,
    system_instruction: String,
    turns: Mutex<Vec<Turn>>,
}

impl Session {
    /// Start an empty conversation.
    #[must_use]
    pub fn new(provider: ProviderKind, system_instruction: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                provider,
                system_instruction: system_instruction.into(),
                turns: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Unique id, for logs.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Provider the session was created for.
    #[must_use]
    pub fn provider(&self) -> ProviderKind {
        self.inner.provider
    }

    /// Instruction fixed at creation.
    #[must_use]
    pub fn system_instruction(&self) -> &str {
        &self.inner.system_instruction
    }

    /// Snapshot of the committed history.
    #[must_use]
    pub fn turns(&self) -> Vec<Turn> {
        self.lock().clone()
    }

    /// Completed user/assistant exchanges.
    #[must_use]
    pub fn exchange_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|turn| turn.role == Role::Assistant)
            .count()
    }

    /// Whether two handles refer to the same conversation.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Append a user turn speculatively.
    ///
    /// ```rust
    /// use chunkflow::{ProviderKind, Session};
    ///
    /// let session = Session::new(ProviderKind::OpenAiCompatible, "be brief");
    ///
    /// let turn = session.begin_turn("first");
    /// assert_eq!(turn.transcript().len(), 1);
    /// turn.commit("ok");
    ///
    /// {
    ///     let _failed = session.begin_turn("second");
    ///     // request fails, guard dropped without commit
    /// }
    ///
    /// assert_eq!(session.turns().len(), 2);
    /// assert_eq!(session.exchange_count(), 1);
    /// ```
    pub fn begin_turn(&self, message: impl Into<String>) -> PendingTurn<'_> {
        let mut turns = self.lock();
        let rollback_to = turns.len();
        turns.push(Turn::user(message));
        let transcript = turns.clone();
        drop(turns);

        PendingTurn {
            session: self,
            rollback_to,
            transcript,
            committed: false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Turn>> {
        self.inner
            .turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A user turn that has been sent but not yet answered.
///
/// Dropping it without [`PendingTurn::commit`] rolls the history back.
#[derive(Debug)]
pub struct PendingTurn<'s> {
    session: &'s Session,
    rollback_to: usize,
    transcript: Vec<Turn>,
    committed: bool,
}

impl PendingTurn<'_> {
    /// Full history including the pending user turn, ready to send.
    #[must_use]
    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    /// Record the reply and keep both turns.
    pub fn commit(mut self, reply: impl Into<String>) {
        self.session.lock().push(Turn::assistant(reply));
        self.committed = true;
    }
}

impl Drop for PendingTurn<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.session.lock().truncate(self.rollback_to);
        }
    }
}

/// Fingerprint of the provider settings a session depends on.
///
/// Covers provider, credential, model and system prompt. Temperature and
/// endpoint changes do not restart the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey(u64);

impl SessionKey {
    /// Key for a provider configuration.
    #[must_use]
    pub fn of(config: &ProviderConfig) -> Self {
        let mut hasher = DefaultHasher::new();
        config.provider.hash(&mut hasher);
        config.api_key.hash(&mut hasher);
        config.model.hash(&mut hasher);
        config.system_prompt.hash(&mut hasher);
        Self(hasher.finish())
    }
}

/// Owns the lifetime of the single contextual session.
#[derive(Debug, Default)]
pub struct SessionManager {
    current: Option<Session>,
    key: Option<SessionKey>,
    created: usize,
}

impl SessionManager {
    /// Manager with no session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The live session, if any.
    #[must_use]
    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// How many sessions this manager has created.
    #[must_use]
    pub fn sessions_created(&self) -> usize {
        self.created
    }

    /// Create a new session, replacing any current one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionInit`] if the client refuses, whatever the
    /// underlying reason.
    pub fn create(
        &mut self,
        client: &dyn LlmClient,
        config: &ProviderConfig,
        system_instruction: &str,
    ) -> Result<Session> {
        let session = client
            .create_session(config, system_instruction)
            .map_err(|err| match err {
                Error::SessionInit(_) => err,
                other => Error::SessionInit(other.to_string()),
            })?;

        info!(session = %session.id(), provider = %config.provider, "session created");
        self.current = Some(session.clone());
        self.key = Some(SessionKey::of(config));
        self.created += 1;
        Ok(session)
    }

    /// The current session, or a new one if there is none.
    ///
    /// # Errors
    ///
    /// As [`SessionManager::create`].
    pub fn ensure(
        &mut self,
        client: &dyn LlmClient,
        config: &ProviderConfig,
        system_instruction: &str,
    ) -> Result<Session> {
        match &self.current {
            Some(session) => Ok(session.clone()),
            None => self.create(client, config, system_instruction),
        }
    }

    /// Drop the current session. Returns whether there was one.
    pub fn invalidate(&mut self) -> bool {
        self.key = None;
        match self.current.take() {
            Some(session) => {
                debug!(session = %session.id(), "session invalidated");
                true
            }
            None => false,
        }
    }

    /// Invalidate if `config` differs in any field the session depends on.
    pub fn observe_config(&mut self, config: &ProviderConfig) -> bool {
        match self.key {
            Some(key) if key != SessionKey::of(config) => self.invalidate(),
            _ => false,
        }
    }
}
