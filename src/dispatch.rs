//! The dispatcher: fragment state, run flags, and the scheduling decision.
//!
//! ## Control Flow
//!
//! Everything that changes state runs on `&mut self` without yielding.
//! Provider calls run as tasks on a [`JoinSet`]; their results come back
//! only through [`Dispatcher::next_event`]:
//!
//! ```text
//!   start() / retry() ──► schedule() ──spawn──► [ task | task | task ]
//!                            ▲                        │
//!                            │                        ▼
//!                      next_event() ◄─── join_next ───┘
//!                      apply outcome, schedule() again
//! ```
//!
//! `schedule` is idempotent: calling it twice in a row dispatches nothing the
//! second time, because the first call already marked its picks
//! `Processing`.
//!
//! ## Halting
//!
//! A single failure halts the run. Requests already on the wire finish and
//! are recorded; nothing new is sent. The run stops once they have drained.
//! [`Dispatcher::start`] resumes, failed fragments first:
//!
//! ```text
//! parallel, limit 2, after a halt:
//!
//!   #1 ok   #2 ERR   #3 ok   #4 ERR   #5 idle   #6 idle
//!
//! start() -> dispatch #2, #4          (errors only)
//!         -> both ok, nothing in flight
//!         -> dispatch #5, #6          (normal order resumes)
//! ```

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::task::{self, JoinSet};
use tracing::{debug, info, warn};

use crate::glossary::DEFAULT_GLOSSARY_TEMPLATE;
use crate::provider::{CompletionRequest, LlmClient, ProviderConfig};
use crate::session::{Session, SessionManager};
use crate::{
    split, Error, Fragment, FragmentId, FragmentStatus, GlossaryMatcher, GlossaryTerm, Result,
    SplitConfig, TermMatcher,
};

/// How fragments are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One request at a time, in order.
    #[default]
    Serial,
    /// Up to `concurrency_limit` requests at a time.
    Parallel,
}

/// Which fragments get the pre-prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    /// Every fragment.
    #[default]
    Every,
    /// Only the fragment with `sequence_index == 1`.
    First,
}

/// Per-run behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Serial or parallel.
    pub execution: ExecutionMode,
    /// Carry one conversation across fragments. Serial only.
    pub contextual: bool,
    /// Parallel request limit. Values below 1 count as 1.
    pub concurrency_limit: usize,
    /// Instruction placed before the fragment content.
    pub pre_prompt: String,
    /// Which fragments get `pre_prompt`.
    pub prompt_mode: PromptMode,
    /// Append matched glossary terms to the system instruction.
    pub glossary_enabled: bool,
    /// Header for the glossary block; `{terms}` marks the list.
    pub glossary_template: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            execution: ExecutionMode::Serial,
            contextual: false,
            concurrency_limit: 3,
            pre_prompt: String::new(),
            prompt_mode: PromptMode::Every,
            glossary_enabled: false,
            glossary_template: DEFAULT_GLOSSARY_TEMPLATE.to_string(),
        }
    }
}

impl RunOptions {
    /// Serial, independent requests.
    #[must_use]
    pub fn serial() -> Self {
        Self::default()
    }

    /// Serial, one ongoing conversation.
    #[must_use]
    pub fn contextual() -> Self {
        Self {
            contextual: true,
            ..Self::default()
        }
    }

    /// Parallel with at most `limit` requests in flight.
    #[must_use]
    pub fn parallel(limit: usize) -> Self {
        Self {
            execution: ExecutionMode::Parallel,
            concurrency_limit: limit,
            ..Self::default()
        }
    }

    /// Set the pre-prompt and where it goes.
    #[must_use]
    pub fn with_pre_prompt(mut self, pre_prompt: impl Into<String>, mode: PromptMode) -> Self {
        self.pre_prompt = pre_prompt.into();
        self.prompt_mode = mode;
        self
    }

    /// Enable glossary injection.
    #[must_use]
    pub fn with_glossary(mut self) -> Self {
        self.glossary_enabled = true;
        self
    }

    /// Requests allowed in flight at once.
    #[must_use]
    pub fn limit(&self) -> usize {
        match self.execution {
            ExecutionMode::Serial => 1,
            ExecutionMode::Parallel => self.concurrency_limit.max(1),
        }
    }

    /// Whether runs use a session.
    #[must_use]
    pub fn is_contextual(&self) -> bool {
        self.contextual && self.execution == ExecutionMode::Serial
    }
}

/// One applied completion, as returned by [`Dispatcher::next_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// The fragment now holds a result.
    Completed {
        /// Fragment.
        id: FragmentId,
        /// Its position.
        sequence_index: usize,
    },
    /// The fragment failed and the run is halted.
    Failed {
        /// Fragment.
        id: FragmentId,
        /// Its position.
        sequence_index: usize,
        /// What went wrong.
        message: String,
    },
}

/// Status counts for a progress display.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Progress {
    /// All fragments.
    pub total: usize,
    /// `Idle` or `Waiting`.
    pub pending: usize,
    /// `Processing`.
    pub processing: usize,
    /// `Success`.
    pub succeeded: usize,
    /// `Error`.
    pub failed: usize,
    /// Requests in flight.
    pub active_requests: usize,
}

impl Progress {
    /// Share of fragments with a result, 0.0 to 1.0. Zero when empty.
    #[must_use]
    pub fn completed_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64
        }
    }
}

/// Exactly what a fragment would send if dispatched now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestPreview {
    /// `"parallel"`, `"serial"`, `"contextual (start)"` or
    /// `"contextual (continue)"`.
    pub mode: String,
    /// Model identifier.
    pub model: String,
    /// Effective system instruction.
    pub system_instruction: String,
    /// User message.
    pub message: String,
    /// Prior exchanges the model will have seen. Zero outside contextual
    /// runs.
    pub turn_depth: usize,
}

struct Outcome {
    id: FragmentId,
    result: Result<String>,
}

/// Owns the fragment list and drives provider calls.
///
/// Must be used inside a Tokio runtime: operations that can dispatch spawn
/// tasks.
pub struct Dispatcher {
    client: Arc<dyn LlmClient>,
    matcher: Arc<dyn GlossaryMatcher>,
    provider: ProviderConfig,
    options: RunOptions,
    split_config: SplitConfig,
    glossary: Vec<GlossaryTerm>,
    source: String,
    fragments: Vec<Fragment>,
    sessions: SessionManager,
    tasks: JoinSet<Outcome>,
    /// Which fragment each spawned task answers for.
    owners: HashMap<task::Id, FragmentId>,
    in_flight: HashSet<FragmentId>,
    running: bool,
    halted: bool,
    retrying_errors_only: bool,
    global_error: Option<String>,
}

impl Dispatcher {
    /// Dispatcher with no source text.
    #[must_use]
    pub fn new(client: Arc<dyn LlmClient>, provider: ProviderConfig, options: RunOptions) -> Self {
        Self {
            client,
            matcher: Arc::new(TermMatcher),
            provider,
            options,
            split_config: SplitConfig::default(),
            glossary: Vec::new(),
            source: String::new(),
            fragments: Vec::new(),
            sessions: SessionManager::new(),
            tasks: JoinSet::new(),
            owners: HashMap::new(),
            in_flight: HashSet::new(),
            running: false,
            halted: false,
            retrying_errors_only: false,
            global_error: None,
        }
    }

    /// Replace the glossary matcher.
    #[must_use]
    pub fn with_matcher(mut self, matcher: Arc<dyn GlossaryMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    // ---- user operations ----

    /// Start the run, or pause it if it is already running.
    ///
    /// Starting clears a halt. In parallel mode, fragments left in `Error`
    /// go out before any `Idle` one.
    pub fn start(&mut self) {
        if self.running {
            self.pause();
            return;
        }

        if self.options.execution == ExecutionMode::Parallel
            && self.count(FragmentStatus::Error) > 0
        {
            self.retrying_errors_only = true;
        }
        self.halted = false;
        self.global_error = None;
        self.running = true;
        info!(
            fragments = self.fragments.len(),
            limit = self.options.limit(),
            "run started"
        );
        self.schedule();
    }

    /// Stop dispatching. In-flight requests finish and are still recorded.
    pub fn pause(&mut self) {
        if self.running {
            info!(active = self.in_flight.len(), "run paused");
        }
        self.running = false;
    }

    /// Put one finished fragment back to `Idle` and make sure the run is
    /// going.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownFragment`] for an id not in the list, and
    /// [`Error::InvalidTransition`] unless the fragment is `Success` or
    /// `Error`.
    pub fn retry(&mut self, id: FragmentId) -> Result<()> {
        let fragment = self
            .fragments
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(Error::UnknownFragment(id))?;

        match fragment.status() {
            FragmentStatus::Success | FragmentStatus::Error => fragment.reset(),
            from => return Err(Error::InvalidTransition { id, from }),
        }
        debug!(fragment = %id, sequence = fragment.sequence_index, "fragment reset for retry");

        self.halted = false;
        self.global_error = None;
        self.running = true;
        self.schedule();
        Ok(())
    }

    /// Discard every result and stop. In-flight requests are aborted.
    pub fn reset_results(&mut self) {
        self.abort_in_flight();
        self.sessions.invalidate();
        for fragment in &mut self.fragments {
            fragment.reset();
        }
        self.stop();
    }

    /// Discard everything: fragments, source, session and flags.
    pub fn clear(&mut self) {
        self.abort_in_flight();
        self.sessions.invalidate();
        self.fragments.clear();
        self.source.clear();
        self.stop();
    }

    /// Replace the source text and re-split it.
    ///
    /// All fragments and their results are discarded and the run stops.
    pub fn load_source(&mut self, text: impl Into<String>) {
        self.source = text.into();
        self.resplit();
    }

    /// Change how the source is split. Re-splits like [`Dispatcher::load_source`].
    pub fn set_split_config(&mut self, config: SplitConfig) {
        self.split_config = config;
        self.resplit();
    }

    /// Change provider settings. The session is dropped if the provider,
    /// credential, model or system prompt changed.
    pub fn set_provider_config(&mut self, config: ProviderConfig) {
        self.sessions.observe_config(&config);
        self.provider = config;
    }

    /// Change run options. Switching contextual mode on or off drops the
    /// session.
    pub fn set_run_options(&mut self, options: RunOptions) {
        if options.is_contextual() != self.options.is_contextual() {
            self.sessions.invalidate();
        }
        self.options = options;
    }

    /// Replace the glossary.
    ///
    /// A live contextual session keeps the instruction it was created with.
    pub fn set_glossary(&mut self, terms: Vec<GlossaryTerm>) {
        self.glossary = terms;
    }

    // ---- event loop ----

    /// Wait for one in-flight request, record it, and schedule more work.
    ///
    /// Returns `None` once nothing is in flight. A task that ends without an
    /// answer, such as one cancelled by the runtime, fails its fragment.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        loop {
            let outcome = match self.tasks.join_next_with_id().await? {
                Ok((task, outcome)) => {
                    self.owners.remove(&task);
                    outcome
                }
                Err(err) => {
                    let Some(id) = self.owners.remove(&err.id()) else {
                        debug!(error = %err, "untracked request task ended");
                        continue;
                    };
                    Outcome {
                        id,
                        result: Err(Error::Dispatch(format!("request task did not finish: {err}"))),
                    }
                }
            };
            if let Some(event) = self.apply(outcome) {
                return Some(event);
            }
        }
    }

    /// Process events until nothing is in flight. Returns how many were
    /// applied.
    pub async fn run_until_idle(&mut self) -> usize {
        let mut applied = 0;
        while self.next_event().await.is_some() {
            applied += 1;
        }
        applied
    }

    // ---- read side ----

    /// All fragments in sequence order.
    #[must_use]
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// One fragment.
    #[must_use]
    pub fn fragment(&self, id: FragmentId) -> Option<&Fragment> {
        self.fragments.iter().find(|f| f.id == id)
    }

    /// Status counts.
    #[must_use]
    pub fn progress(&self) -> Progress {
        let mut progress = Progress {
            total: self.fragments.len(),
            active_requests: self.in_flight.len(),
            ..Progress::default()
        };
        for fragment in &self.fragments {
            match fragment.status() {
                FragmentStatus::Idle | FragmentStatus::Waiting => progress.pending += 1,
                FragmentStatus::Processing => progress.processing += 1,
                FragmentStatus::Success => progress.succeeded += 1,
                FragmentStatus::Error => progress.failed += 1,
            }
        }
        progress
    }

    /// Whether the run is dispatching (or will, as slots free up).
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether a failure has halted the run.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Run-level failure, such as a session that could not be created.
    #[must_use]
    pub fn global_error(&self) -> Option<&str> {
        self.global_error.as_deref()
    }

    /// The live contextual session.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.sessions.current()
    }

    /// Sessions created so far.
    #[must_use]
    pub fn sessions_created(&self) -> usize {
        self.sessions.sessions_created()
    }

    /// Current provider settings.
    #[must_use]
    pub fn provider_config(&self) -> &ProviderConfig {
        &self.provider
    }

    /// Current run options.
    #[must_use]
    pub fn run_options(&self) -> &RunOptions {
        &self.options
    }

    /// Current split settings.
    #[must_use]
    pub fn split_config(&self) -> &SplitConfig {
        &self.split_config
    }

    /// Current glossary.
    #[must_use]
    pub fn glossary(&self) -> &[GlossaryTerm] {
        &self.glossary
    }

    /// Source text the fragments came from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The request `id` would send if dispatched now.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownFragment`] for an id not in the list.
    pub fn preview(&self, id: FragmentId) -> Result<RequestPreview> {
        let fragment = self.fragment(id).ok_or(Error::UnknownFragment(id))?;

        let (mode, turn_depth) = if self.options.is_contextual() {
            let depth = fragment.turn_depth();
            let label = if depth == 0 {
                "contextual (start)"
            } else {
                "contextual (continue)"
            };
            (label, depth)
        } else {
            match self.options.execution {
                ExecutionMode::Serial => ("serial", 0),
                ExecutionMode::Parallel => ("parallel", 0),
            }
        };

        let system_instruction = if self.options.is_contextual() {
            self.session().map_or_else(
                || self.contextual_instruction(),
                |session| session.system_instruction().to_string(),
            )
        } else {
            self.instruction_for(&fragment.content)
        };

        Ok(RequestPreview {
            mode: mode.to_string(),
            model: self.provider.model.clone(),
            system_instruction,
            message: self.user_message(fragment),
            turn_depth,
        })
    }

    // ---- scheduling ----

    fn schedule(&mut self) {
        if !self.running {
            return;
        }

        if self.halted {
            if self.in_flight.is_empty() {
                self.running = false;
                warn!("run halted after a failure");
            }
            return;
        }

        let limit = self.options.limit();
        let active = self.in_flight.len();
        if active >= limit {
            return;
        }

        let session = if self.options.is_contextual() {
            match self.ensure_session() {
                Ok(session) => Some(session),
                Err(err) => {
                    warn!(error = %err, "cannot start contextual run");
                    self.halted = true;
                    self.running = false;
                    self.global_error = Some(err.to_string());
                    return;
                }
            }
        } else {
            None
        };

        let picks = self.candidates(limit - active);
        if picks.is_empty() {
            if active == 0 && self.fragments.iter().all(|f| f.status().is_settled()) {
                self.running = false;
                let progress = self.progress();
                info!(
                    succeeded = progress.succeeded,
                    failed = progress.failed,
                    "run finished"
                );
            }
            return;
        }

        for index in picks {
            self.dispatch(index, session.clone());
        }
    }

    fn ensure_session(&mut self) -> Result<Session> {
        if let Some(session) = self.sessions.current() {
            return Ok(session.clone());
        }
        let instruction = self.contextual_instruction();
        self.sessions
            .ensure(self.client.as_ref(), &self.provider, &instruction)
    }

    /// Indices to dispatch, in sequence order.
    fn candidates(&mut self, slots: usize) -> Vec<usize> {
        match self.options.execution {
            ExecutionMode::Serial => self
                .fragments
                .iter()
                .position(|f| f.status() != FragmentStatus::Success)
                .filter(|&i| self.fragments[i].status() != FragmentStatus::Processing)
                .into_iter()
                .collect(),
            ExecutionMode::Parallel => {
                let has_errors = self.count(FragmentStatus::Error) > 0;
                if self.retrying_errors_only && !has_errors {
                    if !self.in_flight.is_empty() {
                        return vec![];
                    }
                    self.retrying_errors_only = false;
                    debug!("failed fragments recovered, resuming normal order");
                }

                let eligible = |status: FragmentStatus| {
                    if has_errors {
                        status == FragmentStatus::Error
                    } else {
                        status.is_pending()
                    }
                };
                self.fragments
                    .iter()
                    .enumerate()
                    .filter(|(_, f)| eligible(f.status()))
                    .map(|(i, _)| i)
                    .take(slots)
                    .collect()
            }
        }
    }

    fn dispatch(&mut self, index: usize, session: Option<Session>) {
        let fragment = &self.fragments[index];
        let request = CompletionRequest {
            system_instruction: match &session {
                Some(session) => session.system_instruction().to_string(),
                None => self.instruction_for(&fragment.content),
            },
            message: self.user_message(fragment),
        };

        let fragment = &mut self.fragments[index];
        fragment.mark_processing();
        let id = fragment.id;
        self.in_flight.insert(id);
        debug!(
            fragment = %id,
            sequence = fragment.sequence_index,
            active = self.in_flight.len(),
            limit = self.options.limit(),
            session = ?session.as_ref().map(Session::id),
            "dispatching fragment"
        );

        let client = Arc::clone(&self.client);
        let config = self.provider.clone();
        let handle = self.tasks.spawn(async move {
            let call = client.send(&request, &config, session.as_ref());
            let result = AssertUnwindSafe(call)
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(Error::Dispatch(panic_message(&*panic))));
            Outcome { id, result }
        });
        self.owners.insert(handle.id(), id);
    }

    fn apply(&mut self, outcome: Outcome) -> Option<RunEvent> {
        let Outcome { id, result } = outcome;
        if !self.in_flight.remove(&id) {
            debug!(fragment = %id, "dropping result for a fragment no longer tracked");
            return None;
        }
        let fragment = self.fragments.iter_mut().find(|f| f.id == id)?;
        let sequence_index = fragment.sequence_index;

        let event = match result {
            Ok(text) => {
                fragment.succeed(text);
                info!(fragment = %id, sequence = sequence_index, "fragment completed");
                RunEvent::Completed { id, sequence_index }
            }
            Err(err) => {
                let message = err.to_string();
                fragment.fail(message.clone());
                self.halted = true;
                warn!(fragment = %id, sequence = sequence_index, error = %message, "fragment failed");
                RunEvent::Failed {
                    id,
                    sequence_index,
                    message,
                }
            }
        };

        self.schedule();
        Some(event)
    }

    fn resplit(&mut self) {
        self.abort_in_flight();
        self.sessions.invalidate();
        self.fragments = split(&self.source, &self.split_config);
        self.stop();
        debug!(fragments = self.fragments.len(), "source split");
    }

    fn abort_in_flight(&mut self) {
        if !self.in_flight.is_empty() {
            debug!(active = self.in_flight.len(), "aborting in-flight requests");
        }
        // Dropping a JoinSet aborts every task in it.
        self.tasks = JoinSet::new();
        self.owners.clear();
        self.in_flight.clear();
    }

    fn stop(&mut self) {
        self.running = false;
        self.halted = false;
        self.retrying_errors_only = false;
        self.global_error = None;
    }

    fn count(&self, status: FragmentStatus) -> usize {
        self.fragments.iter().filter(|f| f.status() == status).count()
    }

    // ---- message construction ----

    fn user_message(&self, fragment: &Fragment) -> String {
        let applies = match self.options.prompt_mode {
            PromptMode::Every => true,
            PromptMode::First => fragment.sequence_index == 1,
        };
        let pre_prompt = self.options.pre_prompt.trim();

        if applies && !pre_prompt.is_empty() {
            format!("{pre_prompt}\n\n{}", fragment.content)
        } else {
            fragment.content.clone()
        }
    }

    /// Base prompt plus the glossary block for terms found in `content`.
    fn instruction_for(&self, content: &str) -> String {
        let base = self.provider.system_prompt.trim();
        if !self.options.glossary_enabled {
            return base.to_string();
        }

        let matched = self.matcher.find_matches(content, &self.glossary);
        let block = self
            .matcher
            .format_instruction(&matched, &self.options.glossary_template);

        match (base.is_empty(), block.is_empty()) {
            (_, true) => base.to_string(),
            (true, false) => block,
            (false, false) => format!("{base}\n\n{block}"),
        }
    }

    /// Instruction for a new session: glossary terms from every fragment.
    fn contextual_instruction(&self) -> String {
        let all = self
            .fragments
            .iter()
            .map(|f| f.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        self.instruction_for(&all)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("provider", &self.provider)
            .field("options", &self.options)
            .field("fragments", &self.fragments.len())
            .field("in_flight", &self.in_flight.len())
            .field("running", &self.running)
            .field("halted", &self.halted)
            .field("retrying_errors_only", &self.retrying_errors_only)
            .field("global_error", &self.global_error)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    match detail {
        Some(detail) => format!("provider call panicked: {detail}"),
        None => "provider call panicked".to_string(),
    }
}
