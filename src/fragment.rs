//! The Fragment type: one unit of source text sent to the model.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, stable identifier for a fragment.
///
/// Assigned once at split time. Two splits of the same text produce
/// fragments with equal content but different ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FragmentId(Uuid);

impl FragmentId {
    /// Generate a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FragmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell fragments apart in logs.
        let s = self.0.simple().to_string();
        f.write_str(&s[..8])
    }
}

/// Processing state of a fragment.
///
/// ```text
/// Idle ----dispatch---> Processing --ok---> Success
/// Waiting -dispatch---> Processing --err--> Error
/// Error ---retry------> Idle
/// Error ---dispatch---> Processing          (bulk retry on resume)
/// ```
///
/// `Waiting` is reserved for "queued, not yet eligible" and is treated
/// exactly like `Idle` when choosing what to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentStatus {
    /// Not yet sent.
    #[default]
    Idle,
    /// Queued but not yet eligible.
    Waiting,
    /// A provider call is in flight.
    Processing,
    /// The provider returned a result.
    Success,
    /// The provider call failed.
    Error,
}

impl FragmentStatus {
    /// Whether a fresh dispatch may pick this fragment up.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Idle | Self::Waiting)
    }

    /// `Success` or `Error`.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

impl fmt::Display for FragmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Waiting => "waiting",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Error => "error",
        })
    }
}

/// A fragment of the source text and its processing state.
///
/// ## Sequence Index
///
/// `sequence_index` is 1-based and never changes. It drives "first fragment"
/// prompt rules and tells how deep into a contextual conversation a fragment
/// sits:
///
/// ```rust
/// use chunkflow::Fragment;
///
/// let fragment = Fragment::new("Chapter three.", 3);
/// assert_eq!(fragment.turn_depth(), 2); // two earlier exchanges
/// ```
///
/// Only the dispatcher mutates `status`, `result` and `error_message`; the
/// setters below keep the "result iff Success, error iff Error" invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// Stable identifier.
    pub id: FragmentId,
    /// 1-based position in split order.
    pub sequence_index: usize,
    /// The text payload.
    pub content: String,
    status: FragmentStatus,
    result: Option<String>,
    error_message: Option<String>,
}

impl Fragment {
    /// Create an idle fragment with a fresh id.
    #[must_use]
    pub fn new(content: impl Into<String>, sequence_index: usize) -> Self {
        Self {
            id: FragmentId::new(),
            sequence_index,
            content: content.into(),
            status: FragmentStatus::Idle,
            result: None,
            error_message: None,
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> FragmentStatus {
        self.status
    }

    /// Generated text, present only on `Success`.
    #[must_use]
    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    /// Failure reason, present only on `Error`.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Number of prior exchanges in a contextual conversation.
    #[must_use]
    pub fn turn_depth(&self) -> usize {
        self.sequence_index.saturating_sub(1)
    }

    /// Length of the content in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Whether the content is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub(crate) fn mark_processing(&mut self) {
        self.status = FragmentStatus::Processing;
        self.result = None;
        self.error_message = None;
    }

    pub(crate) fn succeed(&mut self, result: String) {
        self.status = FragmentStatus::Success;
        self.result = Some(result);
        self.error_message = None;
    }

    pub(crate) fn fail(&mut self, message: String) {
        self.status = FragmentStatus::Error;
        self.result = None;
        self.error_message = Some(message);
    }

    pub(crate) fn reset(&mut self) {
        self.status = FragmentStatus::Idle;
        self.result = None;
        self.error_message = None;
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Fragment {{ seq: {}, id: {}, status: {}, len: {} }}",
            self.sequence_index,
            self.id,
            self.status,
            self.len()
        )
    }
}
