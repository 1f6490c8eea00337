//! Error types for chunkflow.

use crate::fragment::{FragmentId, FragmentStatus};
use crate::provider::ProviderKind;

/// Errors that can occur while splitting, configuring, or dispatching.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A custom split rule could not be compiled.
    ///
    /// [`split`](crate::split) never returns this; it falls back to a single
    /// fragment. It is surfaced by [`MarkerSplitter::try_new`](crate::MarkerSplitter::try_new).
    #[error("invalid split rule: {0}")]
    SplitConfiguration(String),

    /// A conversation session could not be created.
    #[error("session initialization failed: {0}")]
    SessionInit(String),

    /// A provider call for a single fragment failed.
    #[error("{0}")]
    Dispatch(String),

    /// The provider answered, but not with anything usable.
    #[error("invalid response from provider: {0}")]
    InvalidResponse(String),

    /// No client is registered for the configured provider.
    #[error("no client registered for provider '{0}'")]
    UnsupportedProvider(ProviderKind),

    /// A fragment id that is not in the current fragment list.
    #[error("unknown fragment: {0}")]
    UnknownFragment(FragmentId),

    /// An operation that the fragment's current status does not allow.
    #[error("fragment {id} cannot be retried while {from}")]
    InvalidTransition {
        /// The fragment.
        id: FragmentId,
        /// Its status at the time of the call.
        from: FragmentStatus,
    },

    /// Transport failure talking to a provider.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encoding or decoding failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Settings file could not be parsed.
    #[error("settings parse error: {0}")]
    SettingsParse(#[from] toml::de::Error),

    /// Settings could not be serialized.
    #[error("settings serialize error: {0}")]
    SettingsSerialize(#[from] toml::ser::Error),

    /// Filesystem error reading or writing settings.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for chunkflow operations.
pub type Result<T> = std::result::Result<T, Error>;
