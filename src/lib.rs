//! # chunkflow
//!
//! Split a long text into ordered fragments and run each one through a
//! language model, serially (optionally as one ongoing conversation) or with
//! bounded parallelism.
//!
//! ## The Problem
//!
//! A book chapter, a transcript, or a log dump does not fit in one request.
//! Splitting it is the easy half. The hard half is running hundreds of
//! requests without losing track:
//!
//! - A request fails halfway through the document. Which fragments are done?
//! - The user pauses. What happens to requests already on the wire?
//! - Fragment 7 needs what the model said about fragment 6.
//! - The provider allows three concurrent requests, not thirty.
//!
//! chunkflow answers these with two pieces: a pure [`split`] function and a
//! [`Dispatcher`] that owns every fragment's state.
//!
//! ## Splitting Strategies
//!
//! ### Character
//!
//! Fixed windows of N characters. If a newline falls in the last 20% of the
//! window, the cut moves back to just after it:
//!
//! ```text
//! chunk_size = 20
//!
//! "A first line, yes\nand then more text"
//!                   ^ newline at 17 > 0.8 * 20, cut just after it
//!
//! Piece 0: "A first line, yes\n"
//! Piece 1: "and then more text"
//! ```
//!
//! ### Line
//!
//! Drop blank lines, then group N lines per piece.
//!
//! ### Custom
//!
//! - **Heading**: split before every `##` heading (exact depth; `###` does
//!   not count at level 2).
//! - **Marker**: split on plain text with `*` / `?` wildcards, or on a
//!   regex literal written `/pattern/flags`.
//!
//! After splitting, blank pieces are dropped and `batch_size` adjacent pieces
//! are merged into one fragment.
//!
//! ## Quick Start
//!
//! ```rust
//! use chunkflow::{split, FragmentStatus, SplitConfig};
//!
//! let fragments = split("AAAA\nBBBB\nCCCC", &SplitConfig::lines(1));
//!
//! assert_eq!(fragments.len(), 3);
//! assert_eq!(fragments[1].content, "BBBB");
//! assert_eq!(fragments[1].sequence_index, 2);
//! assert!(fragments.iter().all(|f| f.status() == FragmentStatus::Idle));
//! ```
//!
//! ## Dispatching
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chunkflow::{Dispatcher, ProviderConfig, ProviderRouter, RunOptions, SplitConfig};
//!
//! # async fn run() {
//! let client = Arc::new(ProviderRouter::with_defaults());
//! let mut dispatcher = Dispatcher::new(client, ProviderConfig::default(), RunOptions::parallel(3));
//! dispatcher.set_split_config(SplitConfig::characters(4000));
//! dispatcher.load_source("...a long document...");
//!
//! dispatcher.start();
//! dispatcher.run_until_idle().await;
//!
//! for fragment in dispatcher.fragments() {
//!     println!("{}: {:?}", fragment.sequence_index, fragment.result());
//! }
//! # }
//! ```
//!
//! A failure halts the run: in-flight requests finish, nothing new starts.
//! Calling [`Dispatcher::start`] again retries the failed fragments first.
//!
//! ## Execution Modes
//!
//! | Mode | In flight | Session | System instruction |
//! |------|-----------|---------|--------------------|
//! | Serial | 1 | none | per request |
//! | Serial + contextual | 1 | one conversation | once, at session start |
//! | Parallel | up to limit | none | per request |

mod character;
mod dispatch;
mod error;
mod export;
mod fragment;
mod glossary;
mod line;
mod marker;
mod provider;
mod session;
mod settings;
mod split_config;
mod splitter;

use std::borrow::Cow;

pub use character::CharacterSplitter;
pub use dispatch::{
    Dispatcher, ExecutionMode, Progress, PromptMode, RequestPreview, RunEvent, RunOptions,
};
pub use error::{Error, Result};
pub use export::{merge_results, MergeConfig};
pub use fragment::{Fragment, FragmentId, FragmentStatus};
pub use glossary::{
    dedupe, parse_bulk, GlossaryMatcher, GlossaryTerm, TermMatcher, DEFAULT_GLOSSARY_TEMPLATE,
};
pub use line::LineSplitter;
pub use marker::MarkerSplitter;
pub use provider::{
    CompletionRequest, GeminiClient, LlmClient, OpenAiClient, ProviderConfig, ProviderKind,
    ProviderRouter,
};
pub use session::{PendingTurn, Role, Session, SessionKey, SessionManager, Turn};
pub use settings::Settings;
pub use split_config::{CustomRule, SplitConfig, SplitMode};
pub use splitter::{batch, split};

/// A text splitting strategy.
///
/// Strategies only cut; they never trim, filter, or batch. That happens once,
/// in [`batch`], so every strategy gets identical cleanup:
///
/// ```rust
/// use chunkflow::{batch, LineSplitter, Splitter};
///
/// fn fragments_from(splitter: &dyn Splitter, text: &str) -> usize {
///     batch(splitter.pieces(text), 1).len()
/// }
///
/// let text = "one\n\n\ntwo\nthree";
/// assert_eq!(fragments_from(&LineSplitter::new(1), text), 3);
/// ```
pub trait Splitter: Send + Sync {
    /// Cut text into raw pieces, in source order.
    ///
    /// Pieces may be blank or carry surrounding whitespace.
    fn pieces<'a>(&self, text: &'a str) -> Vec<Cow<'a, str>>;
}
