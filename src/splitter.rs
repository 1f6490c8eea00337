//! The split entry point: strategy selection, cleanup, and batching.

use std::borrow::Cow;

use tracing::warn;

use crate::split_config::{DEFAULT_CHUNK_SIZE, DEFAULT_HEADING_LEVEL, DEFAULT_LINE_COUNT};
use crate::{
    CharacterSplitter, CustomRule, Fragment, LineSplitter, MarkerSplitter, SplitConfig, SplitMode,
    Splitter,
};

/// Split `text` into idle fragments according to `config`.
///
/// Never fails. A custom rule that does not compile is logged and the whole
/// text becomes a single fragment. Zero sizes fall back to the defaults and
/// heading levels are clamped to 1-6.
///
/// ```rust
/// use chunkflow::{split, CustomRule, SplitConfig};
///
/// let config = SplitConfig::custom(CustomRule::Heading { level: 2 });
/// let fragments = split("# A\n## B\ntext\n### C", &config);
///
/// assert_eq!(fragments.len(), 2);
/// assert!(fragments[1].content.starts_with("## B"));
/// ```
#[must_use]
pub fn split(text: &str, config: &SplitConfig) -> Vec<Fragment> {
    if text.is_empty() {
        return vec![];
    }

    let pieces = match &config.mode {
        SplitMode::Character { chunk_size } => {
            CharacterSplitter::new(nonzero_or(*chunk_size, DEFAULT_CHUNK_SIZE)).pieces(text)
        }
        SplitMode::Line { line_count } => {
            LineSplitter::new(nonzero_or(*line_count, DEFAULT_LINE_COUNT)).pieces(text)
        }
        SplitMode::Custom(rule) => custom_pieces(text, rule),
    };

    batch(pieces, config.batch_size())
}

fn custom_pieces<'a>(text: &'a str, rule: &CustomRule) -> Vec<Cow<'a, str>> {
    let splitter = match rule {
        CustomRule::Heading { level } => {
            let level = if *level == 0 {
                DEFAULT_HEADING_LEVEL
            } else {
                (*level).min(6)
            };
            Ok(MarkerSplitter::heading(level))
        }
        CustomRule::Text { .. } => MarkerSplitter::from_rule(rule),
    };

    match splitter {
        Ok(splitter) => splitter.pieces(text),
        Err(err) => {
            warn!(error = %err, "custom split rule rejected, keeping text as one fragment");
            vec![Cow::Borrowed(text)]
        }
    }
}

const fn nonzero_or(value: usize, fallback: usize) -> usize {
    if value == 0 {
        fallback
    } else {
        value
    }
}

/// Drop blank pieces, merge `batch_size` neighbours, and number the result.
///
/// Each piece is trimmed before merging and pieces inside a batch are joined
/// by a blank line:
///
/// ```text
/// pieces = ["  a\n", "\n\n", "b ", "c"], batch_size = 2
///
/// cleaned: ["a", "b", "c"]
/// Fragment 1: "a\n\nb"
/// Fragment 2: "c"
/// ```
///
/// ```rust
/// use std::borrow::Cow;
/// use chunkflow::batch;
///
/// let pieces = vec![Cow::from("  a\n"), Cow::from("\n\n"), Cow::from("b "), Cow::from("c")];
/// let fragments = batch(pieces, 2);
///
/// assert_eq!(fragments[0].content, "a\n\nb");
/// assert_eq!(fragments[1].content, "c");
/// assert_eq!(fragments[1].sequence_index, 2);
/// ```
#[must_use]
pub fn batch(pieces: Vec<Cow<'_, str>>, batch_size: usize) -> Vec<Fragment> {
    let cleaned: Vec<&str> = pieces
        .iter()
        .map(|piece| piece.trim())
        .filter(|piece| !piece.is_empty())
        .collect();

    cleaned
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(index, group)| Fragment::new(group.join("\n\n"), index + 1))
        .collect()
}
