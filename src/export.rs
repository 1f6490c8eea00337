//! Merge finished fragments into a single document.
//!
//! ```text
//! ### Source (1)
//!
//! <fragment 1 content>
//!
//! ### Response (1)
//!
//! <fragment 1 result>
//!
//! ---
//!
//! ### Source (2)
//! ...
//! ```
//!
//! Only `Success` fragments are included. The prefixes and separator are
//! typed by users into single-line fields, so the escapes `\n`, `\t` and
//! `\\` are decoded before use.

use serde::{Deserialize, Serialize};

use crate::{Fragment, FragmentStatus};

/// Layout of a merged export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Line above each source. `{index}` becomes the sequence index.
    pub request_prefix: String,
    /// Line above each result. `{index}` becomes the sequence index.
    pub response_prefix: String,
    /// Text between pairs.
    pub pair_separator: String,
    /// Include the source text, not just the results.
    pub include_source: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            request_prefix: "### Source ({index})".to_string(),
            response_prefix: "### Response ({index})".to_string(),
            pair_separator: r"\n\n---\n\n".to_string(),
            include_source: true,
        }
    }
}

impl MergeConfig {
    /// Bare results separated by rules, without sources or headings.
    #[must_use]
    pub fn results_only() -> Self {
        Self {
            response_prefix: String::new(),
            include_source: false,
            ..Self::default()
        }
    }
}

/// Join every `Success` fragment, in sequence order, per `config`.
///
/// ```rust
/// use chunkflow::{merge_results, Fragment, MergeConfig};
///
/// // Fragments straight from `split` have no results yet.
/// let fragments = vec![Fragment::new("hola", 1)];
/// assert_eq!(merge_results(&fragments, &MergeConfig::default()), "");
/// ```
#[must_use]
pub fn merge_results(fragments: &[Fragment], config: &MergeConfig) -> String {
    let request_prefix = decode_escapes(&config.request_prefix);
    let response_prefix = decode_escapes(&config.response_prefix);
    let separator = decode_escapes(&config.pair_separator);

    let mut done: Vec<&Fragment> = fragments
        .iter()
        .filter(|f| f.status() == FragmentStatus::Success)
        .collect();
    done.sort_by_key(|f| f.sequence_index);

    done.iter()
        .map(|fragment| {
            let index = fragment.sequence_index.to_string();
            let mut blocks = Vec::with_capacity(4);
            if config.include_source {
                push_nonempty(&mut blocks, request_prefix.replace("{index}", &index));
                blocks.push(fragment.content.clone());
            }
            push_nonempty(&mut blocks, response_prefix.replace("{index}", &index));
            blocks.push(fragment.result().unwrap_or_default().to_string());
            blocks.join("\n\n")
        })
        .collect::<Vec<_>>()
        .join(&separator)
}

fn push_nonempty(blocks: &mut Vec<String>, block: String) {
    if !block.trim().is_empty() {
        blocks.push(block);
    }
}

/// Decode `\n`, `\t` and `\\`. Other backslashes are kept as typed.
fn decode_escapes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.peek() {
            Some('n') => {
                out.push('\n');
                chars.next();
            }
            Some('t') => {
                out.push('\t');
                chars.next();
            }
            Some('\\') => {
                out.push('\\');
                chars.next();
            }
            _ => out.push('\\'),
        }
    }

    out
}
