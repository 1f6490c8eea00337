//! Glossary terms and instruction formatting.
//!
//! A glossary pins the model to fixed translations or definitions. Only the
//! terms that actually occur in a fragment are sent with it, which keeps
//! prompts short even with a glossary of thousands of entries.
//!
//! ## Matching
//!
//! Matching is case-insensitive. A term that starts (or ends) with a letter
//! or digit must start (or end) on a word boundary, so `cat` does not match
//! inside `concatenate`. Terms made of CJK or Thai characters, or
//! punctuation, match anywhere, since those scripts have no spaces to anchor
//! on.

use serde::{Deserialize, Serialize};

/// Default header placed above matched terms. `{terms}` is replaced by the
/// bullet list.
pub const DEFAULT_GLOSSARY_TEMPLATE: &str = "### Terminology / Glossary\n\
Please strictly use the following definitions for these terms if they appear in the text:\n\
{terms}";

/// One glossary entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryTerm {
    /// The term as written by the user.
    pub term: String,
    /// What the model should use for it.
    pub definition: String,
}

impl GlossaryTerm {
    /// Create a term.
    #[must_use]
    pub fn new(term: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            definition: definition.into(),
        }
    }

    /// Deduplication key: lowercase, whitespace runs collapsed, trimmed.
    #[must_use]
    pub fn key(&self) -> String {
        self.term
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

/// Finds glossary terms in fragment text and formats them for the prompt.
///
/// Implementations must be pure: the dispatcher calls them once per request
/// and again for previews, and expects the same answer.
pub trait GlossaryMatcher: Send + Sync {
    /// Terms from `terms` that occur in `content`, in glossary order.
    fn find_matches<'t>(&self, content: &str, terms: &'t [GlossaryTerm]) -> Vec<&'t GlossaryTerm>;

    /// Render matched terms with `template`. Empty when nothing matched.
    fn format_instruction(&self, matched: &[&GlossaryTerm], template: &str) -> String {
        if matched.is_empty() {
            return String::new();
        }

        let lines = matched
            .iter()
            .map(|t| format!("- {}: {}", t.term.trim(), t.definition.trim()))
            .collect::<Vec<_>>()
            .join("\n");

        if template.contains("{terms}") {
            template.replace("{terms}", &lines)
        } else {
            format!("{template}\n{lines}")
        }
    }
}

/// Default matcher: case-insensitive, word-boundary aware.
///
/// ```rust
/// use chunkflow::{GlossaryMatcher, GlossaryTerm, TermMatcher};
///
/// let terms = vec![
///     GlossaryTerm::new("cat", "feline"),
///     GlossaryTerm::new("Dog", "canine"),
/// ];
/// let matched = TermMatcher.find_matches("A DOG chased the concatenation.", &terms);
///
/// assert_eq!(matched.len(), 1);
/// assert_eq!(matched[0].term, "Dog");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TermMatcher;

impl GlossaryMatcher for TermMatcher {
    fn find_matches<'t>(&self, content: &str, terms: &'t [GlossaryTerm]) -> Vec<&'t GlossaryTerm> {
        if content.is_empty() || terms.is_empty() {
            return vec![];
        }

        let haystack = content.to_lowercase();
        terms
            .iter()
            .filter(|t| {
                let needle = t.term.trim().to_lowercase();
                !needle.is_empty() && contains_term(&haystack, &needle)
            })
            .collect()
    }
}

fn contains_term(haystack: &str, needle: &str) -> bool {
    let anchor_start = needle.chars().next().is_some_and(is_word_char);
    let anchor_end = needle.chars().next_back().is_some_and(is_word_char);

    haystack.match_indices(needle).any(|(start, found)| {
        let end = start + found.len();
        let before_ok = !anchor_start
            || haystack[..start]
                .chars()
                .next_back()
                .map_or(true, |c| !is_word_char(c));
        let after_ok = !anchor_end
            || haystack[end..]
                .chars()
                .next()
                .map_or(true, |c| !is_word_char(c));
        before_ok && after_ok
    })
}

/// Letters and digits of scripts that separate words with spaces.
fn is_word_char(c: char) -> bool {
    const UNSPACED: &[(char, char)] = &[
        ('\u{0E00}', '\u{0EFF}'), // Thai, Lao
        ('\u{3040}', '\u{30FF}'), // Hiragana, Katakana
        ('\u{3400}', '\u{4DBF}'), // CJK extension A
        ('\u{4E00}', '\u{9FFF}'), // CJK unified
        ('\u{F900}', '\u{FAFF}'), // CJK compatibility
    ];
    c.is_alphanumeric() && !UNSPACED.iter().any(|&(lo, hi)| (lo..=hi).contains(&c))
}

/// Remove entries whose [`GlossaryTerm::key`] repeats an earlier one, and
/// entries with a blank term.
///
/// ```rust
/// use chunkflow::{dedupe, GlossaryTerm};
///
/// let terms = dedupe(vec![
///     GlossaryTerm::new("Machine  Learning", "ML"),
///     GlossaryTerm::new("machine learning", "duplicate"),
/// ]);
/// assert_eq!(terms.len(), 1);
/// assert_eq!(terms[0].definition, "ML");
/// ```
#[must_use]
pub fn dedupe(terms: Vec<GlossaryTerm>) -> Vec<GlossaryTerm> {
    let mut seen = std::collections::HashSet::new();
    terms
        .into_iter()
        .filter(|t| {
            let key = t.key();
            !key.is_empty() && seen.insert(key)
        })
        .collect()
}

/// Parse a bulk import: one `term<sep>definition` per line.
///
/// The separator is tried in order: tab, colon, then comma (commas inside
/// double quotes do not count). Surrounding quotes are stripped. Lines
/// without both a term and a definition are skipped.
///
/// ```rust
/// use chunkflow::parse_bulk;
///
/// let terms = parse_bulk("API\tinterface\nLLM: language model\n\"a, b\",\"x, y\"\nnonsense");
///
/// assert_eq!(terms.len(), 3);
/// assert_eq!(terms[1].definition, "language model");
/// assert_eq!(terms[2].term, "a, b");
/// assert_eq!(terms[2].definition, "x, y");
/// ```
#[must_use]
pub fn parse_bulk(input: &str) -> Vec<GlossaryTerm> {
    input
        .lines()
        .filter_map(|line| {
            let (term, definition) = line
                .split_once('\t')
                .or_else(|| line.split_once(':'))
                .or_else(|| split_unquoted_comma(line))?;

            let term = unquote(term.trim());
            let definition = unquote(definition.trim());
            (!term.is_empty() && !definition.is_empty())
                .then(|| GlossaryTerm::new(term, definition))
        })
        .collect()
}

fn split_unquoted_comma(line: &str) -> Option<(&str, &str)> {
    let mut in_quotes = false;
    for (offset, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => return Some((&line[..offset], &line[offset + 1..])),
            _ => {}
        }
    }
    None
}

fn unquote(field: &str) -> &str {
    let field = field.strip_prefix('"').unwrap_or(field);
    field.strip_suffix('"').unwrap_or(field)
}
