//! Marker, regex, and heading splitting.
//!
//! All custom rules reduce to one operation: find successive
//! non-overlapping matches of a regex, left to right, and cut at each one.
//! Wildcard markers and headings compile to a plain [`regex::Regex`].
//! Regex literals are written by users who expect look-around and
//! backreferences, so they compile with [`fancy_regex`].
//!
//! ## Rule Forms
//!
//! ```text
//! Heading, level 2     ->  (?m)^#{2}(?:[^#]|$)     "###" lines do not match
//! "Chapter *:"         ->  Chapter [\s\S]*?:       * = any run, lazy, spans lines
//! "Part ?"             ->  Part [\s\S]             ? = exactly one character
//! "a\*b"               ->  a\*b                    escaped wildcard is literal
//! "/^---$/m"           ->  (?m)^---$               regex literal, flags mapped
//! "/(?=Chapter)/"      ->  (?=Chapter)             look-ahead, zero-width cut
//! ```
//!
//! ## Keeping or Dropping the Marker
//!
//! ```text
//! text = "intro ### one ### two", marker = "###"
//!
//! keep:    ["intro ", "### one ", "### two"]
//! discard: ["intro ", " one ", " two"]
//! ```
//!
//! Headings always keep their marker: a section without its title loses
//! the very thing that made it a section.
//!
//! ## Regex Literals
//!
//! A separator starting with `/` and containing a later unescaped `/`
//! (outside a character class) is a regex literal. The flags `i`, `m`, `s`
//! and `x` become inline flags; `g`, `y`, `u`, `v` and `d` are accepted and have no
//! effect, since matching is always global and never sticky. Anything else
//! is a configuration error.

use std::borrow::Cow;

use regex::Regex;
use tracing::warn;

use crate::{CustomRule, Error, Result, Splitter};

#[derive(Debug, Clone)]
enum Pattern {
    Plain(Regex),
    Literal(fancy_regex::Regex),
}

impl Pattern {
    fn as_str(&self) -> &str {
        match self {
            Self::Plain(regex) => regex.as_str(),
            Self::Literal(regex) => regex.as_str(),
        }
    }

    /// Byte ranges of successive non-overlapping matches.
    ///
    /// Both engines step past empty matches, so a zero-width pattern still
    /// terminates.
    fn match_ranges(&self, text: &str) -> Vec<(usize, usize)> {
        match self {
            Self::Plain(regex) => regex
                .find_iter(text)
                .map(|found| (found.start(), found.end()))
                .collect(),
            Self::Literal(regex) => {
                let mut ranges = Vec::new();
                for found in regex.find_iter(text) {
                    match found {
                        Ok(found) => ranges.push((found.start(), found.end())),
                        Err(err) => {
                            // Backtrack limit hit: keep what was cut so far.
                            warn!(error = %err, pattern = regex.as_str(), "regex matching stopped early");
                            break;
                        }
                    }
                }
                ranges
            }
        }
    }
}

/// Splitter driven by a compiled marker pattern.
///
/// ## Example
///
/// ```rust
/// use chunkflow::{MarkerSplitter, Splitter};
///
/// let splitter = MarkerSplitter::try_new("Part*", true).unwrap();
/// let pieces = splitter.pieces("Part One\nbody\nPart Two\nbody2");
///
/// let kept: Vec<_> = pieces.iter().filter(|p| !p.trim().is_empty()).collect();
/// assert_eq!(kept.len(), 2);
/// assert!(kept.iter().all(|p| p.starts_with("Part ")));
/// ```
#[derive(Debug, Clone)]
pub struct MarkerSplitter {
    pattern: Pattern,
    keep_separator: bool,
}

impl MarkerSplitter {
    /// Split before every heading of exactly `level` `#` characters.
    ///
    /// # Panics
    ///
    /// Panics if `level` is not in `1..=6`.
    #[must_use]
    pub fn heading(level: u8) -> Self {
        assert!((1..=6).contains(&level), "heading level must be 1-6");
        let pattern = format!("(?m)^#{{{level}}}(?:[^#]|$)");
        Self {
            pattern: Pattern::Plain(
                Regex::new(&pattern).expect("heading pattern is always valid"),
            ),
            keep_separator: true,
        }
    }

    /// Compile a text rule: a regex literal or a wildcard marker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SplitConfiguration`] if the separator is empty, uses
    /// an unsupported regex flag, or does not compile.
    pub fn try_new(separator: &str, keep_separator: bool) -> Result<Self> {
        if separator.is_empty() {
            return Err(Error::SplitConfiguration("separator is empty".into()));
        }

        let rejected = |err: &dyn std::fmt::Display| {
            Error::SplitConfiguration(format!("{separator}: {err}"))
        };

        let pattern = match parse_regex_literal(separator) {
            Some((body, flags)) => {
                let source = format!("{}{body}", inline_flags(flags)?);
                Pattern::Literal(fancy_regex::Regex::new(&source).map_err(|err| rejected(&err))?)
            }
            None => Pattern::Plain(
                Regex::new(&wildcard_pattern(separator)).map_err(|err| rejected(&err))?,
            ),
        };

        Ok(Self {
            pattern,
            keep_separator,
        })
    }

    /// Build the splitter for a [`CustomRule`].
    ///
    /// # Errors
    ///
    /// Same as [`MarkerSplitter::try_new`], plus an out-of-range heading level.
    pub fn from_rule(rule: &CustomRule) -> Result<Self> {
        match rule {
            CustomRule::Heading { level } if (1..=6).contains(level) => Ok(Self::heading(*level)),
            CustomRule::Heading { level } => Err(Error::SplitConfiguration(format!(
                "heading level {level} is outside 1-6"
            ))),
            CustomRule::Text {
                separator,
                keep_separator,
            } => Self::try_new(separator, *keep_separator),
        }
    }

    /// The compiled pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Whether matched markers start the next piece.
    #[must_use]
    pub fn keeps_separator(&self) -> bool {
        self.keep_separator
    }
}

impl Splitter for MarkerSplitter {
    fn pieces<'a>(&self, text: &'a str) -> Vec<Cow<'a, str>> {
        let mut pieces = Vec::new();
        let mut cursor = 0;

        for (start, end) in self.pattern.match_ranges(text) {
            pieces.push(Cow::Borrowed(&text[cursor..start]));
            cursor = if self.keep_separator { start } else { end };
        }

        pieces.push(Cow::Borrowed(&text[cursor..]));
        pieces
    }
}

/// Split `/body/flags` into its parts, or `None` if `input` is not a literal.
fn parse_regex_literal(input: &str) -> Option<(&str, &str)> {
    let rest = input.strip_prefix('/')?;

    let mut escaped = false;
    let mut in_class = false;
    for (offset, ch) in rest.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => {
                if offset == 0 {
                    return None;
                }
                return Some((&rest[..offset], &rest[offset + 1..]));
            }
            _ => {}
        }
    }

    None
}

fn inline_flags(flags: &str) -> Result<String> {
    let mut inline = String::new();
    for flag in flags.chars() {
        match flag {
            'i' | 'm' | 's' | 'x' => {
                if !inline.contains(flag) {
                    inline.push(flag);
                }
            }
            'g' | 'y' | 'u' | 'v' | 'd' => {}
            other => {
                return Err(Error::SplitConfiguration(format!(
                    "unsupported regex flag '{other}'"
                )))
            }
        }
    }

    if inline.is_empty() {
        Ok(inline)
    } else {
        Ok(format!("(?{inline})"))
    }
}

/// Translate a wildcard marker into a regex.
fn wildcard_pattern(marker: &str) -> String {
    let mut out = String::with_capacity(marker.len() * 2);
    let mut chars = marker.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some(next) => out.push_str(&regex::escape(next.encode_utf8(&mut [0; 4]))),
                None => out.push_str(r"\\"),
            },
            '*' => out.push_str(r"[\s\S]*?"),
            '?' => out.push_str(r"[\s\S]"),
            _ => out.push_str(&regex::escape(ch.encode_utf8(&mut [0; 4]))),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn non_blank<'a>(pieces: &'a [Cow<'a, str>]) -> Vec<&'a str> {
        pieces
            .iter()
            .map(|p| &**p)
            .filter(|p| !p.trim().is_empty())
            .collect()
    }

    #[test]
    fn test_heading_exact_depth() {
        let splitter = MarkerSplitter::heading(2);
        let pieces = splitter.pieces("# A\n## B\ntext\n### C");

        assert_eq!(non_blank(&pieces), vec!["# A\n", "## B\ntext\n### C"]);
    }

    #[test]
    fn test_heading_at_end_of_text() {
        let splitter = MarkerSplitter::heading(1);
        let pieces = splitter.pieces("intro\n#");
        assert_eq!(non_blank(&pieces), vec!["intro\n", "#"]);
    }

    #[test]
    fn test_keep_marker() {
        let splitter = MarkerSplitter::try_new("###", true).unwrap();
        let pieces = splitter.pieces("intro ### one ### two");
        assert_eq!(pieces, vec!["intro ", "### one ", "### two"]);
    }

    #[test]
    fn test_discard_marker() {
        let splitter = MarkerSplitter::try_new("###", false).unwrap();
        let pieces = splitter.pieces("intro ### one ### two");
        assert_eq!(pieces, vec!["intro ", " one ", " two"]);
    }

    #[test]
    fn test_star_spans_lines_lazily() {
        let splitter = MarkerSplitter::try_new("<*>", false).unwrap();
        let pieces = splitter.pieces("a<x\ny>b<z>c");
        assert_eq!(pieces, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_question_mark_matches_one_character() {
        let splitter = MarkerSplitter::try_new("Part ?", true).unwrap();
        let pieces = splitter.pieces("Part A text Part B more");
        assert_eq!(non_blank(&pieces), vec!["Part A text ", "Part B more"]);
    }

    #[test]
    fn test_escaped_wildcards_are_literal() {
        let splitter = MarkerSplitter::try_new(r"a\*b", false).unwrap();
        assert_eq!(splitter.pieces("1a*b2axxb3"), vec!["1", "2axxb3"]);

        let splitter = MarkerSplitter::try_new(r"\?", false).unwrap();
        assert_eq!(splitter.pieces("x?y"), vec!["x", "y"]);
    }

    #[test]
    fn test_regex_metacharacters_in_marker_are_escaped() {
        let splitter = MarkerSplitter::try_new("[1]", false).unwrap();
        assert_eq!(splitter.pieces("a[1]b1c"), vec!["a", "b1c"]);
    }

    #[test]
    fn test_regex_literal_with_flags() {
        let splitter = MarkerSplitter::try_new("/^chapter \\d+$/gim", true).unwrap();
        assert_eq!(splitter.pattern(), "(?im)^chapter \\d+$");

        let pieces = splitter.pieces("CHAPTER 1\nfoo\nChapter 2\nbar");
        assert_eq!(non_blank(&pieces), vec!["CHAPTER 1\nfoo\n", "Chapter 2\nbar"]);
    }

    #[test]
    fn test_regex_literal_slash_in_class() {
        let (body, flags) = parse_regex_literal("/[/]x/y").unwrap();
        assert_eq!(body, "[/]x");
        assert_eq!(flags, "y");
    }

    #[test]
    fn test_not_a_regex_literal() {
        assert!(parse_regex_literal("/unterminated").is_none());
        assert!(parse_regex_literal("//").is_none());
        assert!(parse_regex_literal("plain").is_none());
    }

    #[test]
    fn test_regex_literal_lookahead_cuts_before_match() {
        let splitter = MarkerSplitter::try_new("/(?=Chapter)/", false).unwrap();
        let pieces = splitter.pieces("Chapter 1\nalpha\nChapter 2\nbeta");

        assert_eq!(non_blank(&pieces), vec!["Chapter 1\nalpha\n", "Chapter 2\nbeta"]);
    }

    #[test]
    fn test_regex_literal_backreference() {
        let splitter = MarkerSplitter::try_new(r"/(\w)\1/", false).unwrap();
        assert_eq!(splitter.pieces("abccdeffg"), vec!["ab", "de", "g"]);
    }

    #[test]
    fn test_regex_literal_lookbehind() {
        let splitter = MarkerSplitter::try_new("/(?<=;)/", true).unwrap();
        assert_eq!(splitter.pieces("a;b;c"), vec!["a;", "b;", "c"]);
    }

    #[test]
    fn test_unsupported_flag_is_an_error() {
        let err = MarkerSplitter::try_new("/x/q", true).unwrap_err();
        assert!(matches!(err, Error::SplitConfiguration(_)));
    }

    #[test]
    fn test_bad_regex_is_an_error() {
        let err = MarkerSplitter::try_new("/(unclosed/", true).unwrap_err();
        assert!(matches!(err, Error::SplitConfiguration(_)));
    }

    #[test]
    fn test_empty_separator_is_an_error() {
        assert!(MarkerSplitter::try_new("", true).is_err());
    }

    #[test]
    fn test_zero_length_matches_terminate() {
        let splitter = MarkerSplitter::try_new("/x*/", true).unwrap();
        let pieces = splitter.pieces("abc");
        assert_eq!(pieces.concat(), "abc");
    }

    #[test]
    fn test_heading_rule_out_of_range() {
        let err = MarkerSplitter::from_rule(&CustomRule::Heading { level: 7 }).unwrap_err();
        assert!(matches!(err, Error::SplitConfiguration(_)));
    }

    #[test]
    fn test_trailing_backslash_is_literal() {
        let splitter = MarkerSplitter::try_new("end\\", false).unwrap();
        assert_eq!(splitter.pieces("aend\\b"), vec!["a", "b"]);
    }
}
