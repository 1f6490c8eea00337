//! Line-count splitting.
//!
//! Drops blank lines, then groups the remaining lines N at a time.
//!
//! ```text
//! line_count = 2
//!
//! "alpha\n\nbeta\n   \ngamma\ndelta\nepsilon"
//!
//! non-blank: [alpha, beta, gamma, delta, epsilon]
//! Piece 0: "alpha\nbeta"
//! Piece 1: "gamma\ndelta"
//! Piece 2: "epsilon"
//! ```
//!
//! Blank lines never count toward N, so a document with generous spacing
//! produces the same pieces as a dense one.

use std::borrow::Cow;

use crate::Splitter;

/// Line-count splitter.
///
/// ## Example
///
/// ```rust
/// use chunkflow::{LineSplitter, Splitter};
///
/// let splitter = LineSplitter::new(2);
/// let pieces = splitter.pieces("one\ntwo\n\nthree");
///
/// assert_eq!(pieces, vec!["one\ntwo", "three"]);
/// ```
#[derive(Debug, Clone)]
pub struct LineSplitter {
    line_count: usize,
}

impl LineSplitter {
    /// Create a new line splitter.
    ///
    /// # Panics
    ///
    /// Panics if `line_count == 0`.
    #[must_use]
    pub fn new(line_count: usize) -> Self {
        assert!(line_count > 0, "line_count must be > 0");
        Self { line_count }
    }

    /// One line per piece.
    #[must_use]
    pub fn single() -> Self {
        Self::new(1)
    }
}

impl Splitter for LineSplitter {
    fn pieces<'a>(&self, text: &'a str) -> Vec<Cow<'a, str>> {
        let lines: Vec<&str> = text
            .split('\n')
            .filter(|line| !line.trim().is_empty())
            .collect();

        lines
            .chunks(self.line_count)
            .map(|group| match group {
                [only] => Cow::Borrowed(*only),
                _ => Cow::Owned(group.join("\n")),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_lines() {
        let splitter = LineSplitter::single();
        let pieces = splitter.pieces("AAAA\nBBBB\nCCCC");
        assert_eq!(pieces, vec!["AAAA", "BBBB", "CCCC"]);
    }

    #[test]
    fn test_blank_lines_do_not_count() {
        let splitter = LineSplitter::new(2);
        let pieces = splitter.pieces("alpha\n\nbeta\n   \ngamma\ndelta\nepsilon");
        assert_eq!(pieces, vec!["alpha\nbeta", "gamma\ndelta", "epsilon"]);
    }

    #[test]
    fn test_whitespace_only() {
        let splitter = LineSplitter::new(3);
        assert!(splitter.pieces("  \n\t\n\n").is_empty());
    }

    #[test]
    fn test_empty_text() {
        assert!(LineSplitter::new(3).pieces("").is_empty());
    }

    #[test]
    fn test_crlf_lines_keep_carriage_return_for_later_trim() {
        let splitter = LineSplitter::single();
        let pieces = splitter.pieces("one\r\ntwo");
        assert_eq!(pieces, vec!["one\r", "two"]);
    }

    #[test]
    #[should_panic]
    fn test_zero_lines_panics() {
        LineSplitter::new(0);
    }
}
