//! Character-window splitting.
//!
//! Cut every N characters, but prefer a clean line break when one is close
//! to the cut.
//!
//! ## How It Works
//!
//! ```text
//! chunk_size = 10, text = 25 characters
//!
//! window 0: [0..10)   newline at 9?  -> cut at 10 (just after it)
//!                     newline at 5?  -> too early (not past 80%), cut at 10
//! window 1: [10..20)
//! window 2: [20..25)  end of text, no search
//! ```
//!
//! "Character" means a user-perceived character (an extended grapheme
//! cluster), so a cut never separates a base letter from its combining marks
//! and never lands inside a multi-byte sequence.
//!
//! ## Why Only the Last 20%?
//!
//! Cutting back to an early newline would make the piece much smaller than
//! asked for. Limiting the search to the tail keeps every piece between 80%
//! and 100% of the requested size, except the last.

use std::borrow::Cow;

use unicode_segmentation::UnicodeSegmentation;

use crate::Splitter;

/// Character-window splitter.
///
/// ## Example
///
/// ```rust
/// use chunkflow::{CharacterSplitter, Splitter};
///
/// let splitter = CharacterSplitter::new(20);
/// let pieces = splitter.pieces("A first line, yes\nand then more text");
///
/// assert_eq!(pieces.len(), 2);
/// assert_eq!(pieces[0], "A first line, yes\n");
/// assert_eq!(pieces[1], "and then more text");
/// ```
#[derive(Debug, Clone)]
pub struct CharacterSplitter {
    chunk_size: usize,
}

impl CharacterSplitter {
    /// Create a new character splitter.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size == 0`.
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be > 0");
        Self { chunk_size }
    }

    /// Window size in characters.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Whether a newline at grapheme `pos` is far enough into the window
    /// starting at `start` to cut after it.
    fn in_lookback_zone(&self, start: usize, pos: usize) -> bool {
        // pos > start + 0.8 * size, in integers
        pos * 5 > start * 5 + self.chunk_size * 4
    }
}

impl Splitter for CharacterSplitter {
    fn pieces<'a>(&self, text: &'a str) -> Vec<Cow<'a, str>> {
        if text.is_empty() {
            return vec![];
        }

        // Byte offset of every grapheme start, plus the end of the text.
        let bounds: Vec<usize> = text
            .grapheme_indices(true)
            .map(|(offset, _)| offset)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = bounds.len() - 1;
        let grapheme = |i: usize| &text[bounds[i]..bounds[i + 1]];

        let mut pieces = Vec::with_capacity(total.div_ceil(self.chunk_size));
        let mut start = 0;

        while start < total {
            let mut end = (start + self.chunk_size).min(total);

            if end < total {
                let newline = (start..end)
                    .rev()
                    .take_while(|&pos| self.in_lookback_zone(start, pos))
                    .find(|&pos| grapheme(pos).ends_with('\n'));
                if let Some(pos) = newline {
                    end = pos + 1;
                }
            }

            pieces.push(Cow::Borrowed(&text[bounds[start]..bounds[end]]));
            start = end;
        }

        pieces
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hard_cut_without_newlines() {
        let splitter = CharacterSplitter::new(10);
        let pieces = splitter.pieces("abcdefghijklmnopqrstuvwxyz");

        assert_eq!(pieces, vec!["abcdefghij", "klmnopqrst", "uvwxyz"]);
    }

    #[test]
    fn test_cuts_after_late_newline() {
        let splitter = CharacterSplitter::new(10);
        // newline at position 9, inside the last 20%
        let pieces = splitter.pieces("abcdefghi\njklmnopqrs");

        assert_eq!(pieces[0], "abcdefghi\n");
        assert_eq!(pieces[1], "jklmnopqrs");
    }

    #[test]
    fn test_ignores_early_newline() {
        let splitter = CharacterSplitter::new(10);
        // newline at position 3 is not past 80% of the window
        let pieces = splitter.pieces("abc\nefghijklmnop");

        assert_eq!(pieces[0], "abc\nefghij");
    }

    #[test]
    fn test_newline_exactly_at_eighty_percent_is_ignored() {
        let splitter = CharacterSplitter::new(10);
        // position 8: 8 > 8.0 is false
        let pieces = splitter.pieces("abcdefgh\nijklmnop");

        assert_eq!(pieces[0], "abcdefgh\ni");
    }

    #[test]
    fn test_no_search_on_final_window() {
        let splitter = CharacterSplitter::new(100);
        let pieces = splitter.pieces("short\ntext");
        assert_eq!(pieces, vec!["short\ntext"]);
    }

    #[test]
    fn test_empty_text() {
        let splitter = CharacterSplitter::new(10);
        assert!(splitter.pieces("").is_empty());
    }

    #[test]
    fn test_unicode_boundaries() {
        let splitter = CharacterSplitter::new(2);
        let text = "a日本語b";
        let pieces = splitter.pieces(text);

        assert_eq!(pieces, vec!["a日", "本語", "b"]);
        assert_eq!(pieces.concat(), text);
    }

    #[test]
    fn test_combining_marks_stay_together() {
        let splitter = CharacterSplitter::new(1);
        let text = "e\u{301}a";
        let pieces = splitter.pieces(text);

        assert_eq!(pieces, vec!["e\u{301}", "a"]);
    }

    #[test]
    #[should_panic]
    fn test_zero_size_panics() {
        let _ = CharacterSplitter::new(0);
    }
}
