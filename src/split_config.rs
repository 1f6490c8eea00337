//! Split configuration.
//!
//! A [`SplitConfig`] fully determines how a source text becomes fragments.
//! It is immutable per split pass: a new configuration means a full,
//! destructive re-split.
//!
//! ```rust
//! use chunkflow::{CustomRule, SplitConfig, SplitMode};
//!
//! // Every level-2 heading starts a new fragment; merge three per request.
//! let config = SplitConfig::new(SplitMode::Custom(CustomRule::Heading { level: 2 }))
//!     .with_batch_size(3);
//! assert_eq!(config.batch_size(), 3);
//! ```

use serde::{Deserialize, Serialize};

/// Default window for character mode.
pub const DEFAULT_CHUNK_SIZE: usize = 2000;

/// Default lines per piece for line mode.
pub const DEFAULT_LINE_COUNT: usize = 10;

/// Default marker for text rules.
pub const DEFAULT_SEPARATOR: &str = "###";

/// Default heading depth for heading rules.
pub const DEFAULT_HEADING_LEVEL: u8 = 2;

/// How the raw text is cut into pieces before batching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SplitMode {
    /// Fixed character windows, preferring to cut after a newline.
    Character {
        /// Window size in characters.
        chunk_size: usize,
    },
    /// Groups of non-blank lines.
    Line {
        /// Lines per piece.
        line_count: usize,
    },
    /// Marker, regex, or heading based splitting.
    Custom(CustomRule),
}

impl Default for SplitMode {
    fn default() -> Self {
        Self::Character {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// A custom splitting rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "kebab-case")]
pub enum CustomRule {
    /// Split before every heading of exactly this depth (1-6).
    Heading {
        /// Number of `#` characters.
        level: u8,
    },
    /// Split on a marker.
    ///
    /// The separator is either a regex literal (`/pattern/flags`) or plain
    /// text where `*` matches any run of characters and `?` matches one.
    Text {
        /// Marker or regex literal.
        separator: String,
        /// Keep the matched marker at the start of the next fragment.
        #[serde(default = "default_keep_separator")]
        keep_separator: bool,
    },
}

const fn default_keep_separator() -> bool {
    true
}

impl CustomRule {
    /// A text rule that keeps the marker.
    #[must_use]
    pub fn marker(separator: impl Into<String>) -> Self {
        Self::Text {
            separator: separator.into(),
            keep_separator: true,
        }
    }
}

impl Default for CustomRule {
    fn default() -> Self {
        Self::marker(DEFAULT_SEPARATOR)
    }
}

/// Complete configuration for one split pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Splitting strategy.
    pub mode: SplitMode,
    /// Adjacent pieces merged into one fragment. Values below 1 act as 1.
    pub batch_size: usize,
}

impl SplitConfig {
    /// Configuration with the given mode and no batching.
    #[must_use]
    pub fn new(mode: SplitMode) -> Self {
        Self {
            mode,
            batch_size: 1,
        }
    }

    /// Character windows of `chunk_size`.
    #[must_use]
    pub fn characters(chunk_size: usize) -> Self {
        Self::new(SplitMode::Character { chunk_size })
    }

    /// Groups of `line_count` non-blank lines.
    #[must_use]
    pub fn lines(line_count: usize) -> Self {
        Self::new(SplitMode::Line { line_count })
    }

    /// Custom rule.
    #[must_use]
    pub fn custom(rule: CustomRule) -> Self {
        Self::new(SplitMode::Custom(rule))
    }

    /// Set the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Effective batch size (at least 1).
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self::new(SplitMode::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = SplitConfig::default();
        assert_eq!(
            config.mode,
            SplitMode::Character {
                chunk_size: DEFAULT_CHUNK_SIZE
            }
        );
        assert_eq!(config.batch_size(), 1);
    }

    #[test]
    fn test_zero_batch_size_acts_as_one() {
        let config = SplitConfig::lines(2).with_batch_size(0);
        assert_eq!(config.batch_size(), 1);
    }

    #[test]
    fn test_text_rule_keeps_separator_when_unspecified() {
        let rule: CustomRule = serde_json::from_str(r#"{"rule":"text","separator":"---"}"#).unwrap();
        assert_eq!(rule, CustomRule::marker("---"));
    }
}
