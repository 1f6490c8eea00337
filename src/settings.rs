//! Persisted settings.
//!
//! One TOML file holds everything a user configures. Every field has a
//! default, so a partial file, or none at all, still loads:
//!
//! ```toml
//! [provider]
//! provider = "gemini"
//! api_key = "..."
//! model = "gemini-1.5-pro"
//!
//! [run]
//! execution = "parallel"
//! concurrency_limit = 5
//!
//! [split]
//! batch_size = 2
//! mode = { type = "line", line_count = 20 }
//!
//! [[glossary]]
//! term = "LLM"
//! definition = "large language model"
//! ```
//!
//! The dispatcher never reads or writes this file. Callers load it, hand
//! the pieces over, and save after edits.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::glossary::dedupe;
use crate::{
    Dispatcher, GlossaryTerm, LlmClient, MergeConfig, ProviderConfig, Result, RunOptions,
    SplitConfig,
};

/// Everything a user configures, as stored on disk.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Provider connection.
    pub provider: ProviderConfig,
    /// Run behaviour.
    pub run: RunOptions,
    /// Split rule.
    pub split: SplitConfig,
    /// Export layout.
    pub merge: MergeConfig,
    /// Glossary terms.
    pub glossary: Vec<GlossaryTerm>,
}

impl Settings {
    /// Read settings from `path`. A missing file yields defaults.
    ///
    /// Duplicate glossary terms are dropped, first one wins.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };
        Self::from_toml(&raw)
    }

    /// Parse settings from TOML text.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let mut settings: Self = toml::from_str(raw)?;
        settings.glossary = dedupe(std::mem::take(&mut settings.glossary));
        Ok(settings)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write settings to `path`, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        debug!(path = %path.display(), "settings saved");
        Ok(())
    }

    /// A dispatcher configured from these settings, with no source loaded.
    #[must_use]
    pub fn dispatcher(&self, client: Arc<dyn LlmClient>) -> Dispatcher {
        let mut dispatcher = Dispatcher::new(client, self.provider.clone(), self.run.clone());
        dispatcher.set_split_config(self.split.clone());
        dispatcher.set_glossary(self.glossary.clone());
        dispatcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CustomRule, ExecutionMode, ProviderKind, SplitMode};

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_then_load_preserves_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");

        let settings = Settings {
            provider: ProviderConfig {
                provider: ProviderKind::Gemini,
                api_key: "key".into(),
                model: "gemini-1.5-pro".into(),
                temperature: 0.5,
                ..ProviderConfig::default()
            },
            run: RunOptions::parallel(5).with_glossary(),
            split: SplitConfig::custom(CustomRule::marker("Chapter *")).with_batch_size(2),
            merge: MergeConfig::results_only(),
            glossary: vec![GlossaryTerm::new("LLM", "large language model")],
        };
        settings.save(&path).unwrap();

        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings = Settings::from_toml(
            r#"
            [run]
            execution = "parallel"

            [split]
            mode = { type = "line", line_count = 20 }
            "#,
        )
        .unwrap();

        assert_eq!(settings.run.execution, ExecutionMode::Parallel);
        assert_eq!(settings.run.concurrency_limit, 3);
        assert_eq!(settings.split.mode, SplitMode::Line { line_count: 20 });
        assert_eq!(settings.provider, ProviderConfig::default());
    }

    #[test]
    fn test_text_rule_keeps_separator_by_default() {
        let settings = Settings::from_toml(
            r#"
            [split.mode]
            type = "custom"
            rule = "text"
            separator = "---"
            "#,
        )
        .unwrap();

        assert_eq!(
            settings.split.mode,
            SplitMode::Custom(CustomRule::Text {
                separator: "---".into(),
                keep_separator: true,
            })
        );
    }

    #[test]
    fn test_duplicate_terms_are_dropped_on_load() {
        let settings = Settings::from_toml(
            r#"
            [[glossary]]
            term = "API"
            definition = "first"

            [[glossary]]
            term = " api "
            definition = "second"
            "#,
        )
        .unwrap();

        assert_eq!(settings.glossary.len(), 1);
        assert_eq!(settings.glossary[0].definition, "first");
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let err = Settings::from_toml("[run\nexecution = ").unwrap_err();
        assert!(matches!(err, crate::Error::SettingsParse(_)));
    }
}
