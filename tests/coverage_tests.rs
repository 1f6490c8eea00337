//! Scenario tests for splitting, through the public API only.
//!
//! Each test feeds a realistic document through `split` and checks the
//! fragments a user would see.

use chunkflow::{split, CustomRule, Fragment, SplitConfig, SplitMode};

fn contents(fragments: &[Fragment]) -> Vec<&str> {
    fragments.iter().map(|f| f.content.as_str()).collect()
}

const CHAPTERS: &str = "\
Preface text.

Chapter 1: Arrival
They came at night.

Chapter 2: Departure
They left at dawn.
";

const MARKDOWN: &str = "\
# Guide

Intro paragraph.

## Install

Run the installer.

### Windows

Double-click it.

## Usage

Type commands.
";

// =============================================================================
// Line and character modes
// =============================================================================

#[test]
fn one_line_per_fragment() {
    let fragments = split("AAAA\nBBBB\nCCCC", &SplitConfig::lines(1));
    assert_eq!(contents(&fragments), vec!["AAAA", "BBBB", "CCCC"]);
    assert_eq!(
        fragments.iter().map(|f| f.sequence_index).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
}

#[test]
fn line_groups_skip_blank_lines() {
    let fragments = split("a\n\n\nb\n  \nc\nd\ne", &SplitConfig::lines(2));
    assert_eq!(contents(&fragments), vec!["a\nb", "c\nd", "e"]);
}

#[test]
fn character_windows_prefer_late_newlines() {
    let text = format!("{}\n{}", "a".repeat(9), "b".repeat(15));
    let fragments = split(&text, &SplitConfig::characters(10));

    assert_eq!(fragments[0].content, "a".repeat(9));
    assert_eq!(fragments[1].content, "b".repeat(10));
    assert_eq!(fragments[2].content, "b".repeat(5));
}

#[test]
fn character_windows_count_graphemes_not_bytes() {
    // "e" + combining acute, four times: 4 characters, 12 bytes.
    let text = "e\u{301}".repeat(4);
    let fragments = split(&text, &SplitConfig::characters(2));

    assert_eq!(fragments.len(), 2);
    assert!(fragments.iter().all(|f| f.content == "e\u{301}e\u{301}"));
}

// =============================================================================
// Headings
// =============================================================================

#[test]
fn level_two_headings_ignore_deeper_ones() {
    let config = SplitConfig::custom(CustomRule::Heading { level: 2 });
    let fragments = split(MARKDOWN, &config);

    assert_eq!(fragments.len(), 3);
    assert_eq!(fragments[0].content, "# Guide\n\nIntro paragraph.");
    assert!(fragments[1].content.starts_with("## Install"));
    assert!(fragments[1].content.contains("### Windows"));
    assert!(fragments[2].content.starts_with("## Usage"));
}

#[test]
fn level_three_headings_only() {
    let config = SplitConfig::custom(CustomRule::Heading { level: 3 });
    let fragments = split(MARKDOWN, &config);

    assert_eq!(fragments.len(), 2);
    assert!(fragments[1].content.starts_with("### Windows"));
    assert!(fragments[1].content.ends_with("Type commands."));
}

// =============================================================================
// Text markers
// =============================================================================

#[test]
fn wildcard_marker_keeps_chapter_titles() {
    let config = SplitConfig::custom(CustomRule::marker("Chapter *:"));
    let fragments = split(CHAPTERS, &config);

    assert_eq!(contents(&fragments)[0], "Preface text.");
    assert_eq!(
        contents(&fragments)[1],
        "Chapter 1: Arrival\nThey came at night."
    );
    assert_eq!(
        contents(&fragments)[2],
        "Chapter 2: Departure\nThey left at dawn."
    );
}

#[test]
fn discarded_marker_leaves_only_bodies() {
    let config = SplitConfig::custom(CustomRule::Text {
        separator: "---".into(),
        keep_separator: false,
    });
    let fragments = split("one\n---\ntwo\n---\n\n---\nthree", &config);

    assert_eq!(contents(&fragments), vec!["one", "two", "three"]);
}

#[test]
fn regex_literal_splits_case_insensitively() {
    let config = SplitConfig::custom(CustomRule::marker(r"/^chapter \d+/im"));
    let fragments = split("CHAPTER 1 one\nChapter 2 two\nchapter 3 three", &config);

    assert_eq!(
        contents(&fragments),
        vec!["CHAPTER 1 one", "Chapter 2 two", "chapter 3 three"]
    );
}

#[test]
fn regex_literal_lookahead_splits_before_each_chapter() {
    let config = SplitConfig::custom(CustomRule::Text {
        separator: "/(?=Chapter)/".into(),
        keep_separator: false,
    });
    let fragments = split("Chapter 1\nalpha\nChapter 2\nbeta", &config);

    assert_eq!(
        contents(&fragments),
        vec!["Chapter 1\nalpha", "Chapter 2\nbeta"]
    );
}

#[test]
fn regex_literal_backreference_matches_repeated_rule() {
    let config = SplitConfig::custom(CustomRule::Text {
        separator: r"/^(=+)$\n[^=]*?\n^\1$/m".into(),
        keep_separator: false,
    });
    let fragments = split("intro\n==\nskip me\n==\nbody", &config);

    assert_eq!(contents(&fragments), vec!["intro", "body"]);
}

#[test]
fn broken_rule_yields_whole_text() {
    for separator in ["/(unclosed/", "/x/q", ""] {
        let config = SplitConfig::custom(CustomRule::marker(separator));
        let fragments = split(" all of it \n", &config);
        assert_eq!(contents(&fragments), vec!["all of it"], "separator {separator:?}");
    }
}

// =============================================================================
// Batching
// =============================================================================

#[test]
fn batches_join_pieces_with_blank_line() {
    let config = SplitConfig::lines(1).with_batch_size(3);
    let fragments = split("1\n2\n3\n4\n5", &config);

    assert_eq!(contents(&fragments), vec!["1\n\n2\n\n3", "4\n\n5"]);
    assert_eq!(fragments[1].sequence_index, 2);
}

#[test]
fn batching_applies_after_blank_pieces_are_dropped() {
    let config = SplitConfig::custom(CustomRule::Text {
        separator: "|".into(),
        keep_separator: false,
    })
    .with_batch_size(2);
    let fragments = split("a|  |b| |c", &config);

    assert_eq!(contents(&fragments), vec!["a\n\nb", "c"]);
}

// =============================================================================
// Configuration from JSON
// =============================================================================

#[test]
fn config_parses_from_json() {
    let config: SplitConfig = serde_json::from_str(
        r#"{ "mode": { "type": "custom", "rule": "heading", "level": 2 }, "batch_size": 1 }"#,
    )
    .unwrap();

    assert_eq!(config.mode, SplitMode::Custom(CustomRule::Heading { level: 2 }));
    assert_eq!(split(MARKDOWN, &config).len(), 3);
}
