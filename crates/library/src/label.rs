//! Turning a file name into a first guess at artist and title.
//!
//! This is the seam for name parsing heuristics. The synchronizer only needs
//! a [`Label`]: some metadata and how much to trust it, which decides the
//! status a new entry starts in.

use regex::Regex;
use songbook_cache::{Metadata, Status};
use std::sync::LazyLock;

/// Separator between artist and title (`Artist - Title`). Needs whitespace on
/// both sides so that hyphenated names survive.
static SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+-\s+").unwrap());
/// A trailing `(Live)` or `[Duet]` style version label.
static VARIANT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?P<rest>.*?)\s*[\(\[](?P<variant>[^\)\]]+)[\)\]]$").unwrap());
/// Disc/track identifiers that karaoke vendors put in front of names.
static TRACK_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?:[A-Za-z]{0,4}\d{3,}[\w-]*|\d{1,3})$").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// What a file name says about a song.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub metadata: Metadata,
    /// One of `fallback`, `parsed-weak` or `parsed-strong`.
    pub status: Status,
}

pub trait LabelParser: Send + Sync {
    /// Parse a file stem (file name without extension).
    fn parse(&self, stem: &str) -> Label;
}

/// Splits `Artist - Title (Variant)` file names.
///
/// - A clean two-part split is `parsed-strong`.
/// - A split with extra parts (typically a leading disc or track code, as in
///   `SC8123-05 - Artist - Title`) or an empty side is `parsed-weak`, taking
///   the last two parts.
/// - Anything else is `fallback` with the cleaned name as the title.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicLabelParser;

fn clean(input: &str) -> String {
    WHITESPACE.replace_all(&input.replace('_', " "), " ").trim().to_string()
}

fn split_variant(title: &str) -> (String, Option<String>) {
    match VARIANT.captures(title) {
        Some(caps) if !caps["rest"].trim().is_empty() => {
            (caps["rest"].trim().to_string(), Some(caps["variant"].trim().to_string()))
        },
        _ => (title.to_string(), None),
    }
}

impl LabelParser for BasicLabelParser {
    fn parse(&self, stem: &str) -> Label {
        let cleaned = clean(stem);
        let mut parts: Vec<&str> = SEPARATOR.split(&cleaned).map(str::trim).collect();
        let mut noisy = parts.len() > 2;
        if parts.iter().any(|part| part.is_empty()) {
            parts.retain(|part| !part.is_empty());
            noisy = true;
        }
        if parts.len() > 1 && TRACK_CODE.is_match(parts[0]) {
            parts.remove(0);
            noisy = true;
        }

        let (artist, title, status) = match parts.as_slice() {
            [artist, title] if !noisy => (*artist, *title, Status::ParsedStrong),
            [.., artist, title] => (*artist, *title, Status::ParsedWeak),
            _ => {
                let (title, variant) = split_variant(&cleaned);
                let metadata = Metadata { title: Some(title).filter(|t| !t.is_empty()), variant, ..Default::default() };
                return Label { metadata, status: Status::Fallback };
            },
        };
        let (title, variant) = split_variant(title);
        Label {
            metadata: Metadata {
                artist: Some(artist.to_string()),
                title: Some(title),
                variant,
                ..Default::default()
            },
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Queen - Bohemian Rhapsody", Some("Queen"), Some("Bohemian Rhapsody"), None, Status::ParsedStrong)]
    #[case("Queen_-_Bohemian_Rhapsody", Some("Queen"), Some("Bohemian Rhapsody"), None, Status::ParsedStrong)]
    #[case("ABBA - Waterloo (Live)", Some("ABBA"), Some("Waterloo"), Some("Live"), Status::ParsedStrong)]
    #[case("SC8123-05 - Queen - Somebody to Love", Some("Queen"), Some("Somebody to Love"), None, Status::ParsedWeak)]
    #[case("05 - Queen - Under Pressure [Duet]", Some("Queen"), Some("Under Pressure"), Some("Duet"), Status::ParsedWeak)]
    #[case("Jay-Z - 99 Problems", Some("Jay-Z"), Some("99 Problems"), None, Status::ParsedStrong)]
    #[case("B52s - Love Shack", Some("B52s"), Some("Love Shack"), None, Status::ParsedStrong)]
    #[case("01 - Yesterday", None, Some("01 - Yesterday"), None, Status::Fallback)]
    #[case("Bohemian_Rhapsody", None, Some("Bohemian Rhapsody"), None, Status::Fallback)]
    #[case("Yesterday (Remastered)", None, Some("Yesterday"), Some("Remastered"), Status::Fallback)]
    fn test_parse(
        #[case] stem: &str,
        #[case] artist: Option<&str>,
        #[case] title: Option<&str>,
        #[case] variant: Option<&str>,
        #[case] status: Status,
    ) {
        let label = BasicLabelParser.parse(stem);
        assert_eq!(label.status, status, "{stem}");
        assert_eq!(label.metadata.artist.as_deref(), artist, "{stem}");
        assert_eq!(label.metadata.title.as_deref(), title, "{stem}");
        assert_eq!(label.metadata.variant.as_deref(), variant, "{stem}");
    }

    #[test]
    fn test_status_is_always_queueable() {
        for stem in ["", "-", " - ", "a - b - c - d", "()"] {
            assert!(BasicLabelParser.parse(stem).status.is_queueable(), "{stem:?}");
        }
    }
}
