//! Title to file stem mapping.
//!
//! The stem is the dedup key against the local library, so the mapping must be
//! pure and stable across runs: the same title always yields the same stem.

use std::path::{Path, PathBuf};

/// Characters rejected by at least one supported filesystem (Windows is the strictest).
pub const RESERVED_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Maximum stem length in characters, leaving room for an extension.
pub const MAX_STEM_CHARS: usize = 200;

/// Stem used when nothing survives sanitization.
pub const FALLBACK_STEM: &str = "untitled";

/// Deterministic title → filesystem-safe stem mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilenameCodec;

impl FilenameCodec {
    /// Strip reserved and control characters, trim, and cap the length.
    ///
    /// Idempotent: `sanitize(&sanitize(t)) == sanitize(t)`.
    #[must_use]
    pub fn sanitize(title: &str) -> String {
        let stripped: String = title
            .chars()
            .filter(|c| !RESERVED_CHARS.contains(c) && !c.is_control())
            .collect();

        let trimmed = trim_edges(&stripped);
        let capped: String = trimmed.chars().take(MAX_STEM_CHARS).collect();
        let result = trim_edges(&capped);

        if result.is_empty() {
            FALLBACK_STEM.to_string()
        } else {
            result.to_string()
        }
    }

    /// Path of the track's stem (without extension) inside `directory`.
    #[must_use]
    pub fn target_path(directory: &Path, title: &str) -> PathBuf {
        directory.join(Self::sanitize(title))
    }
}

fn trim_edges(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_basic() {
        assert_eq!(FilenameCodec::sanitize("Artist - Song"), "Artist - Song");
    }

    #[test]
    fn test_sanitize_strips_reserved() {
        let title = r#"AC/DC: Back\In*Black? "Live" <2024> |remaster|"#;
        let stem = FilenameCodec::sanitize(title);
        assert_eq!(stem, "ACDC BackInBlack Live 2024 remaster");
        assert!(!stem.chars().any(|c| RESERVED_CHARS.contains(&c)));
    }

    #[test]
    fn test_sanitize_strips_control_chars() {
        assert_eq!(FilenameCodec::sanitize("a\u{0}b\tc\nd"), "abcd");
    }

    #[test]
    fn test_sanitize_trims_dots_and_spaces() {
        assert_eq!(FilenameCodec::sanitize("  ...Intro...  "), "Intro");
        assert_eq!(FilenameCodec::sanitize("Mr. Brightside"), "Mr. Brightside");
    }

    #[test]
    fn test_sanitize_keeps_unicode() {
        assert_eq!(FilenameCodec::sanitize("Björk – Jóga ✨"), "Björk – Jóga ✨");
    }

    #[test]
    fn test_sanitize_caps_length_on_char_boundary() {
        let title = "é".repeat(300);
        let stem = FilenameCodec::sanitize(&title);
        assert_eq!(stem.chars().count(), MAX_STEM_CHARS);
    }

    #[test]
    fn test_sanitize_empty_falls_back() {
        assert_eq!(FilenameCodec::sanitize("???"), FALLBACK_STEM);
        assert_eq!(FilenameCodec::sanitize(""), FALLBACK_STEM);
    }

    #[test]
    fn test_sanitize_idempotent() {
        let titles = vec![
            "plain".to_string(),
            "a/b\\c:d*e?f\"g<h>i|j".to_string(),
            "  trailing dot. ".to_string(),
            " . ".to_string(),
            "x".repeat(199) + " .y",
            "é".repeat(250),
            "mixed\u{7}control".to_string(),
        ];
        for title in &titles {
            let once = FilenameCodec::sanitize(title);
            assert_eq!(FilenameCodec::sanitize(&once), once, "not idempotent for {title:?}");
        }
    }

    #[test]
    fn test_target_path() {
        let path = FilenameCodec::target_path(Path::new("/music/DnB"), "A: B");
        assert_eq!(path, PathBuf::from("/music/DnB/A B"));
    }
}
