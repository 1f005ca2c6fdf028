//! Syslog tag derivation.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest tag, in bytes, embedded in a syslog header.
pub const MAX_TAG_LEN: usize = 32;

const FALLBACK_TAG: &str = "remote_syslog";

static TAG_UNSAFE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[: \]\[\\]+").expect("tag pattern is valid"));

/// Replace header-breaking characters and cap the length.
///
/// Each run of `:`, space, `[`, `]` or `\` becomes a single `-`. The
/// result is cut to [`MAX_TAG_LEN`] bytes on a character boundary.
pub fn sanitize_tag(raw: &str) -> String {
    let mut tag = TAG_UNSAFE.replace_all(raw, "-").into_owned();
    if tag.len() > MAX_TAG_LEN {
        let mut end = MAX_TAG_LEN;
        while !tag.is_char_boundary(end) {
            end -= 1;
        }
        tag.truncate(end);
    }
    tag
}

/// Tag for lines read from `path`, derived from its file name.
pub fn tag_for_path(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    if name.is_empty() {
        return FALLBACK_TAG.to_string();
    }
    sanitize_tag(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("app.log", "app.log")]
    #[case("a:b", "a-b")]
    #[case("x[1]", "x-1-")]
    #[case(r"dir\name", "dir-name")]
    #[case("a :: b", "a-b")]
    fn replaces_unsafe_characters(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(sanitize_tag(raw), expected);
    }

    #[rstest]
    fn truncates_long_tags_to_exactly_max_len() {
        let raw = "a".repeat(80);
        let tag = sanitize_tag(&raw);
        assert_eq!(tag.len(), MAX_TAG_LEN);
    }

    #[rstest]
    fn truncation_respects_char_boundaries() {
        let raw = format!("{}é", "a".repeat(31));
        let tag = sanitize_tag(&raw);
        assert_eq!(tag, "a".repeat(31));
    }

    #[rstest]
    fn sanitized_tag_never_contains_unsafe_characters() {
        let tag = sanitize_tag("[weird]: name\\with:everything");
        assert!(!tag.contains([':', ' ', '[', ']', '\\']));
    }

    #[rstest]
    fn tag_for_path_uses_basename() {
        assert_eq!(tag_for_path(Path::new("/var/log/nginx/access.log")), "access.log");
        assert_eq!(tag_for_path(Path::new("/")), FALLBACK_TAG);
    }
}
