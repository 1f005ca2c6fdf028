//! Structured-field extraction patterns.
//!
//! A pattern's capture groups 2, 3 and 4 carry the hostname, tag and
//! message of a line that was already syslog formatted upstream.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

const SYSLOG_FIELDS: &str = r"^(\w+ +\d+ \S+) (\S+) ([^: ]+):? (.*)$";
const RFC3339_FIELDS: &str = r"^(\S+) (\S+) ([^: ]+):? (.*)$";

static SYSLOG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(SYSLOG_FIELDS).expect("syslog field pattern is valid"));
static RFC3339_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(RFC3339_FIELDS).expect("rfc3339 field pattern is valid"));

/// Selects how fields are pulled out of an input line.
#[derive(Clone)]
pub enum FieldPattern {
    /// `Mon dd HH:MM:SS host tag: message`
    Syslog,
    /// `2024-01-01T00:00:00Z host tag: message`
    Rfc3339,
    Custom(Regex),
}

/// Non-empty fields captured from a matching line.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExtractedFields<'a> {
    pub hostname: Option<&'a str>,
    pub tag: Option<&'a str>,
    pub content: Option<&'a str>,
}

impl FieldPattern {
    /// Parse a selector: `syslog`, `rfc3339`, or any other string as a
    /// custom regular expression.
    pub fn parse(selector: &str) -> Result<Self, regex::Error> {
        match selector.trim() {
            "syslog" => Ok(Self::Syslog),
            "rfc3339" => Ok(Self::Rfc3339),
            other => Regex::new(other).map(Self::Custom),
        }
    }

    pub fn regex(&self) -> &Regex {
        match self {
            Self::Syslog => &SYSLOG_REGEX,
            Self::Rfc3339 => &RFC3339_REGEX,
            Self::Custom(re) => re,
        }
    }

    /// Returns `None` when the line does not match at all.
    pub fn extract<'a>(&self, line: &'a str) -> Option<ExtractedFields<'a>> {
        let caps = self.regex().captures(line)?;
        let group = |idx| {
            caps.get(idx)
                .map(|m| m.as_str())
                .filter(|s: &&str| !s.is_empty())
        };
        Some(ExtractedFields {
            hostname: group(2),
            tag: group(3),
            content: group(4),
        })
    }
}

impl fmt::Debug for FieldPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syslog => f.write_str("Syslog"),
            Self::Rfc3339 => f.write_str("Rfc3339"),
            Self::Custom(re) => f.debug_tuple("Custom").field(&re.as_str()).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn syslog_pattern_extracts_fields() {
        let fields = FieldPattern::Syslog
            .extract("Jan  2 03:04:05 web01 sshd[42]: Accepted publickey")
            .expect("line matches");
        assert_eq!(fields.hostname, Some("web01"));
        assert_eq!(fields.tag, Some("sshd[42]"));
        assert_eq!(fields.content, Some("Accepted publickey"));
    }

    #[rstest]
    fn rfc3339_pattern_extracts_fields() {
        let fields = FieldPattern::Rfc3339
            .extract("2024-05-01T10:00:00Z db02 postgres: checkpoint complete")
            .expect("line matches");
        assert_eq!(fields.hostname, Some("db02"));
        assert_eq!(fields.tag, Some("postgres"));
        assert_eq!(fields.content, Some("checkpoint complete"));
    }

    #[rstest]
    fn non_matching_line_yields_none() {
        assert!(FieldPattern::Syslog.extract("plain text").is_none());
    }

    #[rstest]
    fn empty_groups_are_omitted() {
        let pattern = FieldPattern::parse(r"^(x)(\w*) (\w*) ?(.*)$").expect("valid regex");
        let fields = pattern.extract("x host ").expect("line matches");
        assert_eq!(fields.hostname, None);
        assert_eq!(fields.tag, Some("host"));
        assert_eq!(fields.content, None);
    }

    #[rstest]
    #[case("syslog")]
    #[case(" rfc3339 ")]
    #[case(r"^(\d+) (\S+) (\S+) (.*)$")]
    fn parse_accepts_builtins_and_custom(#[case] selector: &str) {
        assert!(FieldPattern::parse(selector).is_ok());
    }

    #[rstest]
    fn parse_rejects_invalid_regex() {
        assert!(FieldPattern::parse("(unclosed").is_err());
    }
}
