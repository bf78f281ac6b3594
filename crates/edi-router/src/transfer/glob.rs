//! Listing filters
//!
//! `*` matches any run of characters and `?` exactly one. Everything else is
//! literal, matching is case-sensitive and must cover the whole name.

use regex::Regex;

use crate::error::{TransferError, TransferResult};

#[derive(Debug, Clone)]
pub struct GlobPattern {
    pattern: String,
    regex: Regex,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> TransferResult<Self> {
        // (?s): wildcards also match '\n' inside odd remote names
        let mut expr = String::with_capacity(pattern.len() * 2 + 6);
        expr.push_str("(?s)^");
        for c in pattern.chars() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr)
            .map_err(|e| TransferError::InvalidTarget(format!("bad glob '{}': {}", pattern, e)))?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_star_is_case_sensitive_and_anchored() {
        let glob = GlobPattern::new("*.edi").unwrap();
        assert!(glob.is_match("850.edi"));
        assert!(!glob.is_match("850.EDI"));
        assert!(!glob.is_match("850.edi.bak"));
    }

    #[test]
    fn test_question_mark_is_one_character() {
        let glob = GlobPattern::new("2025-??-*.csv").unwrap();
        assert!(glob.is_match("2025-01-15.csv"));
        assert!(!glob.is_match("2025-1-15.csv"));
    }

    #[test]
    fn test_wildcards_match_newlines() {
        assert!(GlobPattern::new("po*.edi").unwrap().is_match("po\n1.edi"));
        assert!(GlobPattern::new("a?b").unwrap().is_match("a\nb"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let glob = GlobPattern::new("po(1)+[a].x12").unwrap();
        assert!(glob.is_match("po(1)+[a].x12"));
        assert!(!glob.is_match("po1a.x12"));

        let dot = GlobPattern::new("a.b").unwrap();
        assert!(!dot.is_match("axb"));
    }
}
