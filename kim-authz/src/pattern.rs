//! Resource pattern matching.
//!
//! Resources are `:`-separated paths such as `doc:1` or `project:acme:doc:7`.
//! Patterns use the same shape with wildcards:
//!
//! - `*` inside a segment matches any run of characters (`doc-*`, `*-prod`);
//! - a final `*` segment matches one or more trailing segments (`doc:*`
//!   matches `doc:1` and `doc:1:page`);
//! - a final `**` segment matches zero or more trailing segments;
//! - the bare pattern `*` matches every resource.

use crate::error::AuthzError;

const SEPARATOR: char = ':';

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// Literal pieces between `*` wildcards.
    Glob(Vec<String>),
}

impl Segment {
    fn parse(raw: &str) -> Self {
        if raw.contains('*') {
            Segment::Glob(raw.split('*').map(str::to_string).collect())
        } else {
            Segment::Literal(raw.to_string())
        }
    }

    fn matches(&self, value: &str) -> bool {
        match self {
            Segment::Literal(lit) => lit == value,
            Segment::Glob(parts) => glob_match(parts, value),
        }
    }
}

fn glob_match(parts: &[String], value: &str) -> bool {
    let (first, rest) = match parts.split_first() {
        Some(split) => split,
        None => return value.is_empty(),
    };
    let Some(mut remaining) = value.strip_prefix(first.as_str()) else {
        return false;
    };
    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };
    for part in middle {
        match remaining.find(part.as_str()) {
            Some(pos) => remaining = &remaining[pos + part.len()..],
            None => return false,
        }
    }
    remaining.len() >= last.len() && remaining.ends_with(last.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tail {
    None,
    /// Final `*`: one or more segments.
    OneOrMore,
    /// Final `**`: zero or more segments.
    ZeroOrMore,
}

/// A compiled resource pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePattern {
    raw: String,
    segments: Vec<Segment>,
    tail: Tail,
}

impl ResourcePattern {
    pub fn parse(raw: &str) -> Result<Self, AuthzError> {
        let invalid = |message: &str| AuthzError::InvalidPattern {
            pattern: raw.to_string(),
            message: message.to_string(),
        };
        if raw.is_empty() {
            return Err(invalid("pattern is empty"));
        }

        let mut pieces: Vec<&str> = raw.split(SEPARATOR).collect();
        let tail = match pieces.last() {
            Some(&"*") => Tail::OneOrMore,
            Some(&"**") => Tail::ZeroOrMore,
            _ => Tail::None,
        };
        if tail != Tail::None {
            pieces.pop();
        }

        let mut segments = Vec::with_capacity(pieces.len());
        for piece in pieces {
            if piece.is_empty() {
                return Err(invalid("empty segment"));
            }
            if piece.contains("**") {
                return Err(invalid("'**' is only allowed as the final segment"));
            }
            segments.push(Segment::parse(piece));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
            tail,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, resource: &str) -> bool {
        let values: Vec<&str> = resource.split(SEPARATOR).collect();
        let fixed = self.segments.len();
        let count_ok = match self.tail {
            Tail::None => values.len() == fixed,
            Tail::OneOrMore => values.len() > fixed,
            Tail::ZeroOrMore => values.len() >= fixed,
        };
        count_ok
            && self
                .segments
                .iter()
                .zip(&values)
                .all(|(segment, value)| segment.matches(value))
    }
}

impl std::fmt::Display for ResourcePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, resource: &str) -> bool {
        ResourcePattern::parse(pattern).unwrap().matches(resource)
    }

    #[test]
    fn literal_patterns_match_exactly() {
        assert!(matches("doc:1", "doc:1"));
        assert!(!matches("doc:1", "doc:2"));
        assert!(!matches("doc:1", "doc:1:page"));
        assert!(!matches("doc", "doc:1"));
    }

    #[test]
    fn bare_star_matches_everything() {
        assert!(matches("*", "doc"));
        assert!(matches("*", "doc:1:page"));
    }

    #[test]
    fn final_star_needs_at_least_one_segment() {
        assert!(matches("doc:*", "doc:1"));
        assert!(matches("doc:*", "doc:1:page"));
        assert!(!matches("doc:*", "doc"));
        assert!(!matches("doc:*", "image:1"));
    }

    #[test]
    fn double_star_matches_zero_segments() {
        assert!(matches("doc:**", "doc"));
        assert!(matches("doc:**", "doc:1:2"));
    }

    #[test]
    fn globs_inside_segments() {
        assert!(matches("project:acme-*:doc", "project:acme-prod:doc"));
        assert!(matches("project:*-prod:doc", "project:acme-prod:doc"));
        assert!(matches("a*b*c", "abc"));
        assert!(matches("a*b*c", "axxbyyc"));
        assert!(!matches("a*b*c", "axxbyy"));
        assert!(!matches("ab*ba", "aba"));
        assert!(!matches("project:acme-*:doc", "project:other:doc"));
    }

    #[test]
    fn rejects_malformed_patterns() {
        assert!(ResourcePattern::parse("").is_err());
        assert!(ResourcePattern::parse("doc::1").is_err());
        assert!(ResourcePattern::parse("doc:**:1").is_err());
    }
}
