//! Expressions used by the params, headers, consumes and produces predicates.
//!
//! # Forms
//! - `name`         the parameter/header must be present
//! - `!name`        the parameter/header must be absent
//! - `name=value`   must be present with exactly this value
//! - `name!=value`  must be absent or carry a different value
//! - `[!]type/subtype` media type, optionally negated
//!
//! # Design Decisions
//! - Header names compare case-insensitively, parameter names exactly
//! - Two expression sets "may overlap" unless a pair on the same name is
//!   provably contradictory

use std::fmt;

use thiserror::Error;

use crate::http::media_type::{MediaType, MediaTypeError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("expression '{0}' has an empty name")]
    EmptyName(String),

    #[error("invalid media type expression: {0}")]
    MediaType(#[from] MediaTypeError),
}

/// One `name`, `!name`, `name=value` or `name!=value` expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameValueExpression {
    name: String,
    value: Option<String>,
    negated: bool,
}

impl NameValueExpression {
    pub fn parse(raw: &str, case_insensitive_name: bool) -> Result<Self, ExpressionError> {
        let raw_trimmed = raw.trim();
        let (name, value, negated) = if let Some((n, v)) = raw_trimmed.split_once("!=") {
            (n, Some(v), true)
        } else if let Some((n, v)) = raw_trimmed.split_once('=') {
            (n, Some(v), false)
        } else if let Some(n) = raw_trimmed.strip_prefix('!') {
            (n, None, true)
        } else {
            (raw_trimmed, None, false)
        };

        let name = name.trim();
        if name.is_empty() {
            return Err(ExpressionError::EmptyName(raw.to_string()));
        }
        let name = if case_insensitive_name {
            name.to_ascii_lowercase()
        } else {
            name.to_string()
        };

        Ok(Self {
            name,
            value: value.map(|v| v.trim().to_string()),
            negated,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Evaluate against the first value of `name`, `None` when absent.
    pub fn test(&self, actual: Option<&str>) -> bool {
        let holds = match (&self.value, actual) {
            (None, present) => present.is_some(),
            (Some(expected), Some(actual)) => expected == actual,
            (Some(_), None) => false,
        };
        holds != self.negated
    }

    /// Whether both expressions can hold for the same request.
    pub fn is_compatible_with(&self, other: &NameValueExpression) -> bool {
        if self.name != other.name {
            return true;
        }
        use Constraint::*;
        match (self.constraint(), other.constraint()) {
            (Absent, Present) | (Present, Absent) => false,
            (Absent, Equals(_)) | (Equals(_), Absent) => false,
            (Equals(a), Equals(b)) => a == b,
            (Equals(a), NotEquals(b)) | (NotEquals(b), Equals(a)) => a != b,
            _ => true,
        }
    }

    fn constraint(&self) -> Constraint<'_> {
        match (&self.value, self.negated) {
            (None, false) => Constraint::Present,
            (None, true) => Constraint::Absent,
            (Some(v), false) => Constraint::Equals(v),
            (Some(v), true) => Constraint::NotEquals(v),
        }
    }
}

enum Constraint<'a> {
    Present,
    Absent,
    Equals(&'a str),
    NotEquals(&'a str),
}

impl fmt::Display for NameValueExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.value, self.negated) {
            (None, false) => write!(f, "{}", self.name),
            (None, true) => write!(f, "!{}", self.name),
            (Some(v), false) => write!(f, "{}={}", self.name, v),
            (Some(v), true) => write!(f, "{}!={}", self.name, v),
        }
    }
}

/// A set of name/value expressions combined with AND.
pub fn all_compatible(a: &[NameValueExpression], b: &[NameValueExpression]) -> bool {
    a.iter()
        .all(|x| b.iter().all(|y| x.is_compatible_with(y)))
}

/// A possibly negated media type expression.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaTypeExpression {
    media_type: MediaType,
    negated: bool,
}

impl MediaTypeExpression {
    pub fn parse(raw: &str) -> Result<Self, ExpressionError> {
        let raw = raw.trim();
        let (negated, value) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        Ok(Self {
            media_type: MediaType::parse(value)?,
            negated,
        })
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Consumes-side test: does this expression accept the request body type?
    pub fn includes(&self, content_type: &MediaType) -> bool {
        self.media_type.includes(content_type) != self.negated
    }

    /// Produces-side test: is some accepted type compatible with this one?
    pub fn compatible_with_any(&self, accepted: &[MediaType]) -> bool {
        let any = accepted
            .iter()
            .any(|a| a.is_compatible_with(&self.media_type));
        any != self.negated
    }

    /// Whether both expressions may match a common media type. A negation
    /// overlaps everything except the exact type it negates.
    pub fn may_overlap(&self, other: &MediaTypeExpression) -> bool {
        match (self.negated, other.negated) {
            (false, false) => self.media_type.is_compatible_with(&other.media_type),
            (true, true) => true,
            _ => self.media_type != other.media_type,
        }
    }
}

impl fmt::Display for MediaTypeExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            f.write_str("!")?;
        }
        write!(f, "{}", self.media_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nv(s: &str) -> NameValueExpression {
        NameValueExpression::parse(s, false).unwrap()
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(nv("a").to_string(), "a");
        assert_eq!(nv("!a").to_string(), "!a");
        assert_eq!(nv("a=1").to_string(), "a=1");
        assert_eq!(nv("a!=1").to_string(), "a!=1");
        assert!(NameValueExpression::parse("=1", false).is_err());
        assert_eq!(NameValueExpression::parse("X-Token", true).unwrap().name(), "x-token");
    }

    #[test]
    fn test_evaluation() {
        assert!(nv("a").test(Some("")));
        assert!(!nv("a").test(None));
        assert!(nv("!a").test(None));
        assert!(!nv("!a").test(Some("1")));
        assert!(nv("a=1").test(Some("1")));
        assert!(!nv("a=1").test(Some("2")));
        assert!(nv("a!=1").test(Some("2")));
        assert!(nv("a!=1").test(None));
        assert!(!nv("a!=1").test(Some("1")));
    }

    #[test]
    fn test_compatibility() {
        assert!(!nv("a").is_compatible_with(&nv("!a")));
        assert!(!nv("a=1").is_compatible_with(&nv("a=2")));
        assert!(!nv("a=1").is_compatible_with(&nv("a!=1")));
        assert!(!nv("a=1").is_compatible_with(&nv("!a")));
        assert!(nv("a").is_compatible_with(&nv("a=1")));
        assert!(nv("!a").is_compatible_with(&nv("a!=1")));
        assert!(nv("a=1").is_compatible_with(&nv("b=2")));
        assert!(all_compatible(&[nv("a"), nv("b=1")], &[nv("c")]));
        assert!(!all_compatible(&[nv("a"), nv("b=1")], &[nv("b=2")]));
    }

    #[test]
    fn test_media_type_expressions() {
        let json = MediaTypeExpression::parse("application/json").unwrap();
        let not_json = MediaTypeExpression::parse("!application/json").unwrap();
        let ct = MediaType::parse("application/json").unwrap();
        assert!(json.includes(&ct));
        assert!(!not_json.includes(&ct));
        assert!(not_json.includes(&MediaType::parse("text/plain").unwrap()));

        let text = MediaTypeExpression::parse("text/*").unwrap();
        assert!(!json.may_overlap(&text));
        assert!(!json.may_overlap(&not_json));
        assert!(!not_json.may_overlap(&json));
        assert!(not_json.may_overlap(&not_json));

        let not_xml = MediaTypeExpression::parse("!application/xml").unwrap();
        assert!(json.may_overlap(&not_xml));
        assert!(not_xml.may_overlap(&not_json));
        assert!(text.compatible_with_any(&[MediaType::all()]));
    }
}
