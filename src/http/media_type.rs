//! Media types for content negotiation.
//!
//! # Responsibilities
//! - Parse `type/subtype;param=value;q=0.8` strings
//! - Wildcard inclusion and compatibility checks (`*/*`, `text/*`, `*+json`)
//! - Specificity ordering for `Accept` negotiation
//!
//! # Design Decisions
//! - Type and subtype are normalised to lowercase
//! - The `q` parameter is lifted into `quality` and never kept as a param
//! - Malformed entries in an `Accept` header are skipped, not fatal

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors produced while parsing a media type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaTypeError {
    #[error("empty media type")]
    Empty,

    #[error("media type '{0}' is missing a '/' separator")]
    MissingSubtype(String),

    #[error("media type '{0}' has a wildcard type with a concrete subtype")]
    WildcardType(String),

    #[error("invalid quality value in '{0}'")]
    InvalidQuality(String),
}

/// A parsed media type with an optional quality factor.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaType {
    type_: String,
    subtype: String,
    params: Vec<(String, String)>,
    quality: f32,
}

impl MediaType {
    pub const WILDCARD: &'static str = "*";

    /// `*/*`
    pub fn all() -> Self {
        Self::new("*", "*")
    }

    /// `application/octet-stream`, assumed when a request omits `Content-Type`.
    pub fn octet_stream() -> Self {
        Self::new("application", "octet-stream")
    }

    pub fn new(type_: &str, subtype: &str) -> Self {
        Self {
            type_: type_.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            params: Vec::new(),
            quality: 1.0,
        }
    }

    /// Parse a single media type.
    pub fn parse(value: &str) -> Result<Self, MediaTypeError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(MediaTypeError::Empty);
        }

        let mut pieces = value.split(';');
        let full_type = pieces.next().unwrap_or_default().trim();
        // Some clients send a bare "*" for "*/*".
        let full_type = if full_type == Self::WILDCARD { "*/*" } else { full_type };

        let (type_, subtype) = full_type
            .split_once('/')
            .ok_or_else(|| MediaTypeError::MissingSubtype(value.to_string()))?;
        let (type_, subtype) = (type_.trim(), subtype.trim());
        if type_.is_empty() || subtype.is_empty() {
            return Err(MediaTypeError::MissingSubtype(value.to_string()));
        }
        if type_ == Self::WILDCARD && subtype != Self::WILDCARD {
            return Err(MediaTypeError::WildcardType(value.to_string()));
        }

        let mut media_type = Self::new(type_, subtype);
        for param in pieces {
            let Some((name, val)) = param.split_once('=') else {
                continue;
            };
            let name = name.trim().to_ascii_lowercase();
            let val = val.trim().trim_matches('"');
            if name == "q" {
                let q: f32 = val
                    .parse()
                    .map_err(|_| MediaTypeError::InvalidQuality(value.to_string()))?;
                if !(0.0..=1.0).contains(&q) {
                    return Err(MediaTypeError::InvalidQuality(value.to_string()));
                }
                media_type.quality = q;
            } else if !name.is_empty() {
                media_type.params.push((name, val.to_string()));
            }
        }
        Ok(media_type)
    }

    /// Parse a comma separated list such as an `Accept` header.
    pub fn parse_list(header: &str) -> Vec<MediaType> {
        header
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .filter_map(|s| match MediaType::parse(s) {
                Ok(mt) => Some(mt),
                Err(e) => {
                    tracing::trace!(entry = %s, error = %e, "Skipping malformed media type");
                    None
                }
            })
            .collect()
    }

    pub fn type_(&self) -> &str {
        &self.type_
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    pub fn is_wildcard_type(&self) -> bool {
        self.type_ == Self::WILDCARD
    }

    /// True for `*` and for suffix wildcards such as `*+json`.
    pub fn is_wildcard_subtype(&self) -> bool {
        self.subtype == Self::WILDCARD || self.subtype.starts_with("*+")
    }

    fn subtype_suffix(&self) -> Option<&str> {
        self.subtype.rfind('+').map(|i| &self.subtype[i + 1..])
    }

    /// Whether every media type matched by `other` is also matched by `self`.
    pub fn includes(&self, other: &MediaType) -> bool {
        if self.is_wildcard_type() {
            return true;
        }
        if self.type_ != other.type_ {
            return false;
        }
        if self.subtype == other.subtype || self.subtype == Self::WILDCARD {
            return true;
        }
        if self.is_wildcard_subtype() {
            // "*+json" includes "vnd.foo+json" and "json".
            if let Some(suffix) = self.subtype_suffix() {
                return other.subtype == suffix || other.subtype_suffix() == Some(suffix);
            }
        }
        false
    }

    /// Whether some concrete media type is matched by both.
    pub fn is_compatible_with(&self, other: &MediaType) -> bool {
        if self.is_wildcard_type() || other.is_wildcard_type() {
            return true;
        }
        if self.type_ != other.type_ {
            return false;
        }
        if self.subtype == other.subtype
            || self.subtype == Self::WILDCARD
            || other.subtype == Self::WILDCARD
        {
            return true;
        }
        match (self.is_wildcard_subtype(), other.is_wildcard_subtype()) {
            (true, true) => self.subtype_suffix() == other.subtype_suffix(),
            (true, false) => self.includes(other),
            (false, true) => other.includes(self),
            (false, false) => false,
        }
    }

    /// Ordering key, larger is more specific.
    pub fn specificity(&self) -> (u8, u8, usize) {
        let type_rank = u8::from(!self.is_wildcard_type());
        let subtype_rank = if self.subtype == Self::WILDCARD {
            0
        } else if self.is_wildcard_subtype() {
            1
        } else {
            2
        };
        (type_rank, subtype_rank, self.params.len())
    }

    /// Pick the more specific of an accepted and a producible type, carrying
    /// the accepted side's quality onto the result.
    pub fn most_specific(accepted: &MediaType, producible: &MediaType) -> MediaType {
        let chosen = if accepted.specificity() > producible.specificity() {
            accepted
        } else {
            producible
        };
        chosen.clone().with_quality(accepted.quality)
    }

    /// Stable sort by specificity, then quality, both descending.
    pub fn sort_by_specificity_and_quality(types: &mut [MediaType]) {
        types.sort_by(|a, b| {
            b.specificity().cmp(&a.specificity()).then_with(|| {
                b.quality
                    .partial_cmp(&a.quality)
                    .unwrap_or(Ordering::Equal)
            })
        });
    }

    /// `type/subtype` without parameters.
    pub fn essence(&self) -> String {
        format!("{}/{}", self.type_, self.subtype)
    }
}

impl FromStr for MediaType {
    type Err = MediaTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MediaType::parse(s)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)?;
        for (name, value) in &self.params {
            write!(f, ";{}={}", name, value)?;
        }
        if self.quality < 1.0 {
            write!(f, ";q={}", self.quality)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mt(s: &str) -> MediaType {
        MediaType::parse(s).unwrap()
    }

    #[test]
    fn test_parse() {
        let m = mt("Text/HTML; charset=utf-8; q=0.5");
        assert_eq!(m.type_(), "text");
        assert_eq!(m.subtype(), "html");
        assert_eq!(m.param("charset"), Some("utf-8"));
        assert_eq!(m.quality(), 0.5);
        assert_eq!(m.to_string(), "text/html;charset=utf-8;q=0.5");

        assert_eq!(mt("*"), MediaType::all());
        assert!(MediaType::parse("text").is_err());
        assert!(MediaType::parse("*/json").is_err());
        assert!(MediaType::parse("text/plain;q=2").is_err());
    }

    #[test]
    fn test_parse_list_skips_garbage() {
        let list = MediaType::parse_list("text/html, bogus, application/json;q=0.9");
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].essence(), "application/json");
    }

    #[test]
    fn test_includes() {
        assert!(mt("*/*").includes(&mt("text/plain")));
        assert!(mt("text/*").includes(&mt("text/plain")));
        assert!(!mt("text/*").includes(&mt("application/json")));
        assert!(mt("application/*+json").includes(&mt("application/vnd.api+json")));
        assert!(!mt("text/plain").includes(&mt("text/*")));
    }

    #[test]
    fn test_compatible() {
        assert!(mt("text/plain").is_compatible_with(&mt("text/*")));
        assert!(mt("text/*").is_compatible_with(&mt("text/plain")));
        assert!(!mt("text/plain").is_compatible_with(&mt("text/html")));
        assert!(mt("application/*+json").is_compatible_with(&mt("application/x+json")));
        assert!(!mt("application/*+json").is_compatible_with(&mt("application/*+xml")));
    }

    #[test]
    fn test_most_specific_and_sort() {
        let accepted = mt("text/*;q=0.7");
        let produced = mt("text/plain");
        let chosen = MediaType::most_specific(&accepted, &produced);
        assert_eq!(chosen.essence(), "text/plain");
        assert_eq!(chosen.quality(), 0.7);

        let mut list = vec![mt("*/*"), mt("text/plain;q=0.3"), mt("text/*"), mt("application/json")];
        MediaType::sort_by_specificity_and_quality(&mut list);
        let order: Vec<String> = list.iter().map(|m| m.essence()).collect();
        assert_eq!(order, vec!["application/json", "text/plain", "text/*", "*/*"]);
    }
}
