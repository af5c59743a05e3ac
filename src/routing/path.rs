//! Path templates.
//!
//! # Syntax
//! - `?` matches exactly one character within a segment
//! - `*` matches zero or more characters within a segment
//! - `**` (a whole segment) matches zero or more segments
//! - `{name}` matches within one segment and captures it as `name`
//!
//! # Design Decisions
//! - Duplicate and trailing separators are normalised away, on both the
//!   template and the request path
//! - Matching and intersection are explicit walkers over tokens, no regex
//! - Intersection over-approximates: a `true` may be a false positive,
//!   a `false` is always a proof that no path matches both templates

use std::collections::{HashMap, HashSet};
use std::fmt;

use thiserror::Error;

/// Errors produced while compiling a path template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathTemplateError {
    #[error("path template '{0}' must start with '/'")]
    MissingLeadingSlash(String),

    #[error("path template '{0}' has an unclosed '{{'")]
    UnclosedVariable(String),

    #[error("path template '{0}' has an empty variable name")]
    EmptyVariable(String),
}

/// One element of a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Char(char),
    AnyChar,
    AnyChars,
    Variable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// `**`
    AnySegments,
    Parts(Vec<Part>),
}

/// A compiled path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
    literal: bool,
    has_variables: bool,
}

/// Split a path into its non-empty segments.
pub(crate) fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Collapse duplicate separators and drop a trailing one.
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for segment in split_segments(path) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

impl PathTemplate {
    pub fn parse(raw: &str) -> Result<Self, PathTemplateError> {
        if !raw.starts_with('/') {
            return Err(PathTemplateError::MissingLeadingSlash(raw.to_string()));
        }

        let mut segments = Vec::new();
        let mut literal = true;
        let mut has_variables = false;

        for text in split_segments(raw) {
            if text == "**" {
                literal = false;
                segments.push(Segment::AnySegments);
                continue;
            }

            let mut parts = Vec::new();
            let mut chars = text.chars();
            while let Some(c) = chars.next() {
                match c {
                    '?' => {
                        literal = false;
                        parts.push(Part::AnyChar);
                    }
                    '*' => {
                        literal = false;
                        // "**" inside a segment is the same as "*".
                        if parts.last() != Some(&Part::AnyChars) {
                            parts.push(Part::AnyChars);
                        }
                    }
                    '{' => {
                        let mut name = String::new();
                        let mut closed = false;
                        for n in chars.by_ref() {
                            if n == '}' {
                                closed = true;
                                break;
                            }
                            name.push(n);
                        }
                        if !closed {
                            return Err(PathTemplateError::UnclosedVariable(raw.to_string()));
                        }
                        let name = name.trim().to_string();
                        if name.is_empty() {
                            return Err(PathTemplateError::EmptyVariable(raw.to_string()));
                        }
                        literal = false;
                        has_variables = true;
                        parts.push(Part::Variable(name));
                    }
                    other => parts.push(Part::Char(other)),
                }
            }
            segments.push(Segment::Parts(parts));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
            literal,
            has_variables,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when the template contains no wildcards or variables.
    pub fn is_literal(&self) -> bool {
        self.literal
    }

    pub fn has_variables(&self) -> bool {
        self.has_variables
    }

    /// Normalised form of the template, used as the exact-index key.
    pub fn normalized(&self) -> String {
        normalize_path(&self.raw)
    }

    /// Match a request path, returning captured variables on success.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let path_segments: Vec<&str> = split_segments(path).collect();
        let mut matcher = PathMatcher::new(&self.segments, &path_segments);
        if matcher.segments(0, 0) {
            Some(matcher.captures.into_iter().collect())
        } else {
            None
        }
    }

    /// Whether some request path could match both templates.
    pub fn may_intersect(&self, other: &PathTemplate) -> bool {
        if self.literal && other.literal {
            return self.normalized() == other.normalized();
        }
        if self.literal {
            return other.matches(&self.raw).is_some();
        }
        if other.literal {
            return self.matches(&other.raw).is_some();
        }
        SegmentWalker::new(&self.segments, &other.segments).intersects(0, 0)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Walks a request path against a template.
///
/// Failed `(pattern, input)` positions are remembered, so the walk is
/// polynomial even for templates with many `*` or `**`. Captures never
/// influence whether a suffix matches, which keeps the failure memo sound.
struct PathMatcher<'a> {
    pattern: &'a [Segment],
    path: &'a [&'a str],
    failed: HashSet<(usize, usize)>,
    captures: Vec<(String, String)>,
}

impl<'a> PathMatcher<'a> {
    fn new(pattern: &'a [Segment], path: &'a [&'a str]) -> Self {
        Self {
            pattern,
            path,
            failed: HashSet::new(),
            captures: Vec::new(),
        }
    }

    fn segments(&mut self, si: usize, pi: usize) -> bool {
        if self.failed.contains(&(si, pi)) {
            return false;
        }
        let mark = self.captures.len();
        let (pattern, path) = (self.pattern, self.path);
        let matched = match pattern.get(si) {
            None => pi == path.len(),
            // Absorb 0..=n segments, shortest first.
            Some(Segment::AnySegments) => (pi..=path.len()).any(|next| self.segments(si + 1, next)),
            Some(Segment::Parts(parts)) => match path.get(pi) {
                Some(segment) => {
                    let chars: Vec<char> = segment.chars().collect();
                    let mut within = PartMatcher::new(parts, &chars);
                    within.parts(0, 0) && {
                        self.captures.append(&mut within.captures);
                        self.segments(si + 1, pi + 1)
                    }
                }
                None => false,
            },
        };
        if !matched {
            self.captures.truncate(mark);
            self.failed.insert((si, pi));
        }
        matched
    }
}

/// Walks one path segment against the parts of one template segment.
struct PartMatcher<'a> {
    pattern: &'a [Part],
    input: &'a [char],
    failed: HashSet<(usize, usize)>,
    captures: Vec<(String, String)>,
}

impl<'a> PartMatcher<'a> {
    fn new(pattern: &'a [Part], input: &'a [char]) -> Self {
        Self {
            pattern,
            input,
            failed: HashSet::new(),
            captures: Vec::new(),
        }
    }

    fn parts(&mut self, pi: usize, ci: usize) -> bool {
        if self.failed.contains(&(pi, ci)) {
            return false;
        }
        let mark = self.captures.len();
        let (pattern, input) = (self.pattern, self.input);
        let matched = match pattern.get(pi) {
            None => ci == input.len(),
            Some(Part::Char(c)) => input.get(ci) == Some(c) && self.parts(pi + 1, ci + 1),
            Some(Part::AnyChar) => ci < input.len() && self.parts(pi + 1, ci + 1),
            Some(Part::AnyChars) => (ci..=input.len()).any(|next| self.parts(pi + 1, next)),
            Some(Part::Variable(name)) => (ci..=input.len()).any(|next| {
                self.captures
                    .push((name.clone(), input[ci..next].iter().collect()));
                if self.parts(pi + 1, next) {
                    return true;
                }
                self.captures.truncate(mark);
                false
            }),
        };
        if !matched {
            self.captures.truncate(mark);
            self.failed.insert((pi, ci));
        }
        matched
    }
}

/// Memoised walk over two segment lists looking for a common path.
struct SegmentWalker<'a> {
    a: &'a [Segment],
    b: &'a [Segment],
    memo: HashMap<(usize, usize), bool>,
}

impl<'a> SegmentWalker<'a> {
    fn new(a: &'a [Segment], b: &'a [Segment]) -> Self {
        Self {
            a,
            b,
            memo: HashMap::new(),
        }
    }

    fn intersects(&mut self, i: usize, j: usize) -> bool {
        if let Some(&known) = self.memo.get(&(i, j)) {
            return known;
        }
        let result = self.step(i, j);
        self.memo.insert((i, j), result);
        result
    }

    fn step(&mut self, i: usize, j: usize) -> bool {
        let (a, b) = (self.a, self.b);
        match (a.get(i), b.get(j)) {
            (None, None) => true,
            (None, Some(_)) => b[j..].iter().all(|s| *s == Segment::AnySegments),
            (Some(_), None) => a[i..].iter().all(|s| *s == Segment::AnySegments),
            (Some(Segment::AnySegments), Some(_)) => {
                // `**` on the left either ends here or absorbs b[j].
                self.intersects(i + 1, j) || self.intersects(i, j + 1)
            }
            (Some(_), Some(Segment::AnySegments)) => {
                self.intersects(i, j + 1) || self.intersects(i + 1, j)
            }
            (Some(Segment::Parts(pa)), Some(Segment::Parts(pb))) => {
                parts_intersect(pa, pb) && self.intersects(i + 1, j + 1)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Char(char),
    One,
    Many,
}

fn tokens(parts: &[Part]) -> Vec<Token> {
    parts
        .iter()
        .map(|p| match p {
            Part::Char(c) => Token::Char(*c),
            Part::AnyChar => Token::One,
            Part::AnyChars | Part::Variable(_) => Token::Many,
        })
        .collect()
}

/// Whether some single segment matches both part lists.
fn parts_intersect(a: &[Part], b: &[Part]) -> bool {
    let (ta, tb) = (tokens(a), tokens(b));
    let (n, m) = (ta.len(), tb.len());
    // reach[i][j]: prefixes a[..i] and b[..j] can produce a common string.
    let mut reach = vec![vec![false; m + 1]; n + 1];
    reach[0][0] = true;

    for i in 0..=n {
        for j in 0..=m {
            if !reach[i][j] {
                continue;
            }
            let next_a = ta.get(i).copied();
            let next_b = tb.get(j).copied();

            // A `*` may match nothing.
            if next_a == Some(Token::Many) {
                reach[i + 1][j] = true;
            }
            if next_b == Some(Token::Many) {
                reach[i][j + 1] = true;
            }

            // Both sides consume one common character.
            if let (Some(x), Some(y)) = (next_a, next_b) {
                let same_char = match (x, y) {
                    (Token::Char(c), Token::Char(d)) => c == d,
                    _ => true,
                };
                if same_char {
                    let ni = if x == Token::Many { i } else { i + 1 };
                    let nj = if y == Token::Many { j } else { j + 1 };
                    if (ni, nj) != (i, j) {
                        reach[ni][nj] = true;
                    }
                }
            }
        }
    }
    reach[n][m]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn t(s: &str) -> PathTemplate {
        PathTemplate::parse(s).unwrap()
    }

    #[test]
    fn test_parse_flags() {
        assert!(t("/foo/bar").is_literal());
        assert!(!t("/foo/*").is_literal());
        assert!(t("/foo/{id}").has_variables());
        assert!(!t("/foo/**").has_variables());
        assert!(PathTemplate::parse("foo").is_err());
        assert!(PathTemplate::parse("/foo/{id").is_err());
        assert!(PathTemplate::parse("/foo/{}").is_err());
        assert_eq!(t("//foo///bar/").normalized(), "/foo/bar");
        assert_eq!(normalize_path(""), "/");
    }

    #[test]
    fn test_variable_capture() {
        let vars = t("/foo/{x}").matches("/foo/bar").unwrap();
        assert_eq!(vars.get("x").map(String::as_str), Some("bar"));
        assert!(t("/foo/{x}").matches("/foo/bar/baz").is_none());
        assert!(t("/foo/**").matches("/foo/bar/baz").is_some());
        assert!(t("/foo/**").matches("/foo").is_some());

        let vars = t("/users/{id}/posts/{post}.json").matches("/users/7/posts/abc.json").unwrap();
        assert_eq!(vars["id"], "7");
        assert_eq!(vars["post"], "abc");
    }

    #[test]
    fn test_wildcards() {
        assert!(t("/foo/*/1").matches("/foo/bar/1").is_some());
        assert!(t("/foo/*/1").matches("/foo/1").is_none());
        assert!(t("/foo/b?r").matches("/foo/bar").is_some());
        assert!(t("/foo/b?r").matches("/foo/bzr").is_some());
        assert!(t("/foo/b?r").matches("/foo/baz").is_none());
        assert!(t("/**/end").matches("/a/b/c/end").is_some());
        assert!(t("/**/end").matches("/end").is_some());
        assert!(t("/a*c").matches("/abbbc").is_some());
        assert!(t("/a*c").matches("/abbbd").is_none());
    }

    #[test]
    fn test_literal_intersection() {
        assert!(t("/foo").may_intersect(&t("//foo/")));
        assert!(!t("/foo").may_intersect(&t("/bar")));
        assert!(t("/foo/bar").may_intersect(&t("/foo/*")));
        assert!(!t("/foo/bar/baz").may_intersect(&t("/foo/*")));
    }

    #[test]
    fn test_pattern_intersection() {
        assert!(t("/foo/{x}").may_intersect(&t("/foo/*")));
        assert!(t("/foo/**").may_intersect(&t("/foo/{x}/bar")));
        assert!(t("/**").may_intersect(&t("/anything/at/all")));
        assert!(t("/a*").may_intersect(&t("/*b")));
        assert!(t("/a?c").may_intersect(&t("/?b?")));
        assert!(!t("/a*").may_intersect(&t("/b*")));
        assert!(!t("/foo/*/x").may_intersect(&t("/foo/*/y")));
        assert!(!t("/x/**/a").may_intersect(&t("/y/**/a")));
        assert!(t("/**/a").may_intersect(&t("/b/**")));
        assert!(!t("/*/*").may_intersect(&t("/*")));
    }

    #[test]
    fn test_many_wildcards_match_in_bounded_time() {
        let started = Instant::now();

        let stars = t("/*a*a*a*a*a*b");
        let long_segment = format!("/{}", "a".repeat(400));
        assert!(stars.matches(&long_segment).is_none());
        assert!(stars.matches(&format!("{long_segment}b")).is_some());

        let vars = t("/{a}x{b}x{c}x{d}y");
        assert!(vars.matches(&format!("/{}", "x".repeat(150))).is_none());

        let deep = t("/**/a/**/a/**/a/**/b");
        let many_segments = "/a".repeat(200);
        assert!(deep.matches(&many_segments).is_none());
        assert!(deep.matches(&format!("{many_segments}/b")).is_some());

        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
