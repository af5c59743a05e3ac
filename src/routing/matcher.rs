//! Request predicates.
//!
//! # Responsibilities
//! - Test one axis of a request (method, path, params, headers,
//!   consumes, produces)
//! - Attach derived data on success (path variables, negotiated media types)
//! - Decide whether two predicates of the same kind may match a common request
//!
//! # Design Decisions
//! - Closed set of kinds, so a sum type rather than trait objects
//! - Empty expression lists never produce a predicate (`None` means
//!   "no restriction" and costs nothing at match time)
//! - Predicates of different kinds never rule each other out

use std::collections::HashMap;
use std::fmt;

use axum::http::Method;

use crate::http::media_type::MediaType;
use crate::http::request::{CompatibleMediaTypes, PathVariables, RequestContext};
use crate::routing::expression::{all_compatible, MediaTypeExpression, NameValueExpression};
use crate::routing::path::PathTemplate;

/// Discriminant of a [`Predicate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PredicateKind {
    Method,
    Params,
    Headers,
    Consumes,
    Path,
    Produces,
}

/// One matching rule of a mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Method(MethodPredicate),
    Path(PathPredicate),
    Params(ParamsPredicate),
    Headers(HeadersPredicate),
    Consumes(ConsumesPredicate),
    Produces(ProducesPredicate),
}

impl Predicate {
    pub fn kind(&self) -> PredicateKind {
        match self {
            Predicate::Method(_) => PredicateKind::Method,
            Predicate::Path(_) => PredicateKind::Path,
            Predicate::Params(_) => PredicateKind::Params,
            Predicate::Headers(_) => PredicateKind::Headers,
            Predicate::Consumes(_) => PredicateKind::Consumes,
            Predicate::Produces(_) => PredicateKind::Produces,
        }
    }

    /// Returns true if the request satisfies this predicate.
    pub fn test(&self, ctx: &RequestContext) -> bool {
        match self {
            Predicate::Method(p) => p.test(ctx),
            Predicate::Path(p) => p.test(ctx),
            Predicate::Params(p) => p.test(ctx),
            Predicate::Headers(p) => p.test(ctx),
            Predicate::Consumes(p) => p.test(ctx),
            Predicate::Produces(p) => p.test(ctx),
        }
    }

    /// Whether some request could satisfy both predicates.
    pub fn may_ambiguous_with(&self, other: &Predicate) -> bool {
        match (self, other) {
            (Predicate::Method(a), Predicate::Method(b)) => a.may_ambiguous_with(b),
            (Predicate::Path(a), Predicate::Path(b)) => a.may_ambiguous_with(b),
            (Predicate::Params(a), Predicate::Params(b)) => a.may_ambiguous_with(b),
            (Predicate::Headers(a), Predicate::Headers(b)) => a.may_ambiguous_with(b),
            (Predicate::Consumes(a), Predicate::Consumes(b)) => a.may_ambiguous_with(b),
            (Predicate::Produces(a), Predicate::Produces(b)) => a.may_ambiguous_with(b),
            _ => true,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Method(p) => write!(f, "methods={}", join(&p.methods)),
            Predicate::Path(p) => write!(f, "paths={}", join(&p.templates)),
            Predicate::Params(p) => write!(f, "params={}", join(&p.expressions)),
            Predicate::Headers(p) => write!(f, "headers={}", join(&p.expressions)),
            Predicate::Consumes(p) => write!(f, "consumes={}", join(&p.expressions)),
            Predicate::Produces(p) => write!(f, "produces={}", join(&p.expressions)),
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    let joined: Vec<String> = items.iter().map(ToString::to_string).collect();
    format!("[{}]", joined.join(", "))
}

/// Matches the request method. `HEAD` is accepted wherever `GET` is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodPredicate {
    methods: Vec<Method>,
}

impl MethodPredicate {
    pub fn parse_from(methods: &[Method]) -> Option<Self> {
        let mut unique: Vec<Method> = Vec::with_capacity(methods.len());
        for m in methods {
            if !unique.contains(m) {
                unique.push(m.clone());
            }
        }
        (!unique.is_empty()).then_some(Self { methods: unique })
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    fn accepts(&self, method: &Method) -> bool {
        self.methods.contains(method)
            || (*method == Method::HEAD && self.methods.contains(&Method::GET))
    }

    pub fn test(&self, ctx: &RequestContext) -> bool {
        self.accepts(ctx.method())
    }

    pub fn may_ambiguous_with(&self, other: &MethodPredicate) -> bool {
        self.methods.iter().any(|m| other.accepts(m))
            || other.methods.iter().any(|m| self.accepts(m))
    }
}

/// Matches the request path against one or more templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPredicate {
    templates: Vec<PathTemplate>,
}

impl PathPredicate {
    pub fn parse_from(templates: Vec<PathTemplate>) -> Option<Self> {
        (!templates.is_empty()).then_some(Self { templates })
    }

    pub fn templates(&self) -> &[PathTemplate] {
        &self.templates
    }

    /// Templates without variables win outright. Otherwise variables from every
    /// matching template are merged, first capture wins on a name clash.
    pub fn test(&self, ctx: &RequestContext) -> bool {
        let path = ctx.path();

        if self
            .templates
            .iter()
            .filter(|t| !t.has_variables())
            .any(|t| t.matches(path).is_some())
        {
            ctx.remove_attribute::<PathVariables>();
            return true;
        }

        let mut merged: HashMap<String, String> = HashMap::new();
        let mut matched = false;
        for template in self.templates.iter().filter(|t| t.has_variables()) {
            if let Some(vars) = template.matches(path) {
                matched = true;
                for (name, value) in vars {
                    merged.entry(name).or_insert(value);
                }
            }
        }

        if matched {
            ctx.set_attribute(PathVariables::new(merged));
        }
        matched
    }

    pub fn may_ambiguous_with(&self, other: &PathPredicate) -> bool {
        self.templates
            .iter()
            .any(|a| other.templates.iter().any(|b| a.may_intersect(b)))
    }
}

/// Query parameter expressions, all of which must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamsPredicate {
    expressions: Vec<NameValueExpression>,
}

impl ParamsPredicate {
    pub fn parse_from(expressions: Vec<NameValueExpression>) -> Option<Self> {
        (!expressions.is_empty()).then_some(Self { expressions })
    }

    pub fn test(&self, ctx: &RequestContext) -> bool {
        self.expressions.iter().all(|e| e.test(ctx.param(e.name())))
    }

    pub fn may_ambiguous_with(&self, other: &ParamsPredicate) -> bool {
        all_compatible(&self.expressions, &other.expressions)
    }
}

/// Header expressions, all of which must hold. Names are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersPredicate {
    expressions: Vec<NameValueExpression>,
}

impl HeadersPredicate {
    pub fn parse_from(expressions: Vec<NameValueExpression>) -> Option<Self> {
        (!expressions.is_empty()).then_some(Self { expressions })
    }

    pub fn test(&self, ctx: &RequestContext) -> bool {
        self.expressions.iter().all(|e| e.test(ctx.header(e.name())))
    }

    pub fn may_ambiguous_with(&self, other: &HeadersPredicate) -> bool {
        all_compatible(&self.expressions, &other.expressions)
    }
}

/// Matches the request `Content-Type`; any expression may match.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumesPredicate {
    expressions: Vec<MediaTypeExpression>,
}

impl ConsumesPredicate {
    pub fn parse_from(expressions: Vec<MediaTypeExpression>) -> Option<Self> {
        (!expressions.is_empty()).then_some(Self { expressions })
    }

    pub fn test(&self, ctx: &RequestContext) -> bool {
        let content_type = ctx.content_type().unwrap_or_else(MediaType::octet_stream);
        self.expressions.iter().any(|e| e.includes(&content_type))
    }

    pub fn may_ambiguous_with(&self, other: &ConsumesPredicate) -> bool {
        self.expressions
            .iter()
            .any(|a| other.expressions.iter().any(|b| a.may_overlap(b)))
    }
}

/// Matches the request `Accept` header; any expression may match.
#[derive(Debug, Clone, PartialEq)]
pub struct ProducesPredicate {
    expressions: Vec<MediaTypeExpression>,
}

impl ProducesPredicate {
    pub fn parse_from(expressions: Vec<MediaTypeExpression>) -> Option<Self> {
        (!expressions.is_empty()).then_some(Self { expressions })
    }

    /// On success the negotiated types are stored as [`CompatibleMediaTypes`].
    pub fn test(&self, ctx: &RequestContext) -> bool {
        let accepted = ctx.accepted_media_types();
        if !self.expressions.iter().any(|e| e.compatible_with_any(accepted)) {
            return false;
        }

        let mut compatible = Vec::new();
        for expr in self.expressions.iter().filter(|e| !e.is_negated()) {
            for accept in accepted {
                if accept.is_compatible_with(expr.media_type()) {
                    compatible.push(MediaType::most_specific(accept, expr.media_type()));
                }
            }
        }
        MediaType::sort_by_specificity_and_quality(&mut compatible);

        if compatible.is_empty() {
            ctx.remove_attribute::<CompatibleMediaTypes>();
        } else {
            ctx.set_attribute(CompatibleMediaTypes(compatible));
        }
        true
    }

    pub fn may_ambiguous_with(&self, other: &ProducesPredicate) -> bool {
        self.expressions
            .iter()
            .any(|a| other.expressions.iter().any(|b| a.may_overlap(b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn templates(paths: &[&str]) -> Vec<PathTemplate> {
        paths.iter().map(|p| PathTemplate::parse(p).unwrap()).collect()
    }

    fn nv(exprs: &[&str], ci: bool) -> Vec<NameValueExpression> {
        exprs
            .iter()
            .map(|e| NameValueExpression::parse(e, ci).unwrap())
            .collect()
    }

    fn mte(exprs: &[&str]) -> Vec<MediaTypeExpression> {
        exprs.iter().map(|e| MediaTypeExpression::parse(e).unwrap()).collect()
    }

    #[test]
    fn test_empty_inputs_produce_no_predicate() {
        assert!(MethodPredicate::parse_from(&[]).is_none());
        assert!(PathPredicate::parse_from(vec![]).is_none());
        assert!(ParamsPredicate::parse_from(vec![]).is_none());
        assert!(ConsumesPredicate::parse_from(vec![]).is_none());
        assert!(ProducesPredicate::parse_from(vec![]).is_none());
    }

    #[test]
    fn test_method_predicate() {
        let get = MethodPredicate::parse_from(&[Method::GET, Method::GET]).unwrap();
        assert_eq!(get.methods().len(), 1);
        assert!(get.test(&RequestContext::new(Method::GET, "/")));
        assert!(get.test(&RequestContext::new(Method::HEAD, "/")));
        assert!(!get.test(&RequestContext::new(Method::POST, "/")));

        let post = MethodPredicate::parse_from(&[Method::POST]).unwrap();
        let head = MethodPredicate::parse_from(&[Method::HEAD]).unwrap();
        assert!(!get.may_ambiguous_with(&post));
        assert!(get.may_ambiguous_with(&head));
    }

    #[test]
    fn test_path_predicate_literal_first() {
        let p = PathPredicate::parse_from(templates(&["/foo/{x}", "/foo/bar"])).unwrap();
        let ctx = RequestContext::new(Method::GET, "/foo/bar");
        assert!(p.test(&ctx));
        assert!(ctx.path_variables().is_none());

        let ctx = RequestContext::new(Method::GET, "/foo/baz");
        assert!(p.test(&ctx));
        assert_eq!(ctx.path_variable("x").as_deref(), Some("baz"));
    }

    #[test]
    fn test_path_predicate_merges_variables() {
        let p = PathPredicate::parse_from(templates(&["/{a}/x", "/y/{b}"])).unwrap();
        let ctx = RequestContext::new(Method::GET, "/y/x");
        assert!(p.test(&ctx));
        let vars = ctx.path_variables().unwrap();
        assert_eq!(vars.get("a"), Some("y"));
        assert_eq!(vars.get("b"), Some("x"));
    }

    #[test]
    fn test_params_and_headers() {
        let params = ParamsPredicate::parse_from(nv(&["a=1", "!b"], false)).unwrap();
        assert!(params.test(&RequestContext::new(Method::GET, "/?a=1")));
        assert!(!params.test(&RequestContext::new(Method::GET, "/?a=1&b=2")));
        assert!(!params.test(&RequestContext::new(Method::GET, "/?a=2")));

        let headers = HeadersPredicate::parse_from(nv(&["X-Version=2"], true)).unwrap();
        let ctx = RequestContext::builder(Method::GET, "/")
            .header("x-version", "2")
            .build();
        assert!(headers.test(&ctx));
        assert!(!headers.test(&RequestContext::new(Method::GET, "/")));
    }

    #[test]
    fn test_consumes() {
        let p = ConsumesPredicate::parse_from(mte(&["application/json", "text/*"])).unwrap();
        let json = RequestContext::builder(Method::POST, "/")
            .header("content-type", "application/json; charset=utf-8")
            .build();
        assert!(p.test(&json));
        let plain = RequestContext::builder(Method::POST, "/")
            .header("content-type", "text/plain")
            .build();
        assert!(p.test(&plain));
        assert!(!p.test(&RequestContext::new(Method::POST, "/")));

        let not_xml = ConsumesPredicate::parse_from(mte(&["!application/xml"])).unwrap();
        assert!(not_xml.test(&RequestContext::new(Method::POST, "/")));
    }

    #[test]
    fn test_produces_negotiation() {
        let p = ProducesPredicate::parse_from(mte(&["application/json", "text/plain"])).unwrap();
        let ctx = RequestContext::builder(Method::GET, "/")
            .header("accept", "text/*;q=0.5, application/json;q=0.8")
            .build();
        assert!(p.test(&ctx));
        let negotiated = ctx.compatible_media_types().unwrap();
        let essences: Vec<String> = negotiated.iter().map(|m| m.essence()).collect();
        assert_eq!(essences, vec!["application/json", "text/plain"]);
        assert_eq!(negotiated[0].quality(), 0.8);
        assert_eq!(negotiated[1].quality(), 0.5);

        let html_only = RequestContext::builder(Method::GET, "/")
            .header("accept", "text/html")
            .build();
        assert!(!p.test(&html_only));
    }

    #[test]
    fn test_cross_kind_is_ambiguous() {
        let m = Predicate::Method(MethodPredicate::parse_from(&[Method::GET]).unwrap());
        let p = Predicate::Path(PathPredicate::parse_from(templates(&["/x"])).unwrap());
        assert!(m.may_ambiguous_with(&p));
        assert_eq!(m.kind(), PredicateKind::Method);
        assert_eq!(m.to_string(), "methods=[GET]");
    }
}
