//! Route mappings.
//!
//! A [`Mapping`] is the immutable description of which requests a route
//! accepts. Equality and display are structural over the raw expressions;
//! the compiled predicates are derived from them.

use std::fmt;

use axum::http::Method;
use thiserror::Error;

use crate::http::request::RequestContext;
use crate::routing::expression::{ExpressionError, MediaTypeExpression, NameValueExpression};
use crate::routing::matcher::{
    ConsumesPredicate, HeadersPredicate, MethodPredicate, ParamsPredicate, PathPredicate,
    Predicate, PredicateKind, ProducesPredicate,
};
use crate::routing::path::{PathTemplate, PathTemplateError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error(transparent)]
    Path(#[from] PathTemplateError),

    #[error(transparent)]
    Expression(#[from] ExpressionError),
}

/// What a route matches.
#[derive(Debug, Clone)]
pub struct Mapping {
    name: Option<String>,
    paths: Vec<String>,
    methods: Vec<Method>,
    params: Vec<String>,
    headers: Vec<String>,
    consumes: Vec<String>,
    produces: Vec<String>,
    /// Compiled predicates, cheapest first.
    predicates: Vec<Predicate>,
    /// Normalised paths when every template is a literal.
    literal_paths: Option<Vec<String>>,
}

impl Mapping {
    pub fn builder() -> MappingBuilder {
        MappingBuilder::default()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn consumes(&self) -> &[String] {
        &self.consumes
    }

    pub fn produces(&self) -> &[String] {
        &self.produces
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn predicate(&self, kind: PredicateKind) -> Option<&Predicate> {
        self.predicates.iter().find(|p| p.kind() == kind)
    }

    /// Keys for the exact-path index, or `None` if any template has wildcards
    /// (or there are no templates at all).
    pub fn literal_paths(&self) -> Option<&[String]> {
        self.literal_paths.as_deref()
    }

    /// Returns true if every predicate accepts the request.
    pub fn test(&self, ctx: &RequestContext) -> bool {
        self.predicates.iter().all(|p| p.test(ctx))
    }

    /// Label for logs and metrics.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.to_string(),
        }
    }
}

impl PartialEq for Mapping {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.paths == other.paths
            && self.methods == other.methods
            && self.params == other.params
            && self.headers == other.headers
            && self.consumes == other.consumes
            && self.produces == other.produces
    }
}

impl Eq for Mapping {}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        if let Some(name) = &self.name {
            write!(f, "name={}, ", name)?;
        }
        write!(f, "paths={:?}", self.paths)?;
        let methods: Vec<&str> = self.methods.iter().map(Method::as_str).collect();
        write!(f, ", methods={:?}", methods)?;
        for (label, values) in [
            ("params", &self.params),
            ("headers", &self.headers),
            ("consumes", &self.consumes),
            ("produces", &self.produces),
        ] {
            if !values.is_empty() {
                write!(f, ", {}={:?}", label, values)?;
            }
        }
        write!(f, "}}")
    }
}

/// Builder for [`Mapping`].
#[derive(Debug, Clone, Default)]
pub struct MappingBuilder {
    name: Option<String>,
    paths: Vec<String>,
    methods: Vec<Method>,
    params: Vec<String>,
    headers: Vec<String>,
    consumes: Vec<String>,
    produces: Vec<String>,
}

impl MappingBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }

    pub fn paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods.extend(methods);
        self
    }

    pub fn param(mut self, expression: impl Into<String>) -> Self {
        self.params.push(expression.into());
        self
    }

    pub fn header(mut self, expression: impl Into<String>) -> Self {
        self.headers.push(expression.into());
        self
    }

    pub fn consumes(mut self, expression: impl Into<String>) -> Self {
        self.consumes.push(expression.into());
        self
    }

    pub fn produces(mut self, expression: impl Into<String>) -> Self {
        self.produces.push(expression.into());
        self
    }

    /// Compile the expressions into predicates.
    pub fn build(self) -> Result<Mapping, MappingError> {
        let templates = self
            .paths
            .iter()
            .map(|p| PathTemplate::parse(p))
            .collect::<Result<Vec<_>, _>>()?;

        let literal_paths = if !templates.is_empty() && templates.iter().all(PathTemplate::is_literal)
        {
            let mut keys: Vec<String> = templates.iter().map(PathTemplate::normalized).collect();
            keys.dedup();
            Some(keys)
        } else {
            None
        };

        let params = self
            .params
            .iter()
            .map(|e| NameValueExpression::parse(e, false))
            .collect::<Result<Vec<_>, _>>()?;
        let headers = self
            .headers
            .iter()
            .map(|e| NameValueExpression::parse(e, true))
            .collect::<Result<Vec<_>, _>>()?;
        let consumes = self
            .consumes
            .iter()
            .map(|e| MediaTypeExpression::parse(e))
            .collect::<Result<Vec<_>, _>>()?;
        let produces = self
            .produces
            .iter()
            .map(|e| MediaTypeExpression::parse(e))
            .collect::<Result<Vec<_>, _>>()?;

        // Cheap checks first; path and produces attach request attributes.
        let predicates: Vec<Predicate> = [
            MethodPredicate::parse_from(&self.methods).map(Predicate::Method),
            ParamsPredicate::parse_from(params).map(Predicate::Params),
            HeadersPredicate::parse_from(headers).map(Predicate::Headers),
            ConsumesPredicate::parse_from(consumes).map(Predicate::Consumes),
            PathPredicate::parse_from(templates).map(Predicate::Path),
            ProducesPredicate::parse_from(produces).map(Predicate::Produces),
        ]
        .into_iter()
        .flatten()
        .collect();

        Ok(Mapping {
            name: self.name,
            paths: self.paths,
            methods: self.methods,
            params: self.params,
            headers: self.headers,
            consumes: self.consumes,
            produces: self.produces,
            predicates,
            literal_paths,
        })
    }
}
