//! Per-request context.
//!
//! # Responsibilities
//! - Carry the parsed request (method, path, query, headers, body)
//! - Provide a typed, request-scoped attribute store
//! - Lazily parse and cache the `Accept` header for negotiation
//! - Own the response writer for this exchange
//!
//! # Design Decisions
//! - Shared as `Arc<RequestContext>` between the I/O side and workers
//! - Attributes use interior mutability so predicates can attach data
//!   while only holding `&RequestContext`
//! - Request ID reused from `x-request-id` when present, UUID v4 otherwise

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use axum::body::Bytes;
use axum::http::{header, Extensions, HeaderMap, HeaderName, HeaderValue, Method};
use url::form_urlencoded;
use uuid::Uuid;

use crate::http::media_type::MediaType;
use crate::http::response::ResponseWriter;

/// Header used for request correlation.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Template variables captured by a path predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathVariables(HashMap<String, String>);

impl PathVariables {
    pub fn new(vars: HashMap<String, String>) -> Self {
        Self(vars)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

/// Negotiated media types, most preferred first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompatibleMediaTypes(pub Vec<MediaType>);

/// An inbound request as seen by routing and dispatch.
#[derive(Debug)]
pub struct RequestContext {
    id: String,
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
    attributes: Mutex<Extensions>,
    accept: OnceLock<Vec<MediaType>>,
    response: ResponseWriter,
}

impl RequestContext {
    /// Create a context from a method and a request target (`/path?query`).
    pub fn new(method: Method, target: &str) -> Self {
        Self::builder(method, target).build()
    }

    pub fn builder(method: Method, target: &str) -> RequestContextBuilder {
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p, parse_query(q)),
            None => (target, Vec::new()),
        };
        RequestContextBuilder {
            method,
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// First value of the named header, if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// All values of the named header.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }

    /// First value of the named query parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn param_values(&self, name: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.query.iter().any(|(n, _)| n == name)
    }

    /// Declared content type, `None` when absent or malformed.
    pub fn content_type(&self) -> Option<MediaType> {
        self.header(header::CONTENT_TYPE.as_str())
            .and_then(|v| MediaType::parse(v).ok())
    }

    /// Media types from the `Accept` header, parsed on first use.
    /// A missing or empty header means `*/*`.
    pub fn accepted_media_types(&self) -> &[MediaType] {
        self.accept.get_or_init(|| {
            let parsed: Vec<MediaType> = self
                .header_values(header::ACCEPT.as_str())
                .into_iter()
                .flat_map(MediaType::parse_list)
                .collect();
            if parsed.is_empty() {
                vec![MediaType::all()]
            } else {
                parsed
            }
        })
    }

    pub fn set_attribute<T: Clone + Send + Sync + 'static>(&self, value: T) {
        self.attributes
            .lock()
            .expect("attribute mutex poisoned")
            .insert(value);
    }

    pub fn attribute<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.attributes
            .lock()
            .expect("attribute mutex poisoned")
            .get::<T>()
            .cloned()
    }

    pub fn remove_attribute<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.attributes
            .lock()
            .expect("attribute mutex poisoned")
            .remove::<T>()
    }

    pub fn path_variables(&self) -> Option<PathVariables> {
        self.attribute::<PathVariables>()
    }

    pub fn path_variable(&self, name: &str) -> Option<String> {
        self.path_variables()
            .and_then(|vars| vars.get(name).map(str::to_string))
    }

    pub fn compatible_media_types(&self) -> Option<Vec<MediaType>> {
        self.attribute::<CompatibleMediaTypes>().map(|c| c.0)
    }

    pub fn response(&self) -> &ResponseWriter {
        &self.response
    }
}

/// Builder for [`RequestContext`].
#[derive(Debug)]
pub struct RequestContextBuilder {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
}

impl RequestContextBuilder {
    /// Append a header. Invalid names or values are ignored.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(n), Ok(v)) => {
                self.headers.append(n, v);
            }
            _ => tracing::debug!(header = %name, "Ignoring invalid header"),
        }
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> RequestContext {
        let id = self
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        RequestContext {
            id,
            method: self.method,
            path: self.path,
            query: self.query,
            headers: self.headers,
            body: self.body,
            attributes: Mutex::new(Extensions::new()),
            accept: OnceLock::new(),
            response: ResponseWriter::new(),
        }
    }
}

/// Split a query string into decoded name/value pairs.
fn parse_query(query: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(query.as_bytes()).into_owned().collect()
}
