//! Static responses for config-declared routes.
//!
//! A `[[routes]]` entry becomes a [`Route`] whose handler writes a fixed
//! status and body. `{name}` in the body is replaced by the path variable of
//! that name; unknown names are left as written.

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method, StatusCode};
use futures_util::future;
use thiserror::Error;

use crate::config::schema::RouteConfig;
use crate::http::media_type::MediaType;
use crate::http::request::{PathVariables, RequestContext};
use crate::routing::mapping::{Mapping, MappingError};
use crate::routing::route::{Handler, HandlerFuture, Route};

#[derive(Debug, Error)]
pub enum StaticRouteError {
    #[error("route '{route}': {source}")]
    Mapping {
        route: String,
        #[source]
        source: MappingError,
    },

    #[error("route '{route}': invalid method '{method}'")]
    Method { route: String, method: String },

    #[error("route '{route}': invalid status {status}")]
    Status { route: String, status: u16 },

    #[error("route '{route}': invalid content type '{content_type}'")]
    ContentType { route: String, content_type: String },
}

/// Handler that always answers with the same response.
#[derive(Debug, Clone)]
pub struct StaticResponse {
    status: StatusCode,
    body: String,
    content_type: Option<HeaderValue>,
}

impl StaticResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: HeaderValue) -> Self {
        self.content_type = Some(content_type);
        self
    }

    fn content_type_for(&self, ctx: &RequestContext) -> HeaderValue {
        if let Some(value) = &self.content_type {
            return value.clone();
        }
        // First concrete negotiated type, if a produces predicate ran.
        ctx.compatible_media_types()
            .and_then(|types| {
                types
                    .into_iter()
                    .find(|t| !t.is_wildcard_type() && !t.is_wildcard_subtype())
            })
            .and_then(|t: MediaType| HeaderValue::from_str(&t.essence()).ok())
            .unwrap_or_else(|| HeaderValue::from_static("text/plain; charset=utf-8"))
    }
}

impl Handler for StaticResponse {
    fn call(&self, ctx: Arc<RequestContext>) -> HandlerFuture {
        let body = interpolate(&self.body, ctx.path_variables().as_ref());
        let response = ctx.response();
        response.set_header(header::CONTENT_TYPE, self.content_type_for(&ctx));
        response.send(self.status, body);
        Box::pin(future::ready(Ok(())))
    }
}

/// Replace `{name}` placeholders with path variables.
pub fn interpolate(template: &str, vars: Option<&PathVariables>) -> String {
    let Some(vars) = vars.filter(|v| !v.is_empty()) else {
        return template.to_string();
    };

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                match vars.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Build a route from its config entry.
pub fn route_from_config(config: &RouteConfig, index: usize) -> Result<Route, StaticRouteError> {
    let label = config.label(index);

    let methods = config
        .methods
        .iter()
        .map(|m| {
            Method::from_bytes(m.to_ascii_uppercase().as_bytes()).map_err(|_| {
                StaticRouteError::Method {
                    route: label.clone(),
                    method: m.clone(),
                }
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut mapping = Mapping::builder()
        .paths(config.paths.iter().cloned())
        .methods(methods);
    if let Some(name) = &config.name {
        mapping = mapping.name(name.clone());
    }
    for expression in &config.params {
        mapping = mapping.param(expression.clone());
    }
    for expression in &config.headers {
        mapping = mapping.header(expression.clone());
    }
    for expression in &config.consumes {
        mapping = mapping.consumes(expression.clone());
    }
    for expression in &config.produces {
        mapping = mapping.produces(expression.clone());
    }
    let mapping = mapping.build().map_err(|source| StaticRouteError::Mapping {
        route: label.clone(),
        source,
    })?;

    let status =
        StatusCode::from_u16(config.response.status).map_err(|_| StaticRouteError::Status {
            route: label.clone(),
            status: config.response.status,
        })?;
    let mut handler = StaticResponse::new(status, config.response.body.clone());
    if let Some(content_type) = &config.response.content_type {
        let value = HeaderValue::from_str(content_type).map_err(|_| {
            StaticRouteError::ContentType {
                route: label.clone(),
                content_type: content_type.clone(),
            }
        })?;
        handler = handler.with_content_type(value);
    }

    let mut route = Route::builder(mapping).handler(handler);
    if let Some(scheduler) = &config.scheduler {
        route = route.scheduler(scheduler.clone());
    }
    Ok(route.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_interpolate() {
        let vars = PathVariables::new(HashMap::from([("id".to_string(), "42".to_string())]));
        assert_eq!(interpolate("user {id}", Some(&vars)), "user 42");
        assert_eq!(interpolate("{id}/{other}", Some(&vars)), "42/{other}");
        assert_eq!(interpolate("open {id", Some(&vars)), "open {id");
        assert_eq!(interpolate("{id}", None), "{id}");
    }

    #[tokio::test]
    async fn test_route_from_config() {
        let config = RouteConfig {
            name: Some("user".to_string()),
            paths: vec!["/users/{id}".to_string()],
            methods: vec!["get".to_string()],
            produces: vec!["application/json".to_string()],
            response: crate::config::schema::StaticResponseConfig {
                status: 200,
                body: r#"{"id":"{id}"}"#.to_string(),
                content_type: None,
            },
            ..RouteConfig::default()
        };
        let route = route_from_config(&config, 0).unwrap();
        assert_eq!(route.name(), Some("user"));

        let ctx = Arc::new(
            RequestContext::builder(Method::GET, "/users/7")
                .header("accept", "application/json")
                .build(),
        );
        assert!(route.mapping().test(&ctx));
        route.handler().unwrap().call(ctx.clone()).await.unwrap();

        let response = ctx.response().take().unwrap();
        assert_eq!(response.headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(&response.body[..], br#"{"id":"7"}"#);
    }

    #[test]
    fn test_bad_method_is_rejected() {
        let config = RouteConfig {
            methods: vec!["NOT A METHOD".to_string()],
            ..RouteConfig::default()
        };
        assert!(matches!(
            route_from_config(&config, 3),
            Err(StaticRouteError::Method { ref route, .. }) if route == "routes[3]"
        ));
    }
}
