//! Last-resort exception handling.
//!
//! # Responsibilities
//! - Turn an unhandled `HandlerError` into an error response
//! - Apply an optional user translator to pick the status
//! - Respect "respond at most once": a committed response is only logged
//!
//! # Error Body
//! ```json
//! {"status": 404, "error": "Not Found", "message": "...", "path": "/foo"}
//! ```

use std::fmt;
use std::sync::Arc;

use axum::http::StatusCode;
use serde::Serialize;

use crate::dispatch::error::HandlerError;
use crate::http::request::RequestContext;

/// Maps an error to a custom status; `None` falls back to the default.
pub type StatusTranslator = Arc<dyn Fn(&HandlerError) -> Option<StatusCode> + Send + Sync>;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    status: u16,
    error: &'a str,
    message: &'a str,
    path: &'a str,
}

/// Write a structured error response unless one was already committed.
///
/// Returns `true` if this call committed the response.
pub fn send_error(ctx: &RequestContext, status: StatusCode, message: &str) -> bool {
    if ctx.response().is_committed() {
        return false;
    }
    let body = ErrorBody {
        status: status.as_u16(),
        error: status.canonical_reason().unwrap_or("Unknown"),
        message,
        path: ctx.path(),
    };
    ctx.response().send_json(status, &body)
}

#[derive(Clone, Default)]
pub struct ExceptionHandler {
    translator: Option<StatusTranslator>,
}

impl ExceptionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_translator<F>(translator: F) -> Self
    where
        F: Fn(&HandlerError) -> Option<StatusCode> + Send + Sync + 'static,
    {
        Self {
            translator: Some(Arc::new(translator)),
        }
    }

    /// Status this handler would respond with for `error`.
    pub fn status_for(&self, error: &HandlerError) -> StatusCode {
        self.translator
            .as_ref()
            .and_then(|t| t(error))
            .unwrap_or_else(|| error.status())
    }

    /// Handle an error that escaped the route's own callbacks.
    pub fn handle(&self, ctx: &RequestContext, error: &HandlerError) -> StatusCode {
        let status = self.status_for(error);

        if status.is_server_error() {
            tracing::error!(
                request_id = %ctx.id(),
                path = %ctx.path(),
                status = status.as_u16(),
                error = %error,
                "Request failed"
            );
        } else {
            tracing::warn!(
                request_id = %ctx.id(),
                path = %ctx.path(),
                status = status.as_u16(),
                error = %error,
                "Request rejected by handler"
            );
        }

        if !send_error(ctx, status, &error.to_string()) {
            tracing::debug!(
                request_id = %ctx.id(),
                "Response already committed; error body not written"
            );
        }
        status
    }
}

impl fmt::Debug for ExceptionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionHandler")
            .field("translator", &self.translator.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    #[test]
    fn test_default_statuses_and_body() {
        let handler = ExceptionHandler::new();
        let ctx = RequestContext::new(Method::GET, "/orders/7");
        let status = handler.handle(&ctx, &HandlerError::bad_request("missing field"));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let response = ctx.response().take().unwrap();
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["status"], 400);
        assert_eq!(body["error"], "Bad Request");
        assert_eq!(body["message"], "missing field");
        assert_eq!(body["path"], "/orders/7");
    }

    #[test]
    fn test_translator_overrides_status() {
        let handler = ExceptionHandler::with_translator(|e| match e {
            HandlerError::Internal(m) if m == "gone" => Some(StatusCode::GONE),
            _ => None,
        });
        let ctx = RequestContext::new(Method::GET, "/");
        assert_eq!(handler.handle(&ctx, &HandlerError::internal("gone")), StatusCode::GONE);
        assert_eq!(
            handler.status_for(&HandlerError::internal("other")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_committed_response_is_left_alone() {
        let handler = ExceptionHandler::new();
        let ctx = RequestContext::new(Method::GET, "/");
        ctx.response().send(StatusCode::OK, "done");
        handler.handle(&ctx, &HandlerError::internal("late failure"));
        let response = ctx.response().take().unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], b"done");
    }
}
