//! Response writer.
//!
//! # Responsibilities
//! - Collect status, headers and body for a single exchange
//! - Enforce "respond at most once" via an atomic commit flag
//! - Hand the committed response back to the HTTP front end
//!
//! # Design Decisions
//! - Headers set before commit are merged into the committed response
//! - A second `send` is a no-op that reports `false`, never a panic

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// A response that has been committed and is ready to be written out.
#[derive(Debug, Clone)]
pub struct CommittedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl IntoResponse for CommittedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[derive(Debug)]
struct Pending {
    status: StatusCode,
    headers: HeaderMap,
}

/// Write side of a request/response exchange.
#[derive(Debug)]
pub struct ResponseWriter {
    committed: AtomicBool,
    pending: Mutex<Pending>,
    sent: Mutex<Option<CommittedResponse>>,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self {
            committed: AtomicBool::new(false),
            pending: Mutex::new(Pending {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
            }),
            sent: Mutex::new(None),
        }
    }

    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::Acquire)
    }

    /// Status used by [`send_body`](Self::send_body). Ignored after commit.
    pub fn set_status(&self, status: StatusCode) {
        self.pending.lock().expect("response mutex poisoned").status = status;
    }

    /// Set (replace) a header on the pending response. Ignored after commit.
    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        self.pending
            .lock()
            .expect("response mutex poisoned")
            .headers
            .insert(name, value);
    }

    /// Commit with the pending status.
    pub fn send_body(&self, body: impl Into<Bytes>) -> bool {
        let status = self.pending.lock().expect("response mutex poisoned").status;
        self.send(status, body)
    }

    /// Commit the response. Returns `false` if it was already committed.
    pub fn send(&self, status: StatusCode, body: impl Into<Bytes>) -> bool {
        if self
            .committed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let headers = std::mem::take(
            &mut self.pending.lock().expect("response mutex poisoned").headers,
        );
        *self.sent.lock().expect("response mutex poisoned") = Some(CommittedResponse {
            status,
            headers,
            body: body.into(),
        });
        true
    }

    /// Commit a JSON body, setting `content-type` unless already present.
    pub fn send_json<T: Serialize>(&self, status: StatusCode, value: &T) -> bool {
        let body = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize response body");
                return self.send(StatusCode::INTERNAL_SERVER_ERROR, Bytes::new());
            }
        };
        {
            let mut pending = self.pending.lock().expect("response mutex poisoned");
            pending
                .headers
                .entry(header::CONTENT_TYPE)
                .or_insert(HeaderValue::from_static("application/json"));
        }
        self.send(status, body)
    }

    /// Status of the committed response, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.sent
            .lock()
            .expect("response mutex poisoned")
            .as_ref()
            .map(|r| r.status)
    }

    /// Take the committed response for writing to the wire.
    pub fn take(&self) -> Option<CommittedResponse> {
        self.sent.lock().expect("response mutex poisoned").take()
    }
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new()
    }
}
