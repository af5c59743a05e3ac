//! Handler error taxonomy.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors raised by handlers and route callbacks.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The request itself was malformed; maps to 400.
    #[error("{0}")]
    BadRequest(String),

    /// An error carrying an explicit response status.
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    /// Generic failure; maps to 500.
    #[error("{0}")]
    Internal(String),

    /// The handler or a callback panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Default response status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HandlerError::Status { status, .. } => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::Panicked(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(HandlerError::bad_request("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            HandlerError::with_status(StatusCode::CONFLICT, "dup").status(),
            StatusCode::CONFLICT
        );
        assert_eq!(HandlerError::internal("boom").status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(HandlerError::from_panic(Box::new("oops")).to_string(), "handler panicked: oops");
    }
}
