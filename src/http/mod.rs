//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, body buffering)
//!     → request.rs (RequestContext: request ID, query, headers, attributes)
//!     → [dispatch layer routes and schedules]
//!     → response.rs (committed at most once)
//!     → Send to client
//! ```

pub mod media_type;
pub mod request;
pub mod response;
pub mod server;
pub mod static_content;

pub use media_type::MediaType;
pub use request::{RequestContext, X_REQUEST_ID};
pub use response::ResponseWriter;
pub use server::HttpServer;
