//! Request routing and dispatch core.
//!
//! Routes are described by predicate-based mappings, checked for ambiguity
//! at registration, looked up through an exact-path index plus a
//! self-reordering pattern store, and executed on named schedulers with
//! admission timeouts, rejection and graceful shutdown.

pub mod config;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod scheduler;

pub use config::schema::ServerConfig;
pub use dispatch::{Dispatcher, HandlerError};
pub use http::{HttpServer, RequestContext};
pub use lifecycle::Shutdown;
pub use routing::{Mapping, Route, RouteRegistry};
pub use scheduler::{DispatchOutcome, Scheduler};
