//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → server stops accepting connections
//!             → Dispatcher::shutdown drains every scheduler
//!             → queued tasks past the drain timeout get 503
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has a deadline per scheduler

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
