//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! RequestContext
//!     → dispatcher.rs (scheduler selection, hooks, submission)
//!     → scheduler worker: route handler → callbacks
//!     → exception.rs (unhandled errors → structured error body)
//!     → CompletionSignal resolves
//! ```
//!
//! # Outcomes
//! | Case                         | Status | Outcome       |
//! |------------------------------|--------|---------------|
//! | no route                     | 404    | `NotFound`    |
//! | scheduler rejects            | 429    | `Rejected`    |
//! | waited past admission timeout| 500    | `TimedOut`    |
//! | handler error, unhandled     | 4xx/5xx| `Failed`      |
//! | hook vetoes                  | 200    | `Dropped`     |
//! | shutting down                | 503    | `ShutDown`    |

pub mod dispatcher;
pub mod error;
pub mod exception;
pub mod hooks;

pub use dispatcher::{Dispatcher, DispatcherBuilder, DEFAULT_SCHEDULER};
pub use error::HandlerError;
pub use exception::ExceptionHandler;
pub use hooks::RequestTaskHook;
