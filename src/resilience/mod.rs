//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher → TimeoutScheduler::schedule (stamp enqueue time)
//!     → inner scheduler queues the task
//!     → worker picks it up
//!     → timeouts.rs: waited > timeout ? fail fast (500) : run handler
//! ```
//!
//! # Design Decisions
//! - Admission control, not execution control: a late task is failed before
//!   it starts rather than cancelled midway
//! - Composable: the decorator is itself a `Scheduler`

pub mod timeouts;

pub use timeouts::TimeoutScheduler;
