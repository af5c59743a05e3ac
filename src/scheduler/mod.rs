//! Scheduling subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher
//!     → Scheduler::schedule(task)
//!         → pool.rs (bounded queue + N workers)   e.g. "biz"
//!         → direct.rs (spawn immediately)         e.g. "io"
//!     → [optional] resilience::timeouts::TimeoutScheduler decorator
//!
//! Shutdown:
//!     Scheduler::shutdown(timeout)
//!     → stop accepting, wait for workers up to timeout
//!     → return tasks still queued
//! ```
//!
//! # Design Decisions
//! - Admission never blocks: a full queue is an immediate rejection
//! - Rejected tasks are handed back in the error so the caller can fail them
//! - Schedulers are object-safe so they can be decorated and mixed by name

pub mod direct;
pub mod pool;
pub mod task;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::config::schema::{SchedulerConfig, SchedulerKind};
use crate::resilience::timeouts::TimeoutScheduler;

pub use direct::DirectScheduler;
pub use pool::WorkerPool;
pub use task::{completion, Completer, CompletionSignal, DispatchOutcome, RequestTask};

/// A named execution domain for request tasks.
pub trait Scheduler: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Hand a task over for execution. Must not block.
    fn schedule(&self, task: RequestTask) -> Result<(), ScheduleError>;

    /// Stop accepting tasks and wait up to `timeout` for running work.
    /// Returns the tasks that never started.
    fn shutdown(&self, timeout: Duration) -> BoxFuture<'_, Vec<RequestTask>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    QueueFull,
    ShuttingDown,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::QueueFull => f.write_str("queue full"),
            RejectReason::ShuttingDown => f.write_str("shutting down"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("scheduler {scheduler} rejected task: {reason}")]
    Rejected {
        scheduler: String,
        reason: RejectReason,
        task: RequestTask,
    },
}

impl ScheduleError {
    pub fn rejected(scheduler: &str, reason: RejectReason, task: RequestTask) -> Self {
        ScheduleError::Rejected {
            scheduler: scheduler.to_string(),
            reason,
            task,
        }
    }

    /// Give back the task that could not be scheduled.
    pub fn into_task(self) -> RequestTask {
        match self {
            ScheduleError::Rejected { task, .. } => task,
        }
    }
}

/// Build a scheduler from its configuration.
///
/// Must be called from within a tokio runtime (pool workers are spawned).
pub fn from_config(config: &SchedulerConfig) -> Arc<dyn Scheduler> {
    let scheduler: Arc<dyn Scheduler> = match config.kind {
        SchedulerKind::Pool => Arc::new(WorkerPool::new(
            &config.name,
            config.workers,
            config.queue_capacity,
        )),
        SchedulerKind::Direct => Arc::new(DirectScheduler::new(&config.name)),
    };

    match config.timeout_ms {
        Some(ms) => Arc::new(TimeoutScheduler::new(scheduler, Duration::from_millis(ms))),
        None => scheduler,
    }
}
