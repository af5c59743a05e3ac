//! Admission timeout for scheduled tasks.
//!
//! # Responsibilities
//! - Record when a task was handed to a scheduler
//! - Just before it runs, fail it fast if it waited longer than allowed
//!
//! # Design Decisions
//! - Checked before execution only; a handler that has started is never
//!   interrupted here
//! - Expired tasks get a 500 naming the scheduler and the timeout, and the
//!   handler never runs
//! - Uses `tokio::time::Instant` so paused-clock tests drive it

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::scheduler::task::{DispatchOutcome, RequestTask};
use crate::scheduler::{ScheduleError, Scheduler};

/// Scheduler decorator that enforces a maximum queue wait.
#[derive(Debug)]
pub struct TimeoutScheduler {
    inner: Arc<dyn Scheduler>,
    timeout: Duration,
}

impl TimeoutScheduler {
    pub fn new(inner: Arc<dyn Scheduler>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn inner(&self) -> &Arc<dyn Scheduler> {
        &self.inner
    }
}

impl Scheduler for TimeoutScheduler {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn schedule(&self, task: RequestTask) -> Result<(), ScheduleError> {
        let enqueued = Instant::now();
        let timeout = self.timeout;
        let name = self.inner.name().to_string();
        let ctx = task.context().clone();
        let completer = task.completer().clone();
        let route = task.route().cloned();

        let task = task.wrap(move |work| {
            async move {
                let waited = enqueued.elapsed();
                if waited <= timeout {
                    work.await;
                    return;
                }

                tracing::warn!(
                    request_id = %ctx.id(),
                    scheduler = %name,
                    waited_ms = waited.as_millis() as u64,
                    timeout_ms = timeout.as_millis() as u64,
                    "Task exceeded admission timeout; not executing"
                );
                metrics::record_queue_timeout(&name);

                let message = format!(
                    "request waited {}ms in scheduler '{}' (timeout {}ms)",
                    waited.as_millis(),
                    name,
                    timeout.as_millis()
                );
                // Rebuild a task shell so the shared failure path runs.
                let mut shell = RequestTask::new(ctx, completer, async {});
                if let Some(route) = route {
                    shell = shell.with_route(route);
                }
                shell.fail(StatusCode::INTERNAL_SERVER_ERROR, message, DispatchOutcome::TimedOut);
            }
            .boxed()
        });

        self.inner.schedule(task)
    }

    fn shutdown(&self, timeout: Duration) -> BoxFuture<'_, Vec<RequestTask>> {
        self.inner.shutdown(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::RequestContext;
    use crate::scheduler::task::completion;
    use crate::scheduler::WorkerPool;
    use axum::http::Method;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_runs_within_timeout() {
        let scheduler = TimeoutScheduler::new(
            Arc::new(WorkerPool::new("biz", 1, 4)),
            Duration::from_secs(5),
        );
        let ctx = Arc::new(RequestContext::new(Method::GET, "/fast"));
        let (completer, signal) = completion();
        let done = completer.clone();
        scheduler
            .schedule(RequestTask::new(ctx, completer, async move {
                done.complete(DispatchOutcome::Completed);
            }))
            .unwrap();
        assert_eq!(signal.await, DispatchOutcome::Completed);
        assert_eq!(scheduler.name(), "biz");
    }

    #[tokio::test]
    async fn test_expired_task_never_runs() {
        let scheduler = TimeoutScheduler::new(
            Arc::new(WorkerPool::new("slow", 1, 4)),
            Duration::from_millis(20),
        );

        // Occupy the only worker past the timeout.
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (blocker, _blocker_signal) = completion();
        scheduler
            .schedule(RequestTask::new(
                Arc::new(RequestContext::new(Method::GET, "/block")),
                blocker,
                async move {
                    let _ = release_rx.await;
                },
            ))
            .unwrap();

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let ctx = Arc::new(RequestContext::new(Method::GET, "/late"));
        let (completer, signal) = completion();
        scheduler
            .schedule(RequestTask::new(ctx.clone(), completer, async move {
                flag.store(true, Ordering::SeqCst);
            }))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        release_tx.send(()).unwrap();

        assert_eq!(signal.await, DispatchOutcome::TimedOut);
        assert!(!ran.load(Ordering::SeqCst));

        let response = ctx.response().take().unwrap();
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        let body = String::from_utf8(response.body.to_vec()).unwrap();
        assert!(body.contains("slow"));
        assert!(body.contains("20ms"));
    }
}
