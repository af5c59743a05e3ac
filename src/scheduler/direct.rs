//! Direct scheduler: every task is spawned onto the runtime immediately.
//!
//! Used for cheap, non-blocking handlers that should stay on the I/O side.
//! Never queues, so it only rejects once shut down.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::Notify;

use crate::scheduler::task::RequestTask;
use crate::scheduler::{RejectReason, ScheduleError, Scheduler};

#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

#[derive(Debug)]
pub struct DirectScheduler {
    name: String,
    closed: AtomicBool,
    in_flight: Arc<InFlight>,
}

impl DirectScheduler {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            closed: AtomicBool::new(false),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::Acquire)
    }
}

impl Scheduler for DirectScheduler {
    fn name(&self) -> &str {
        &self.name
    }

    fn schedule(&self, task: RequestTask) -> Result<(), ScheduleError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ScheduleError::rejected(&self.name, RejectReason::ShuttingDown, task));
        }
        let in_flight = self.in_flight.clone();
        in_flight.count.fetch_add(1, Ordering::AcqRel);
        tokio::spawn(async move {
            task.run().await;
            if in_flight.count.fetch_sub(1, Ordering::AcqRel) == 1 {
                in_flight.idle.notify_waiters();
            }
        });
        Ok(())
    }

    fn shutdown(&self, timeout: Duration) -> BoxFuture<'_, Vec<RequestTask>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::Release);
            let drained = async {
                loop {
                    let idle = self.in_flight.idle.notified();
                    if self.in_flight() == 0 {
                        break;
                    }
                    idle.await;
                }
            };
            if tokio::time::timeout(timeout, drained).await.is_err() {
                tracing::warn!(
                    scheduler = %self.name,
                    in_flight = self.in_flight(),
                    "Direct scheduler still busy after drain timeout"
                );
            }
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::RequestContext;
    use crate::scheduler::task::{completion, DispatchOutcome};
    use axum::http::Method;

    #[tokio::test]
    async fn test_spawns_and_rejects_after_shutdown() {
        let scheduler = DirectScheduler::new("io");
        let ctx = Arc::new(RequestContext::new(Method::GET, "/ping"));
        let (completer, signal) = completion();
        let done = completer.clone();
        scheduler
            .schedule(RequestTask::new(ctx.clone(), completer, async move {
                done.complete(DispatchOutcome::Completed);
            }))
            .unwrap();
        assert_eq!(signal.await, DispatchOutcome::Completed);

        assert!(scheduler.shutdown(Duration::from_millis(100)).await.is_empty());
        assert_eq!(scheduler.in_flight(), 0);

        let (completer, _signal) = completion();
        let err = scheduler
            .schedule(RequestTask::new(ctx, completer, async {}))
            .unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::Rejected { reason: RejectReason::ShuttingDown, .. }
        ));
    }
}
