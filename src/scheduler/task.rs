//! Request tasks and completion signalling.
//!
//! A [`RequestTask`] is the unit of work handed to a scheduler. Every task
//! carries a [`Completer`]; whichever path finishes the request (normal
//! execution, admission timeout, rejection, shutdown drain) resolves it, and
//! only the first resolution counts.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use axum::http::StatusCode;
use futures_util::future::BoxFuture;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::dispatch::error::HandlerError;
use crate::dispatch::exception::send_error;
use crate::http::request::RequestContext;
use crate::observability::metrics;
use crate::routing::route::Route;

/// How a dispatched request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler chain ran and no error was left outstanding.
    Completed,
    /// The handler chain ended with an error; carries the response status.
    Failed(StatusCode),
    NotFound,
    Rejected,
    /// Waited in queue past the scheduler's admission timeout.
    TimedOut,
    /// A task hook vetoed the request.
    Dropped,
    ShutDown,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Completed => "completed",
            DispatchOutcome::Failed(_) => "failed",
            DispatchOutcome::NotFound => "not_found",
            DispatchOutcome::Rejected => "rejected",
            DispatchOutcome::TimedOut => "timed_out",
            DispatchOutcome::Dropped => "dropped",
            DispatchOutcome::ShutDown => "shut_down",
        }
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::Failed(status) => write!(f, "failed ({})", status.as_u16()),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Write side of a completion signal.
#[derive(Debug)]
pub struct Completer {
    tx: Mutex<Option<oneshot::Sender<DispatchOutcome>>>,
    started: Instant,
}

impl Completer {
    /// Resolve the signal. Returns `false` if it was already resolved.
    pub fn complete(&self, outcome: DispatchOutcome) -> bool {
        let Some(tx) = self.tx.lock().expect("completer mutex poisoned").take() else {
            return false;
        };
        metrics::record_outcome(outcome, self.started.elapsed());
        // The receiver may have been dropped by a caller that stopped waiting.
        let _ = tx.send(outcome);
        true
    }

    pub fn is_completed(&self) -> bool {
        self.tx.lock().expect("completer mutex poisoned").is_none()
    }
}

/// Resolves once the request's handler chain has fully run.
///
/// If every [`Completer`] handle is dropped without resolving, the signal
/// resolves to `Failed(500)`.
#[derive(Debug)]
pub struct CompletionSignal {
    rx: oneshot::Receiver<DispatchOutcome>,
}

impl Future for CompletionSignal {
    type Output = DispatchOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(DispatchOutcome::Failed(StatusCode::INTERNAL_SERVER_ERROR)))
    }
}

/// Create a linked completer/signal pair.
pub fn completion() -> (Arc<Completer>, CompletionSignal) {
    let (tx, rx) = oneshot::channel();
    let completer = Arc::new(Completer {
        tx: Mutex::new(Some(tx)),
        started: Instant::now(),
    });
    (completer, CompletionSignal { rx })
}

/// A unit of work bound for a scheduler.
pub struct RequestTask {
    ctx: Arc<RequestContext>,
    completer: Arc<Completer>,
    /// Route resolved before scheduling, if any.
    route: Option<Arc<Route>>,
    work: BoxFuture<'static, ()>,
    created_at: Instant,
}

impl RequestTask {
    pub fn new<F>(ctx: Arc<RequestContext>, completer: Arc<Completer>, work: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            ctx,
            completer,
            route: None,
            work: Box::pin(work),
            created_at: Instant::now(),
        }
    }

    pub fn with_route(mut self, route: Arc<Route>) -> Self {
        self.route = Some(route);
        self
    }

    pub fn context(&self) -> &Arc<RequestContext> {
        &self.ctx
    }

    pub fn completer(&self) -> &Arc<Completer> {
        &self.completer
    }

    pub fn route(&self) -> Option<&Arc<Route>> {
        self.route.as_ref()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Replace the work with a decorated version of itself.
    pub fn wrap<F>(mut self, decorate: F) -> Self
    where
        F: FnOnce(BoxFuture<'static, ()>) -> BoxFuture<'static, ()>,
    {
        let work = std::mem::replace(&mut self.work, Box::pin(async {}));
        self.work = decorate(work);
        self
    }

    /// Execute the task's work.
    pub async fn run(self) {
        self.work.await
    }

    /// Finish the task without running its work.
    ///
    /// Runs the route's completion callback (when a route was resolved),
    /// writes an error response unless one was already committed, then
    /// resolves the completion signal.
    pub fn fail(self, status: StatusCode, message: impl Into<String>, outcome: DispatchOutcome) {
        let message = message.into();
        if let Some(route) = &self.route {
            let error = HandlerError::with_status(status, message.clone());
            route.notify_complete(&self.ctx, Some(&error));
        }
        send_error(&self.ctx, status, &message);
        self.completer.complete(outcome);
    }
}

impl fmt::Debug for RequestTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestTask")
            .field("request_id", &self.ctx.id())
            .field("path", &self.ctx.path())
            .field("route", &self.route.as_ref().map(|r| r.mapping().label()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use futures_util::FutureExt;

    #[tokio::test]
    async fn test_completes_once() {
        let (completer, signal) = completion();
        assert!(completer.complete(DispatchOutcome::Completed));
        assert!(!completer.complete(DispatchOutcome::Rejected));
        assert!(completer.is_completed());
        assert_eq!(signal.await, DispatchOutcome::Completed);
    }

    #[tokio::test]
    async fn test_dropped_completer_resolves_failed() {
        let (completer, signal) = completion();
        drop(completer);
        assert_eq!(
            signal.await,
            DispatchOutcome::Failed(StatusCode::INTERNAL_SERVER_ERROR)
        );
    }

    #[tokio::test]
    async fn test_fail_writes_response() {
        let ctx = Arc::new(RequestContext::new(Method::GET, "/busy"));
        let (completer, signal) = completion();
        let task = RequestTask::new(ctx.clone(), completer, async {
            panic!("work must not run");
        });
        task.fail(StatusCode::TOO_MANY_REQUESTS, "queue full", DispatchOutcome::Rejected);

        assert_eq!(signal.await, DispatchOutcome::Rejected);
        assert_eq!(ctx.response().status(), Some(StatusCode::TOO_MANY_REQUESTS));
    }

    #[tokio::test]
    async fn test_wrap_decorates_work() {
        let ctx = Arc::new(RequestContext::new(Method::GET, "/"));
        let (completer, signal) = completion();
        let inner = completer.clone();
        let task = RequestTask::new(ctx.clone(), completer, async move {
            inner.complete(DispatchOutcome::Completed);
        })
        .wrap(|work| {
            async move {
                work.await;
            }
            .boxed()
        });
        task.run().await;
        assert_eq!(signal.await, DispatchOutcome::Completed);
    }
}
