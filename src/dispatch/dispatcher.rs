//! Request dispatcher.
//!
//! # Responsibilities
//! - Pick the scheduler for a request (fixed or per-route mode)
//! - Build the request task, pass it through the hook chain, submit it
//! - Drive the handler chain on the worker:
//!   handler → error callback → completion callback → response
//! - Answer rejection (429), no match (404) and shutdown (503)
//! - Drain every scheduler on shutdown
//!
//! # States
//! ```text
//! Routing ──▶ Executing ──ok──▶ Completing ──▶ Done
//!    │            │                 ▲
//!    │            └─err─▶ ErrorHandling
//!    └─no match─────────────────────────────▶ Done
//! ```
//! In fixed mode (every route on the default scheduler) `Routing` runs on
//! the worker. In per-route mode it runs before scheduling and the task
//! starts in `Executing`.
//!
//! # Design Decisions
//! - Handler and callback panics become `HandlerError::Panicked`
//! - The completion signal is resolved exactly once on every path
//! - Errors raised while another error is outstanding are logged and dropped

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::StatusCode;
use dashmap::DashMap;
use futures_util::future::join_all;
use futures_util::FutureExt;

use crate::dispatch::error::HandlerError;
use crate::dispatch::exception::{send_error, ExceptionHandler};
use crate::dispatch::hooks::RequestTaskHook;
use crate::http::request::RequestContext;
use crate::observability::metrics;
use crate::routing::route::Route;
use crate::routing::router::RouteRegistry;
use crate::scheduler::task::{completion, Completer, CompletionSignal, DispatchOutcome, RequestTask};
use crate::scheduler::Scheduler;

/// Scheduler used by routes that do not name one.
pub const DEFAULT_SCHEDULER: &str = "biz";

const SHUTTING_DOWN: &str = "server shutting down";

/// Drain bound for a scheduler replaced through `add_scheduler`.
const RETIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
enum DispatchState {
    Routing,
    Executing(Arc<Route>),
    ErrorHandling(Arc<Route>, HandlerError),
    Completing(Arc<Route>, Option<HandlerError>),
    Done(DispatchOutcome),
}

/// State shared with tasks running on workers.
#[derive(Debug)]
struct Executor {
    registry: Arc<RouteRegistry>,
    exception_handler: ExceptionHandler,
}

impl Executor {
    async fn execute(
        self: Arc<Self>,
        ctx: Arc<RequestContext>,
        completer: Arc<Completer>,
        route: Option<Arc<Route>>,
    ) {
        let mut state = match route {
            Some(route) => DispatchState::Executing(route),
            None => DispatchState::Routing,
        };

        loop {
            state = match state {
                DispatchState::Routing => match self.registry.route(&ctx) {
                    Some(route) => DispatchState::Executing(route),
                    None => DispatchState::Done(not_found(&ctx)),
                },
                DispatchState::Executing(route) => match invoke(&route, &ctx).await {
                    Ok(()) => match run_success(&route, &ctx) {
                        Ok(()) => DispatchState::Completing(route, None),
                        Err(e) => DispatchState::ErrorHandling(route, e),
                    },
                    Err(e) => DispatchState::ErrorHandling(route, e),
                },
                DispatchState::ErrorHandling(route, error) => {
                    let outstanding = run_error(&route, &ctx, error);
                    DispatchState::Completing(route, outstanding)
                }
                DispatchState::Completing(route, outstanding) => {
                    let raised = route.notify_complete(&ctx, outstanding.as_ref());
                    DispatchState::Done(self.finish(&ctx, outstanding.or(raised)))
                }
                DispatchState::Done(outcome) => {
                    completer.complete(outcome);
                    break;
                }
            };
        }
    }

    fn finish(&self, ctx: &RequestContext, error: Option<HandlerError>) -> DispatchOutcome {
        match error {
            Some(error) => DispatchOutcome::Failed(self.exception_handler.handle(ctx, &error)),
            None => {
                if !ctx.response().is_committed() {
                    ctx.response().send_body(Bytes::new());
                }
                DispatchOutcome::Completed
            }
        }
    }
}

async fn invoke(route: &Route, ctx: &Arc<RequestContext>) -> Result<(), HandlerError> {
    let Some(handler) = route.handler() else {
        return Ok(());
    };
    let future = match panic::catch_unwind(AssertUnwindSafe(|| handler.call(ctx.clone()))) {
        Ok(future) => future,
        Err(payload) => return Err(HandlerError::from_panic(payload)),
    };
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(HandlerError::from_panic(payload)))
}

fn guarded(f: impl FnOnce() -> Result<(), HandlerError>) -> Result<(), HandlerError> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|p| Err(HandlerError::from_panic(p)))
}

fn run_success(route: &Route, ctx: &RequestContext) -> Result<(), HandlerError> {
    match route.on_success() {
        Some(callback) => guarded(|| callback(ctx)),
        None => Ok(()),
    }
}

/// Returns the error still outstanding after the route's error callback.
fn run_error(route: &Route, ctx: &RequestContext, error: HandlerError) -> Option<HandlerError> {
    let Some(callback) = route.on_error() else {
        return Some(error);
    };
    match guarded(|| callback(ctx, &error)) {
        Ok(()) => {
            tracing::debug!(request_id = %ctx.id(), error = %error, "Error handled by route");
            None
        }
        Err(raised) => {
            tracing::error!(
                request_id = %ctx.id(),
                route = %route.mapping().label(),
                error = %raised,
                original = %error,
                "Error callback failed while handling another error"
            );
            Some(error)
        }
    }
}

fn not_found(ctx: &RequestContext) -> DispatchOutcome {
    tracing::debug!(
        request_id = %ctx.id(),
        method = %ctx.method(),
        path = %ctx.path(),
        "No route matched"
    );
    send_error(
        ctx,
        StatusCode::NOT_FOUND,
        &format!("no route matches {} {}", ctx.method(), ctx.path()),
    );
    DispatchOutcome::NotFound
}

/// Routes requests to schedulers and runs their handler chains.
pub struct Dispatcher {
    executor: Arc<Executor>,
    schedulers: DashMap<String, Arc<dyn Scheduler>>,
    default_scheduler: String,
    hooks: Vec<Arc<dyn RequestTaskHook>>,
    rejected: AtomicU64,
    accepting: AtomicBool,
}

impl Dispatcher {
    pub fn builder(registry: Arc<RouteRegistry>) -> DispatcherBuilder {
        DispatcherBuilder {
            registry,
            schedulers: Vec::new(),
            default_scheduler: DEFAULT_SCHEDULER.to_string(),
            hooks: Vec::new(),
            exception_handler: ExceptionHandler::default(),
        }
    }

    pub fn registry(&self) -> &Arc<RouteRegistry> {
        &self.executor.registry
    }

    pub fn default_scheduler(&self) -> &str {
        &self.default_scheduler
    }

    /// Add or replace a scheduler. Returns the one previously registered
    /// under the same name.
    ///
    /// A replaced scheduler stops accepting work and is drained in the
    /// background; tasks it never started get a 503. Outside a tokio
    /// runtime the caller must shut the returned scheduler down.
    pub fn add_scheduler(
        &self,
        name: impl Into<String>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Option<Arc<dyn Scheduler>> {
        let name = name.into();
        tracing::info!(scheduler = %name, "Scheduler added");
        let replaced = self.schedulers.insert(name.clone(), scheduler)?;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::info!(scheduler = %name, "Draining replaced scheduler");
                handle.spawn(drain(name, replaced.clone(), RETIRE_TIMEOUT));
            }
            Err(_) => tracing::warn!(
                scheduler = %name,
                "Replaced scheduler not drained: no runtime"
            ),
        }
        Some(replaced)
    }

    pub fn schedulers(&self) -> HashMap<String, Arc<dyn Scheduler>> {
        self.schedulers
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Number of tasks rejected by schedulers since startup.
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    fn scheduler(&self, name: &str) -> Option<Arc<dyn Scheduler>> {
        self.schedulers.get(name).map(|e| e.value().clone())
    }

    fn scheduler_for(&self, route: &Route) -> Option<Arc<dyn Scheduler>> {
        match route.scheduler() {
            Some(name) => self.scheduler(name).or_else(|| {
                tracing::warn!(
                    route = %route.mapping().label(),
                    scheduler = %name,
                    fallback = %self.default_scheduler,
                    "Unknown scheduler; using default"
                );
                self.scheduler(&self.default_scheduler)
            }),
            None => self.scheduler(&self.default_scheduler),
        }
    }

    /// Dispatch a request. The returned signal resolves once the request's
    /// handler chain has run and a response is committed.
    pub fn dispatch(&self, ctx: Arc<RequestContext>) -> CompletionSignal {
        let (completer, signal) = completion();

        if !self.is_accepting() {
            send_error(&ctx, StatusCode::SERVICE_UNAVAILABLE, SHUTTING_DOWN);
            completer.complete(DispatchOutcome::ShutDown);
            return signal;
        }

        // Fixed mode defers routing to the worker.
        let fixed = self.registry().all_bound_to(&self.default_scheduler);
        let (scheduler, route) = if fixed {
            (self.scheduler(&self.default_scheduler), None)
        } else {
            match self.registry().route(&ctx) {
                Some(route) => (self.scheduler_for(&route), Some(route)),
                None => {
                    completer.complete(not_found(&ctx));
                    return signal;
                }
            }
        };

        let Some(scheduler) = scheduler else {
            tracing::error!(
                request_id = %ctx.id(),
                scheduler = %self.default_scheduler,
                "No scheduler available"
            );
            send_error(&ctx, StatusCode::INTERNAL_SERVER_ERROR, "no scheduler available");
            completer.complete(DispatchOutcome::Failed(StatusCode::INTERNAL_SERVER_ERROR));
            return signal;
        };

        let work = self
            .executor
            .clone()
            .execute(ctx.clone(), completer.clone(), route.clone());
        let mut task = RequestTask::new(ctx.clone(), completer.clone(), work);
        if let Some(route) = route.clone() {
            task = task.with_route(route);
        }

        let Some(task) = self.apply_hooks(task, &ctx, &completer, route.as_deref()) else {
            return signal;
        };

        tracing::debug!(
            request_id = %ctx.id(),
            scheduler = %scheduler.name(),
            fixed,
            "Scheduling request"
        );

        if let Err(e) = scheduler.schedule(task) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            metrics::record_rejected(scheduler.name());
            tracing::warn!(request_id = %ctx.id(), error = %e, "Task rejected");
            let message = e.to_string();
            e.into_task()
                .fail(StatusCode::TOO_MANY_REQUESTS, message, DispatchOutcome::Rejected);
        }
        signal
    }

    /// Run the hook chain. A resolved route still gets its completion
    /// callback when a hook vetoes or panics.
    fn apply_hooks(
        &self,
        mut task: RequestTask,
        ctx: &RequestContext,
        completer: &Completer,
        route: Option<&Route>,
    ) -> Option<RequestTask> {
        for hook in &self.hooks {
            match panic::catch_unwind(AssertUnwindSafe(|| hook.apply(task))) {
                Ok(Some(next)) => task = next,
                Ok(None) => {
                    tracing::debug!(request_id = %ctx.id(), "Request dropped by task hook");
                    if let Some(error) = route.and_then(|r| r.notify_complete(ctx, None)) {
                        let status = self.executor.exception_handler.handle(ctx, &error);
                        completer.complete(DispatchOutcome::Failed(status));
                        return None;
                    }
                    if !ctx.response().is_committed() {
                        ctx.response().send_body(Bytes::new());
                    }
                    completer.complete(DispatchOutcome::Dropped);
                    return None;
                }
                Err(payload) => {
                    let error = HandlerError::from_panic(payload);
                    if let Some(route) = route {
                        route.notify_complete(ctx, Some(&error));
                    }
                    let status = self.executor.exception_handler.handle(ctx, &error);
                    completer.complete(DispatchOutcome::Failed(status));
                    return None;
                }
            }
        }
        Some(task)
    }

    /// Stop accepting requests and drain every scheduler concurrently.
    ///
    /// Tasks that never started within `drain_timeout` get a 503. Returns
    /// once every drain has finished. Later calls return immediately.
    pub async fn shutdown(&self, drain_timeout: Duration) {
        if !self.accepting.swap(false, Ordering::AcqRel) {
            return;
        }
        tracing::info!(
            schedulers = self.schedulers.len(),
            drain_timeout_ms = drain_timeout.as_millis() as u64,
            "Dispatcher shutting down"
        );

        let drains = self
            .schedulers()
            .into_iter()
            .map(|(name, scheduler)| tokio::spawn(drain(name, scheduler, drain_timeout)));

        for result in join_all(drains).await {
            match result {
                Ok((name, 0)) => tracing::info!(scheduler = %name, "Scheduler drained"),
                Ok((name, count)) => tracing::warn!(
                    scheduler = %name,
                    failed = count,
                    "Scheduler drained with unstarted tasks"
                ),
                Err(e) => tracing::error!(error = %e, "Scheduler drain task failed"),
            }
        }
    }
}

/// Shut one scheduler down and answer its unstarted tasks with 503.
async fn drain(name: String, scheduler: Arc<dyn Scheduler>, timeout: Duration) -> (String, usize) {
    let leftover = scheduler.shutdown(timeout).await;
    let count = leftover.len();
    for task in leftover {
        task.fail(StatusCode::SERVICE_UNAVAILABLE, SHUTTING_DOWN, DispatchOutcome::ShutDown);
    }
    (name, count)
}

pub struct DispatcherBuilder {
    registry: Arc<RouteRegistry>,
    schedulers: Vec<Arc<dyn Scheduler>>,
    default_scheduler: String,
    hooks: Vec<Arc<dyn RequestTaskHook>>,
    exception_handler: ExceptionHandler,
}

impl DispatcherBuilder {
    /// Register a scheduler under its own name.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.schedulers.push(scheduler);
        self
    }

    pub fn default_scheduler(mut self, name: impl Into<String>) -> Self {
        self.default_scheduler = name.into();
        self
    }

    pub fn hook<H: RequestTaskHook + 'static>(mut self, hook: H) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn exception_handler(mut self, handler: ExceptionHandler) -> Self {
        self.exception_handler = handler;
        self
    }

    pub fn build(self) -> Dispatcher {
        let schedulers = DashMap::new();
        for scheduler in self.schedulers {
            schedulers.insert(scheduler.name().to_string(), scheduler);
        }
        Dispatcher {
            executor: Arc::new(Executor {
                registry: self.registry,
                exception_handler: self.exception_handler,
            }),
            schedulers,
            default_scheduler: self.default_scheduler,
            hooks: self.hooks,
            rejected: AtomicU64::new(0),
            accepting: AtomicBool::new(true),
        }
    }
}
