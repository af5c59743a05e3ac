//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{Method, StatusCode};
use futures_util::future::BoxFuture;

use route_dispatch::dispatch::{Dispatcher, HandlerError};
use route_dispatch::http::RequestContext;
use route_dispatch::routing::{Mapping, Route, RouteRegistry};
use route_dispatch::scheduler::{RejectReason, RequestTask, ScheduleError, Scheduler, WorkerPool};

pub fn mapping(path: &str, method: Method) -> Mapping {
    Mapping::builder().path(path).method(method).build().unwrap()
}

/// Route whose handler answers 200 with `body`.
pub fn text_route(path: &str, method: Method, body: &'static str) -> Route {
    Route::builder(mapping(path, method))
        .handler(move |ctx: Arc<RequestContext>| async move {
            ctx.response().send(StatusCode::OK, body);
            Ok::<(), HandlerError>(())
        })
        .build()
}

/// Dispatcher over `registry` with a small "biz" pool as default.
pub fn pool_dispatcher(registry: Arc<RouteRegistry>) -> Dispatcher {
    Dispatcher::builder(registry)
        .scheduler(Arc::new(WorkerPool::new("biz", 2, 16)))
        .build()
}

pub fn get(path: &str) -> Arc<RequestContext> {
    Arc::new(RequestContext::new(Method::GET, path))
}

pub fn request(method: Method, path: &str) -> Arc<RequestContext> {
    Arc::new(RequestContext::new(method, path))
}

pub fn body_text(ctx: &RequestContext) -> String {
    let response = ctx.response().take().expect("response was not committed");
    String::from_utf8(response.body.to_vec()).unwrap()
}

pub fn body_json(ctx: &RequestContext) -> serde_json::Value {
    let response = ctx.response().take().expect("response was not committed");
    serde_json::from_slice(&response.body).unwrap()
}

/// Scheduler that refuses every task.
#[derive(Debug)]
pub struct RejectingScheduler {
    name: String,
}

impl RejectingScheduler {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Scheduler for RejectingScheduler {
    fn name(&self) -> &str {
        &self.name
    }

    fn schedule(&self, task: RequestTask) -> Result<(), ScheduleError> {
        Err(ScheduleError::rejected(&self.name, RejectReason::QueueFull, task))
    }

    fn shutdown(&self, _timeout: Duration) -> BoxFuture<'_, Vec<RequestTask>> {
        Box::pin(async { Vec::new() })
    }
}

/// Scheduler that queues tasks until the test runs them.
#[derive(Debug)]
pub struct ManualScheduler {
    name: String,
    queue: Mutex<VecDeque<RequestTask>>,
}

impl ManualScheduler {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Run the oldest queued task. Returns false if the queue was empty.
    pub async fn run_next(&self) -> bool {
        let task = self.queue.lock().unwrap().pop_front();
        match task {
            Some(task) => {
                task.run().await;
                true
            }
            None => false,
        }
    }
}

impl Scheduler for ManualScheduler {
    fn name(&self) -> &str {
        &self.name
    }

    fn schedule(&self, task: RequestTask) -> Result<(), ScheduleError> {
        self.queue.lock().unwrap().push_back(task);
        Ok(())
    }

    fn shutdown(&self, _timeout: Duration) -> BoxFuture<'_, Vec<RequestTask>> {
        Box::pin(async move { self.queue.lock().unwrap().drain(..).collect() })
    }
}
