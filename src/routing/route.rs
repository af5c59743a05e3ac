//! Routes: a mapping bound to a handler, an optional scheduler and
//! lifecycle callbacks.

use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::dispatch::error::HandlerError;
use crate::http::request::RequestContext;
use crate::routing::mapping::Mapping;

pub type HandlerFuture = BoxFuture<'static, Result<(), HandlerError>>;

/// Request handler bound to a route.
///
/// Handlers write their response through [`RequestContext::response`]. A
/// handler that returns `Ok` without committing gets an empty `200 OK`.
pub trait Handler: Send + Sync {
    fn call(&self, ctx: Arc<RequestContext>) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(Arc<RequestContext>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn call(&self, ctx: Arc<RequestContext>) -> HandlerFuture {
        Box::pin(self(ctx))
    }
}

/// Runs after the handler succeeded.
pub type SuccessCallback = Arc<dyn Fn(&RequestContext) -> Result<(), HandlerError> + Send + Sync>;

/// Runs after the handler (or the success callback) failed. Returning `Ok`
/// marks the error as handled.
pub type ErrorCallback =
    Arc<dyn Fn(&RequestContext, &HandlerError) -> Result<(), HandlerError> + Send + Sync>;

/// Runs once per matched request, with the outstanding error if any.
pub type CompletionCallback =
    Arc<dyn Fn(&RequestContext, Option<&HandlerError>) -> Result<(), HandlerError> + Send + Sync>;

pub struct Route {
    mapping: Mapping,
    handler: Option<Arc<dyn Handler>>,
    scheduler: Option<String>,
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
    on_complete: Option<CompletionCallback>,
}

impl Route {
    pub fn builder(mapping: Mapping) -> RouteBuilder {
        RouteBuilder {
            route: Route {
                mapping,
                handler: None,
                scheduler: None,
                on_success: None,
                on_error: None,
                on_complete: None,
            },
        }
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn name(&self) -> Option<&str> {
        self.mapping.name()
    }

    pub fn handler(&self) -> Option<&Arc<dyn Handler>> {
        self.handler.as_ref()
    }

    /// Name of the bound scheduler; `None` means the server default.
    pub fn scheduler(&self) -> Option<&str> {
        self.scheduler.as_deref()
    }

    pub fn on_success(&self) -> Option<&SuccessCallback> {
        self.on_success.as_ref()
    }

    pub fn on_error(&self) -> Option<&ErrorCallback> {
        self.on_error.as_ref()
    }

    pub fn on_complete(&self) -> Option<&CompletionCallback> {
        self.on_complete.as_ref()
    }

    /// Run the completion callback, if any. Errors and panics raised by the
    /// callback while `error` is outstanding are logged and dropped.
    pub(crate) fn notify_complete(
        &self,
        ctx: &RequestContext,
        error: Option<&HandlerError>,
    ) -> Option<HandlerError> {
        let callback = self.on_complete.as_ref()?;
        let result = panic::catch_unwind(AssertUnwindSafe(|| callback(ctx, error)))
            .unwrap_or_else(|payload| Err(HandlerError::from_panic(payload)));
        match result {
            Ok(()) => None,
            Err(e) if error.is_some() => {
                tracing::error!(
                    request_id = %ctx.id(),
                    route = %self.mapping.label(),
                    error = %e,
                    "Completion callback failed while handling another error"
                );
                None
            }
            Err(e) => Some(e),
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("mapping", &self.mapping.to_string())
            .field("scheduler", &self.scheduler)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

pub struct RouteBuilder {
    route: Route,
}

impl RouteBuilder {
    pub fn handler<H: Handler + 'static>(mut self, handler: H) -> Self {
        self.route.handler = Some(Arc::new(handler));
        self
    }

    pub fn scheduler(mut self, name: impl Into<String>) -> Self {
        self.route.scheduler = Some(name.into());
        self
    }

    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RequestContext) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.route.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RequestContext, &HandlerError) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.route.on_error = Some(Arc::new(callback));
        self
    }

    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RequestContext, Option<&HandlerError>) -> Result<(), HandlerError>
            + Send
            + Sync
            + 'static,
    {
        self.route.on_complete = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> Route {
        self.route
    }
}
