//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build schedulers, the route registry and the dispatcher from config
//! - Create the Axum router: every request goes to one fallback handler
//! - Buffer the body, build a `RequestContext`, dispatch, await completion
//! - Write the committed response with `x-request-id`
//! - Serve with graceful shutdown and drain the dispatcher

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::http::request::{RequestContext, X_REQUEST_ID};
use crate::http::static_content::{route_from_config, StaticRouteError};
use crate::routing::router::{RegistryError, RouteRegistry};
use crate::scheduler;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Route(#[from] StaticRouteError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub max_body_bytes: usize,
}

/// HTTP front end for the dispatcher.
pub struct HttpServer {
    router: Router,
    dispatcher: Arc<Dispatcher>,
    drain_timeout: Duration,
}

impl HttpServer {
    /// Build every subsystem from configuration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: ServerConfig) -> Result<Self, StartupError> {
        let registry = Arc::new(RouteRegistry::with_options(
            config.dispatch.check_ambiguity,
            config.dispatch.reorder.policy(),
        ));

        let mut builder = Dispatcher::builder(registry.clone())
            .default_scheduler(config.dispatch.default_scheduler.clone());
        for scheduler_config in &config.schedulers {
            builder = builder.scheduler(scheduler::from_config(scheduler_config));
        }
        let dispatcher = Arc::new(builder.build());

        for (index, route_config) in config.routes.iter().enumerate() {
            registry.register(route_from_config(route_config, index)?)?;
        }

        tracing::info!(
            routes = registry.len(),
            schedulers = config.schedulers.len(),
            default_scheduler = %config.dispatch.default_scheduler,
            "Dispatcher configured"
        );

        Ok(Self::from_dispatcher(dispatcher, &config))
    }

    /// Wrap an already assembled dispatcher.
    pub fn from_dispatcher(dispatcher: Arc<Dispatcher>, config: &ServerConfig) -> Self {
        let state = AppState {
            dispatcher: dispatcher.clone(),
            max_body_bytes: config.listener.max_body_bytes,
        };
        Self {
            router: Self::build_router(state),
            dispatcher,
            drain_timeout: Duration::from_millis(config.dispatch.drain_timeout_ms),
        }
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .fallback(dispatch_handler)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Serve until `shutdown` fires, then drain the dispatcher.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let dispatcher = self.dispatcher.clone();
        let drain_timeout = self.drain_timeout;
        let graceful = async move {
            let _ = shutdown.recv().await;
            tracing::info!("Shutdown requested; draining schedulers");
            dispatcher.shutdown(drain_timeout).await;
        };

        axum::serve(listener, self.router)
            .with_graceful_shutdown(graceful)
            .await?;

        // No-op if the graceful path already drained.
        self.dispatcher.shutdown(self.drain_timeout).await;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Single entry point: every request is routed by the dispatcher.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();

    let declared_len = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared_len.is_some_and(|len| len > state.max_body_bytes) {
        return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
    }
    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read request body");
            return (StatusCode::BAD_REQUEST, "failed to read request body").into_response();
        }
    };

    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let ctx = Arc::new(
        RequestContext::builder(parts.method.clone(), target)
            .headers(parts.headers)
            .body(body)
            .build(),
    );

    let outcome = state.dispatcher.dispatch(ctx.clone()).await;
    tracing::debug!(
        request_id = %ctx.id(),
        method = %ctx.method(),
        path = %ctx.path(),
        outcome = %outcome,
        "Request dispatched"
    );

    let mut response = match ctx.response().take() {
        Some(committed) => committed.into_response(),
        None => {
            tracing::error!(request_id = %ctx.id(), "Dispatch completed without a response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    };
    if let Ok(value) = HeaderValue::from_str(ctx.id()) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}
