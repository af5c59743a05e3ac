//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::routing::cache::ReorderPolicy;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Dispatcher behaviour.
    pub dispatch: DispatchConfig,

    /// Named schedulers. Routes refer to them by name.
    pub schedulers: Vec<SchedulerConfig>,

    /// Declarative routes answered with a static response.
    pub routes: Vec<RouteConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            dispatch: DispatchConfig::default(),
            schedulers: vec![
                SchedulerConfig {
                    name: "biz".to_string(),
                    ..SchedulerConfig::default()
                },
                SchedulerConfig {
                    name: "io".to_string(),
                    kind: SchedulerKind::Direct,
                    ..SchedulerConfig::default()
                },
            ],
            routes: Vec::new(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest request body accepted, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Scheduler for routes that do not name one.
    pub default_scheduler: String,

    /// Reject ambiguous routes at registration.
    pub check_ambiguity: bool,

    /// How long shutdown waits for each scheduler before failing queued tasks.
    pub drain_timeout_ms: u64,

    pub reorder: ReorderConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_scheduler: "biz".to_string(),
            check_ambiguity: true,
            drain_timeout_ms: 5000,
            reorder: ReorderConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReorderMode {
    #[default]
    Swap,
    Periodic,
}

/// Pattern route reordering.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReorderConfig {
    pub mode: ReorderMode,

    /// Lookups between full re-sorts in `periodic` mode.
    pub resort_every: u64,
}

impl Default for ReorderConfig {
    fn default() -> Self {
        Self {
            mode: ReorderMode::Swap,
            resort_every: 1000,
        }
    }
}

impl ReorderConfig {
    pub fn policy(&self) -> ReorderPolicy {
        match self.mode {
            ReorderMode::Swap => ReorderPolicy::SwapOnOvertake,
            ReorderMode::Periodic => ReorderPolicy::Periodic {
                every: self.resort_every,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    /// Bounded queue drained by a fixed set of workers.
    #[default]
    Pool,
    /// Spawn every task immediately.
    Direct,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub name: String,

    pub kind: SchedulerKind,

    /// Worker count (pool only).
    pub workers: usize,

    /// Queue capacity (pool only). A full queue rejects with 429.
    pub queue_capacity: usize,

    /// Admission timeout in milliseconds. Tasks that wait longer are
    /// failed with 500 without running.
    pub timeout_ms: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: SchedulerKind::Pool,
            workers: 8,
            queue_capacity: 1024,
            timeout_ms: None,
        }
    }
}

/// A route answered with a fixed response.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: Option<String>,

    /// Path templates (`/users/{id}`, `/static/**`). Empty matches any path.
    pub paths: Vec<String>,

    /// HTTP methods. Empty matches any method.
    pub methods: Vec<String>,

    /// Query parameter expressions (`name`, `!name`, `name=v`, `name!=v`).
    pub params: Vec<String>,

    /// Header expressions, same forms as params.
    pub headers: Vec<String>,

    /// Accepted request content types.
    pub consumes: Vec<String>,

    /// Producible response content types.
    pub produces: Vec<String>,

    /// Scheduler name; the default scheduler when absent.
    pub scheduler: Option<String>,

    pub response: StaticResponseConfig,
}

impl RouteConfig {
    /// Label for validation messages.
    pub fn label(&self, index: usize) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("routes[{}]", index),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticResponseConfig {
    pub status: u16,

    /// Body text; `{name}` is replaced with the path variable `name`.
    pub body: String,

    /// Content type; defaults to the negotiated type, then `text/plain`.
    pub content_type: Option<String>,
}

impl Default for StaticResponseConfig {
    fn default() -> Self {
        Self {
            status: 200,
            body: String::new(),
            content_type: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
