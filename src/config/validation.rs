//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes and the default reference existing schedulers)
//! - Validate value ranges (workers, capacity, status codes)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - Route ambiguity is checked by the registry at startup, not here

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::{Method, StatusCode};
use thiserror::Error;

use crate::config::schema::{ReorderMode, SchedulerKind, ServerConfig};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address '{0}'")]
    InvalidBindAddress(String),

    #[error("invalid metrics address '{0}'")]
    InvalidMetricsAddress(String),

    #[error("scheduler name must not be empty")]
    EmptySchedulerName,

    #[error("duplicate scheduler '{0}'")]
    DuplicateScheduler(String),

    #[error("scheduler '{0}' must have at least one worker")]
    ZeroWorkers(String),

    #[error("scheduler '{0}' must have a queue capacity of at least one")]
    ZeroQueueCapacity(String),

    #[error("scheduler '{0}' has a zero admission timeout")]
    ZeroTimeout(String),

    #[error("default scheduler '{0}' is not defined")]
    UnknownDefaultScheduler(String),

    #[error("periodic reordering needs resort_every > 0")]
    ZeroResortEvery,

    #[error("route '{route}' references unknown scheduler '{scheduler}'")]
    UnknownRouteScheduler { route: String, scheduler: String },

    #[error("route '{route}' path '{path}' must start with '/'")]
    InvalidPath { route: String, path: String },

    #[error("route '{route}' has invalid method '{method}'")]
    InvalidMethod { route: String, method: String },

    #[error("route '{route}' has invalid status {status}")]
    InvalidStatus { route: String, status: u16 },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    let mut names = HashSet::new();
    for scheduler in &config.schedulers {
        if scheduler.name.is_empty() {
            errors.push(ValidationError::EmptySchedulerName);
        } else if !names.insert(scheduler.name.as_str()) {
            errors.push(ValidationError::DuplicateScheduler(scheduler.name.clone()));
        }
        if scheduler.kind == SchedulerKind::Pool {
            if scheduler.workers == 0 {
                errors.push(ValidationError::ZeroWorkers(scheduler.name.clone()));
            }
            if scheduler.queue_capacity == 0 {
                errors.push(ValidationError::ZeroQueueCapacity(scheduler.name.clone()));
            }
        }
        if scheduler.timeout_ms == Some(0) {
            errors.push(ValidationError::ZeroTimeout(scheduler.name.clone()));
        }
    }

    if !names.contains(config.dispatch.default_scheduler.as_str()) {
        errors.push(ValidationError::UnknownDefaultScheduler(
            config.dispatch.default_scheduler.clone(),
        ));
    }
    if config.dispatch.reorder.mode == ReorderMode::Periodic
        && config.dispatch.reorder.resort_every == 0
    {
        errors.push(ValidationError::ZeroResortEvery);
    }

    for (index, route) in config.routes.iter().enumerate() {
        let label = route.label(index);

        if let Some(scheduler) = &route.scheduler {
            if !names.contains(scheduler.as_str()) {
                errors.push(ValidationError::UnknownRouteScheduler {
                    route: label.clone(),
                    scheduler: scheduler.clone(),
                });
            }
        }
        for path in &route.paths {
            if !path.starts_with('/') {
                errors.push(ValidationError::InvalidPath {
                    route: label.clone(),
                    path: path.clone(),
                });
            }
        }
        for method in &route.methods {
            if Method::from_bytes(method.as_bytes()).is_err() {
                errors.push(ValidationError::InvalidMethod {
                    route: label.clone(),
                    method: method.clone(),
                });
            }
        }
        if StatusCode::from_u16(route.response.status).is_err() {
            errors.push(ValidationError::InvalidStatus {
                route: label,
                status: route.response.status,
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{RouteConfig, SchedulerConfig};

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&ServerConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ServerConfig::default();
        config.dispatch.default_scheduler = "missing".to_string();
        config.schedulers.push(SchedulerConfig {
            name: "biz".to_string(),
            workers: 0,
            ..SchedulerConfig::default()
        });
        config.routes.push(RouteConfig {
            name: Some("bad".to_string()),
            paths: vec!["no-slash".to_string()],
            methods: vec!["GE T".to_string()],
            scheduler: Some("ghost".to_string()),
            ..RouteConfig::default()
        });
        config.routes[0].response.status = 42;

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateScheduler("biz".to_string())));
        assert!(errors.contains(&ValidationError::ZeroWorkers("biz".to_string())));
        assert!(errors.contains(&ValidationError::UnknownDefaultScheduler("missing".to_string())));
        assert!(errors.contains(&ValidationError::UnknownRouteScheduler {
            route: "bad".to_string(),
            scheduler: "ghost".to_string(),
        }));
        assert!(errors.contains(&ValidationError::InvalidPath {
            route: "bad".to_string(),
            path: "no-slash".to_string(),
        }));
        assert!(errors.contains(&ValidationError::InvalidMethod {
            route: "bad".to_string(),
            method: "GE T".to_string(),
        }));
        assert!(errors.contains(&ValidationError::InvalidStatus {
            route: "bad".to_string(),
            status: 42,
        }));
    }
}
