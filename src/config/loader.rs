//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ServerConfig, ConfigError> {
    let config: ServerConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{LogFormat, ReorderMode, SchedulerKind};

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.dispatch.default_scheduler, "biz");
        assert_eq!(config.schedulers.len(), 2);
        assert_eq!(config.schedulers[1].kind, SchedulerKind::Direct);
    }

    #[test]
    fn test_full_file() {
        let config = parse_config(
            r#"
            [listener]
            bind_address = "127.0.0.1:3000"

            [dispatch]
            default_scheduler = "work"
            drain_timeout_ms = 250

            [dispatch.reorder]
            mode = "periodic"
            resort_every = 64

            [[schedulers]]
            name = "work"
            workers = 4
            queue_capacity = 16
            timeout_ms = 1000

            [[schedulers]]
            name = "io"
            kind = "direct"

            [[routes]]
            name = "hello"
            paths = ["/hello/{name}"]
            methods = ["GET"]
            scheduler = "io"

            [routes.response]
            body = "hello {name}"
            content_type = "text/plain"

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.dispatch.reorder.mode, ReorderMode::Periodic);
        assert_eq!(config.schedulers[0].timeout_ms, Some(1000));
        assert_eq!(config.routes[0].paths, vec!["/hello/{name}".to_string()]);
        assert_eq!(config.routes[0].response.status, 200);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_reference_fails_validation() {
        let err = parse_config(
            r#"
            [dispatch]
            default_scheduler = "nope"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
