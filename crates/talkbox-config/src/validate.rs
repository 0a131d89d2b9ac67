//! Post-merge configuration validation.
//!
//! Validates that deserialized [`Config`](crate::Config) values are within
//! acceptable ranges.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Largest page the server accepts.
const MAX_PAGE_SIZE: u32 = 200;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_server(config)?;
    validate_reconnect(config)?;
    validate_heartbeat(config)?;
    validate_history(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_server(config: &Config) -> ConfigResult<()> {
    let s = &config.server;

    let parsed = url::Url::parse(&s.url)
        .map_err(|e| invalid("server.url", format!("'{}' is not a valid URL: {e}", s.url)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(
            "server.url",
            format!("unsupported scheme '{}'; expected http or https", parsed.scheme()),
        ));
    }

    if !s.stream_path.starts_with('/') {
        return Err(invalid("server.stream_path", "must start with '/'"));
    }
    if !s.api_prefix.is_empty() && !s.api_prefix.starts_with('/') {
        return Err(invalid("server.api_prefix", "must be empty or start with '/'"));
    }
    if s.request_timeout_ms == 0 {
        return Err(invalid("server.request_timeout_ms", "must be greater than 0"));
    }
    Ok(())
}

fn validate_reconnect(config: &Config) -> ConfigResult<()> {
    let r = &config.reconnect;
    if r.max_delay_ms < r.delay_ms {
        return Err(invalid(
            "reconnect.max_delay_ms",
            format!(
                "max_delay_ms ({}) must be at least delay_ms ({})",
                r.max_delay_ms, r.delay_ms
            ),
        ));
    }
    Ok(())
}

fn validate_heartbeat(config: &Config) -> ConfigResult<()> {
    if config.heartbeat.interval_ms == 0 {
        return Err(invalid("heartbeat.interval_ms", "must be greater than 0"));
    }
    Ok(())
}

fn validate_history(config: &Config) -> ConfigResult<()> {
    let size = config.history.page_size;
    if size == 0 || size > MAX_PAGE_SIZE {
        return Err(invalid(
            "history.page_size",
            format!("page_size must be between 1 and {MAX_PAGE_SIZE}"),
        ));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;
    if !matches!(
        l.level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        return Err(invalid(
            "logging.level",
            format!(
                "unknown level '{}'; expected one of: trace, debug, info, warn, error",
                l.level
            ),
        ));
    }
    if !matches!(l.format.as_str(), "pretty" | "compact" | "json" | "full") {
        return Err(invalid(
            "logging.format",
            format!(
                "unknown format '{}'; expected one of: pretty, compact, json, full",
                l.format
            ),
        ));
    }
    Ok(())
}
