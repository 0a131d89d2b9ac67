//! Configuration types for the Talkbox client.
//!
//! Every struct implements [`Default`] with production defaults so that a
//! bare `[section]` header in TOML produces a working configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default chat server.
pub const DEFAULT_SERVER_URL: &str = "https://talkbox.qiujun.me";

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration for the Talkbox client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server endpoint and request settings.
    pub server: ServerSection,
    /// Reconnection policy for the event stream.
    pub reconnect: ReconnectSection,
    /// Keepalive ping settings.
    pub heartbeat: HeartbeatSection,
    /// History paging.
    pub history: HistorySection,
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// ServerSection
// ---------------------------------------------------------------------------

/// Where the chat server lives and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Base server URL (`http://` or `https://`).
    pub url: String,
    /// Path prefix of the REST API.
    pub api_prefix: String,
    /// Path of the event stream endpoint, appended to the base URL.
    pub stream_path: String,
    /// REST request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            url: DEFAULT_SERVER_URL.to_owned(),
            api_prefix: "/api".to_owned(),
            stream_path: "/ws".to_owned(),
            request_timeout_ms: 10_000,
        }
    }
}

impl ServerSection {
    /// REST request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// ReconnectSection
// ---------------------------------------------------------------------------

/// Delay strategy between reconnection attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Same delay before every retry.
    #[default]
    Fixed,
    /// Exponential growth from `delay_ms`, capped at `max_delay_ms`, with
    /// full jitter.
    Exponential,
}

/// Reconnection policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSection {
    /// Consecutive failed attempts before giving up.
    pub max_attempts: u32,
    /// Delay before each retry (base delay for exponential).
    pub delay_ms: u64,
    /// Delay strategy.
    pub strategy: BackoffStrategy,
    /// Cap for exponential delays.
    pub max_delay_ms: u64,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_ms: 3000,
            strategy: BackoffStrategy::Fixed,
            max_delay_ms: 60_000,
        }
    }
}

// ---------------------------------------------------------------------------
// HeartbeatSection
// ---------------------------------------------------------------------------

/// Keepalive ping settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatSection {
    /// Interval between pings in milliseconds.
    pub interval_ms: u64,
    /// Treat a ping left unanswered until the next one as a dead connection.
    pub require_pong: bool,
}

impl Default for HeartbeatSection {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            require_pong: false,
        }
    }
}

impl HeartbeatSection {
    /// Interval between pings.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

// ---------------------------------------------------------------------------
// HistorySection
// ---------------------------------------------------------------------------

/// Message history paging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    /// Messages requested per page.
    pub page_size: u32,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self { page_size: 50 }
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level filter (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Output format (`pretty`, `compact`, `json`, `full`).
    pub format: String,
    /// Per-crate directive overrides (e.g. `talkbox_client=trace`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}
