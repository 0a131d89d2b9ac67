//! Error types for the Talkbox client.

/// Errors produced by the connection manager, cache, and history client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// `WebSocket` transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    /// Socket-level failure reported by a transport. Recovered by reconnecting.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A single inbound frame could not be decoded. The frame is discarded.
    #[error("Failed to decode frame: {0}")]
    Decode(String),

    /// The very first connection attempt of a session failed at the handshake.
    #[error("Connection failed: {0}")]
    Handshake(String),

    /// The server rejected the bearer token.
    #[error("Unauthorized: the server rejected the session token")]
    Unauthorized,

    /// Reconnection gave up after the configured number of attempts.
    #[error("Gave up after {0} reconnect attempts")]
    RetryExhausted(u32),

    /// HTTP error talking to the history API.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The history API answered with a non-zero result code.
    #[error("API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A server URL could not be parsed or converted.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] talkbox_config::ConfigError),

    /// No session token is available to connect with.
    #[error("No session token available")]
    MissingToken,
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
