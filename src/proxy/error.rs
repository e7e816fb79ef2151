//! Proxy error taxonomy.
//!
//! Every variant is fatal for the connection it occurs on: the failure policy
//! is strictly close-and-surface, never retry. Errors returned from a session
//! make hyper abort the frontend connection, and the paired backend connection
//! is torn down by the owning session before the error propagates.

/// Fatal, per-connection proxy errors.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Backend TCP or TLS connection attempt failed.
    #[error("backend connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// Backend connection attempt exceeded the configured timeout.
    #[error("backend connect timed out")]
    ConnectTimeout,

    /// Client-role WebSocket handshake with the backend failed.
    #[error("backend websocket handshake failed: {0}")]
    BackendHandshake(#[from] tungstenite::Error),

    /// Backend WebSocket handshake exceeded the configured timeout.
    #[error("backend websocket handshake timed out")]
    HandshakeTimeout,

    /// An aggregated message exceeded the configured size cap.
    #[error("message exceeds the {0} byte limit")]
    MessageTooLarge(usize),

    /// Traffic arrived that is invalid for the connection's current state.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// The HTTP exchange with the backend failed mid-flight.
    #[error("backend http exchange failed: {0}")]
    Http(#[from] hyper::Error),

    /// Transport-level failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The upstream host in the configuration is not a valid TLS server name.
    #[error("invalid upstream host: {0}")]
    InvalidUpstreamHost(String),
}

impl ProxyError {
    /// Short label used for the error-kind metric.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::Connect(_) => "connect",
            ProxyError::ConnectTimeout => "connect_timeout",
            ProxyError::BackendHandshake(_) => "backend_handshake",
            ProxyError::HandshakeTimeout => "handshake_timeout",
            ProxyError::MessageTooLarge(_) => "too_large",
            ProxyError::ProtocolViolation(_) => "protocol_violation",
            ProxyError::Http(_) => "http",
            ProxyError::Io(_) => "io",
            ProxyError::InvalidUpstreamHost(_) => "invalid_upstream_host",
        }
    }
}
