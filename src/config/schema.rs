//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the notebook gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Frontend listener configuration (bind address for proxied traffic).
    pub listener: ListenerConfig,

    /// Health check listener configuration.
    pub health: HealthConfig,

    /// The single upstream notebook server all traffic is forwarded to.
    pub upstream: UpstreamConfig,

    /// Message size limits.
    pub limits: LimitsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Frontend listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address for the reverse-proxy data port (e.g., "0.0.0.0:8081").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8081".to_string(),
        }
    }
}

/// Health check listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Enable the liveness endpoint.
    pub enabled: bool,

    /// Bind address for the health port (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream notebook server configuration.
///
/// There is exactly one upstream; the gateway does no routing or balancing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Hostname of the notebook server. Also written into the `Host` header
    /// of every forwarded request, since the upstream rejects requests whose
    /// `Host` does not match its own endpoint.
    pub host: String,

    /// TLS port of the notebook server.
    pub port: u16,

    /// Skip backend certificate chain verification.
    ///
    /// The upstream currently presents a certificate the gateway cannot
    /// verify, so deployments set this explicitly. Never enabled by default.
    pub danger_accept_invalid_certs: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 443,
            danger_accept_invalid_certs: false,
        }
    }
}

/// Message size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum aggregated message size in bytes, applied identically to
    /// frontend and backend pipelines on both the HTTP and WebSocket paths.
    /// Large notebook files must still be loadable, hence the generous default.
    pub max_message_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: 200 * 1024 * 1024,
        }
    }
}

/// Timeout configuration for backend operations.
///
/// A hung backend connect or handshake would otherwise leave the frontend
/// connection half-open indefinitely.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment (TCP + TLS) timeout in seconds.
    pub connect_secs: u64,

    /// Backend WebSocket handshake timeout in seconds.
    pub handshake_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            handshake_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
