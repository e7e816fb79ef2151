//! Backend address resolution.
//!
//! The gateway forwards everything to one fixed notebook server. This module
//! owns that address and derives per-request upstream WebSocket URIs from it.

use http::uri::Uri;
use http::HeaderValue;

use crate::config::UpstreamConfig;
use crate::proxy::error::ProxyError;

/// The fixed upstream host/port all traffic is forwarded to.
#[derive(Debug, Clone)]
pub struct UpstreamAddr {
    host: String,
    port: u16,
}

impl UpstreamAddr {
    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Header value for the rewritten `Host` header on forwarded requests.
    ///
    /// The upstream rejects requests whose `Host` points at the proxy
    /// endpoint (400 Bad Request, treated as a MITM signal), so every
    /// forwarded request carries the upstream's own hostname.
    pub fn host_header(&self) -> Result<HeaderValue, ProxyError> {
        HeaderValue::from_str(&self.host)
            .map_err(|_| ProxyError::InvalidUpstreamHost(self.host.clone()))
    }

    /// Upstream WebSocket target for an inbound upgrade request.
    ///
    /// Always a secure scheme toward the backend; recomputed per upgrade
    /// request with the inbound path and query preserved, never cached.
    pub fn websocket_uri(&self, request_uri: &Uri) -> Result<Uri, ProxyError> {
        let path_and_query = request_uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let uri = format!("wss://{}:{}{}", self.host, self.port, path_and_query);
        uri.parse()
            .map_err(|_| ProxyError::ProtocolViolation("upgrade request uri is not a valid upstream target"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream() -> UpstreamAddr {
        UpstreamAddr {
            host: "notebook.internal".into(),
            port: 443,
        }
    }

    #[test]
    fn websocket_uri_preserves_path_and_query() {
        let uri: Uri = "/api/kernels/ws?session_id=abc".parse().unwrap();
        let target = upstream().websocket_uri(&uri).unwrap();
        assert_eq!(
            target.to_string(),
            "wss://notebook.internal:443/api/kernels/ws?session_id=abc"
        );
    }

    #[test]
    fn websocket_uri_is_recomputed_per_request() {
        let first: Uri = "/terminals/1".parse().unwrap();
        let second: Uri = "/terminals/2".parse().unwrap();
        let upstream = upstream();
        assert_ne!(
            upstream.websocket_uri(&first).unwrap(),
            upstream.websocket_uri(&second).unwrap()
        );
    }

    #[test]
    fn host_header_carries_upstream_host_only() {
        assert_eq!(upstream().host_header().unwrap(), "notebook.internal");
    }
}
