//! Per-connection dispatch.
//!
//! # Responsibilities
//! - Serve one accepted frontend connection with hyper, upgrades enabled
//! - Classify each request as plain HTTP or a WebSocket upgrade
//! - Hand off to the matching session type and record the outcome
//!
//! Errors returned from a session abort the frontend connection; the paired
//! backend connection is torn down by the session that owned it.

use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONNECTION, UPGRADE};
use http::{HeaderMap, Request, Response};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use crate::config::GatewayConfig;
use crate::net::connection::ConnectionId;
use crate::net::connector::BackendConnector;
use crate::observability::metrics;
use crate::proxy::error::ProxyError;
use crate::proxy::http::HttpSession;
use crate::proxy::upstream::UpstreamAddr;
use crate::proxy::websocket;

/// Shared state every proxy session reads from.
///
/// Built once at startup and shared across all connections; nothing in here
/// changes after construction.
pub struct ProxyContext {
    pub upstream: UpstreamAddr,
    pub connector: BackendConnector,
    pub max_message_bytes: usize,
    pub handshake_timeout_secs: u64,
}

impl ProxyContext {
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ProxyError> {
        Ok(Self {
            upstream: UpstreamAddr::from_config(&config.upstream),
            connector: BackendConnector::new(&config.upstream, &config.timeouts)?,
            max_message_bytes: config.limits.max_message_bytes,
            handshake_timeout_secs: config.timeouts.handshake_secs,
        })
    }
}

/// Serve one accepted frontend connection until it closes.
pub async fn serve_connection(ctx: Arc<ProxyContext>, stream: TcpStream) {
    let id = ConnectionId::new();
    metrics::record_connection_accepted();
    tracing::debug!(connection_id = %id, "Serving frontend connection");

    let http_session = Arc::new(HttpSession::new(
        ctx.connector.clone(),
        ctx.upstream.clone(),
        ctx.max_message_bytes,
        id,
    ));

    let service = service_fn(move |request: Request<Incoming>| {
        let ctx = Arc::clone(&ctx);
        let http_session = Arc::clone(&http_session);
        async move { dispatch(&ctx, &http_session, id, request).await }
    });

    let result = hyper::server::conn::http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades()
        .await;

    match result {
        Ok(()) => tracing::debug!(connection_id = %id, "Frontend connection closed"),
        Err(err) => {
            tracing::debug!(connection_id = %id, error = %err, "Frontend connection ended with error")
        }
    }
}

async fn dispatch(
    ctx: &ProxyContext,
    http_session: &HttpSession,
    id: ConnectionId,
    request: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, ProxyError> {
    let result = if is_websocket_upgrade(request.headers()) {
        websocket::handle_upgrade(ctx, id, request).await
    } else {
        let response = http_session.proxy_request(request).await;
        if let Ok(response) = &response {
            metrics::record_http_request(response.status().as_u16());
        }
        response
    };

    if let Err(err) = &result {
        metrics::record_proxy_error(err.kind());
        tracing::warn!(connection_id = %id, error = %err, "Proxy session failed, closing connection");
    }
    result
}

/// Whether a request asks for a WebSocket upgrade.
///
/// `Connection` is a comma-separated token list and both headers are
/// case-insensitive per RFC 6455 section 4.2.1.
fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let connection_has_upgrade = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    let upgrade_is_websocket = headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    connection_has_upgrade && upgrade_is_websocket
}
