//! WebSocket proxy session.
//!
//! Bridges two independently negotiated WebSocket sessions:
//!
//! 1. a client-role handshake with the backend over TLS, driven with the
//!    version/subprotocol/headers captured from the original upgrade request
//!    (minus `Origin`, which the upstream rejects);
//! 2. a server-role handshake with the frontend, whose response carries the
//!    Cookie Rewriter's recreated cookies plus the fixed `Server` and
//!    `Sec-WebSocket-Extensions` headers.
//!
//! Relaying starts only after both handshakes have completed; from then on
//! frames are forwarded unmodified in both directions and a close or write
//! failure on either side tears down the other after a flush.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http::header::{
    CONNECTION, HOST, ORIGIN, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_EXTENSIONS, SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_VERSION, UPGRADE,
};
use http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{client_async_with_config, WebSocketStream};
use tungstenite::handshake::client::generate_key;
use tungstenite::handshake::derive_accept_key;
use tungstenite::protocol::{Role, WebSocketConfig};

use crate::net::connection::ConnectionId;
use crate::observability::metrics;
use crate::proxy::cookies;
use crate::proxy::error::ProxyError;
use crate::proxy::session::ProxyContext;

/// The only WebSocket protocol version the gateway negotiates.
const SUPPORTED_WEBSOCKET_VERSION: &str = "13";

/// Handshake progress of a WebSocket proxy session.
///
/// Transitions are strictly forward; `Relaying` is entered only after both
/// the backend and frontend handshakes have completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HandshakeState {
    NotStarted,
    BackendHandshakeInFlight,
    BackendHandshakeComplete,
    FrontendHandshakeInFlight,
    Relaying,
    Closed,
}

impl HandshakeState {
    fn advance(&mut self, id: ConnectionId, next: HandshakeState) {
        debug_assert!(next > *self, "handshake state may only move forward");
        tracing::trace!(connection_id = %id, from = ?*self, to = ?next, "WebSocket handshake state");
        *self = next;
    }
}

/// Handle a detected upgrade request: dual handshake, then frame relay.
///
/// Returns the `101 Switching Protocols` response for the frontend (or the
/// unsupported-version response). The relay itself runs on a spawned task
/// once hyper completes the frontend upgrade.
pub async fn handle_upgrade(
    ctx: &ProxyContext,
    id: ConnectionId,
    request: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, ProxyError> {
    let mut state = HandshakeState::NotStarted;

    let frontend_url = frontend_websocket_url(&request);
    tracing::info!(connection_id = %id, url = %frontend_url, "Detected HTTP upgrade to WebSocket");

    let version = request
        .headers()
        .get(SEC_WEBSOCKET_VERSION)
        .and_then(|v| v.to_str().ok());
    if version != Some(SUPPORTED_WEBSOCKET_VERSION) {
        tracing::warn!(
            connection_id = %id,
            version = version.unwrap_or("<missing>"),
            "Unsupported WebSocket protocol version"
        );
        return Ok(unsupported_version_response());
    }

    let accept_key = request
        .headers()
        .get(SEC_WEBSOCKET_KEY)
        .map(|key| derive_accept_key(key.as_bytes()))
        .ok_or(ProxyError::ProtocolViolation(
            "upgrade request is missing Sec-WebSocket-Key",
        ))?;

    let target = ctx.upstream.websocket_uri(request.uri())?;
    let mut handshake_request = backend_handshake_request(&target, request.headers())?;
    // tungstenite does not derive the fixed handshake headers for a custom
    // request; they must already be present or the client handshake is
    // rejected before anything reaches the wire.
    {
        let authority = target
            .authority()
            .ok_or(ProxyError::ProtocolViolation(
                "upstream target has no authority",
            ))?
            .as_str();
        let headers = handshake_request.headers_mut();
        headers.insert(
            HOST,
            HeaderValue::from_str(authority).map_err(|_| {
                ProxyError::ProtocolViolation("upstream authority is not a valid Host header")
            })?,
        );
        headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(
            SEC_WEBSOCKET_VERSION,
            HeaderValue::from_static(SUPPORTED_WEBSOCKET_VERSION),
        );
        headers.insert(
            SEC_WEBSOCKET_KEY,
            HeaderValue::from_str(&generate_key()).map_err(|_| {
                ProxyError::ProtocolViolation("generated websocket key is not a valid header")
            })?,
        );
    }
    let relay_config = relay_config(ctx.max_message_bytes);

    // Backend connect and client-role handshake. A failure here closes the
    // frontend connection; nothing has been committed to the browser yet.
    state.advance(id, HandshakeState::BackendHandshakeInFlight);
    tracing::debug!(connection_id = %id, target = %target, "Opening backend WebSocket connection");
    let stream = ctx.connector.connect().await?;
    let backend = timeout(
        Duration::from_secs(ctx.handshake_timeout_secs),
        client_async_with_config(handshake_request, stream, Some(relay_config)),
    )
    .await
    .map_err(|_| ProxyError::HandshakeTimeout)?;
    let (backend_ws, backend_response) = backend?;
    state.advance(id, HandshakeState::BackendHandshakeComplete);
    tracing::debug!(
        connection_id = %id,
        status = %backend_response.status(),
        "Backend WebSocket handshake complete"
    );

    // Server-role response for the frontend, carrying the recreated cookies.
    state.advance(id, HandshakeState::FrontendHandshakeInFlight);
    let mut response = Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(CONNECTION, HeaderValue::from_static("Upgrade"))
        .header(UPGRADE, HeaderValue::from_static("websocket"))
        .header(SEC_WEBSOCKET_ACCEPT, accept_key);
    if let Some(headers) = response.headers_mut() {
        headers.extend(cookies::handshake_headers_from_request(request.headers()));
    }
    let response = response
        .body(Full::new(Bytes::new()))
        .map_err(|_| ProxyError::ProtocolViolation("could not build handshake response"))?;

    // The frontend must accept before the tunnel is committed: if hyper's
    // upgrade future fails, the backend session is closed with a flush and
    // no frame is ever relayed.
    tokio::spawn(async move {
        match hyper::upgrade::on(request).await {
            Ok(upgraded) => {
                let frontend_ws = WebSocketStream::from_raw_socket(
                    TokioIo::new(upgraded),
                    Role::Server,
                    Some(relay_config),
                )
                .await;
                state.advance(id, HandshakeState::Relaying);
                metrics::record_websocket_upgrade();
                tracing::info!(connection_id = %id, "Both handshakes finalized, relaying frames in both directions");
                relay(id, frontend_ws, backend_ws).await;
                state.advance(id, HandshakeState::Closed);
            }
            Err(err) => {
                tracing::warn!(
                    connection_id = %id,
                    error = %err,
                    "Frontend handshake did not complete, closing the backend session"
                );
                let mut backend_ws = backend_ws;
                let _ = backend_ws.close(None).await;
            }
        }
    });

    Ok(response)
}

/// Frontend-facing WebSocket URL, always plain `ws://` toward the browser.
fn frontend_websocket_url(request: &Request<Incoming>) -> String {
    let host = request
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    format!("ws://{}{}", host, request.uri())
}

/// Build the client-role handshake request for the backend.
///
/// All inbound headers are carried over except the ones the client handshake
/// derives itself and `Origin`, which the upstream rejects on upgrade
/// requests.
fn backend_handshake_request(
    target: &http::Uri,
    inbound: &HeaderMap,
) -> Result<Request<()>, ProxyError> {
    let mut builder = Request::builder().method(Method::GET).uri(target.clone());

    if let Some(headers) = builder.headers_mut() {
        for (name, value) in inbound {
            if name == HOST
                || name == CONNECTION
                || name == UPGRADE
                || name == SEC_WEBSOCKET_VERSION
                || name == SEC_WEBSOCKET_KEY
                || name == SEC_WEBSOCKET_EXTENSIONS
                || name == ORIGIN
            {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }
    }

    builder
        .body(())
        .map_err(|_| ProxyError::ProtocolViolation("could not build backend handshake request"))
}

fn relay_config(max_message_bytes: usize) -> WebSocketConfig {
    WebSocketConfig::default()
        .max_message_size(Some(max_message_bytes))
        .max_frame_size(Some(max_message_bytes))
}

/// Response for an upgrade request with an unsupported protocol version.
fn unsupported_version_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::UPGRADE_REQUIRED;
    response.headers_mut().insert(
        SEC_WEBSOCKET_VERSION,
        HeaderValue::from_static(SUPPORTED_WEBSOCKET_VERSION),
    );
    // The rejection is fatal for the connection, same as every other failure.
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    response
}

/// Forward frames in both directions until either side closes.
///
/// Each direction runs as its own pump; when a pump's source ends (close or
/// error), the opposite sink is closed with a flush, which in turn ends the
/// other pump. This is the close-propagation rule that keeps the two
/// transports' lifetimes linked.
async fn relay<F, B>(id: ConnectionId, frontend: WebSocketStream<F>, backend: WebSocketStream<B>)
where
    F: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut frontend_sink, mut frontend_stream) = frontend.split();
    let (mut backend_sink, mut backend_stream) = backend.split();

    let frontend_to_backend = async {
        while let Some(message) = frontend_stream.next().await {
            match message {
                Ok(message) => {
                    if backend_sink.send(message).await.is_err() {
                        tracing::debug!(connection_id = %id, "Backend write failed, closing");
                        break;
                    }
                }
                Err(err) => {
                    tracing::debug!(connection_id = %id, error = %err, "Frontend stream ended");
                    break;
                }
            }
        }
        let _ = backend_sink.close().await;
    };

    let backend_to_frontend = async {
        while let Some(message) = backend_stream.next().await {
            match message {
                Ok(message) => {
                    if frontend_sink.send(message).await.is_err() {
                        tracing::debug!(connection_id = %id, "Frontend write failed, closing");
                        break;
                    }
                }
                Err(err) => {
                    tracing::debug!(connection_id = %id, error = %err, "Backend stream ended");
                    break;
                }
            }
        }
        let _ = frontend_sink.close().await;
    };

    tokio::join!(frontend_to_backend, backend_to_frontend);
    tracing::info!(connection_id = %id, "WebSocket relay finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_state_orders_forward_only() {
        assert!(HandshakeState::NotStarted < HandshakeState::BackendHandshakeInFlight);
        assert!(HandshakeState::BackendHandshakeInFlight < HandshakeState::BackendHandshakeComplete);
        assert!(HandshakeState::BackendHandshakeComplete < HandshakeState::FrontendHandshakeInFlight);
        assert!(HandshakeState::FrontendHandshakeInFlight < HandshakeState::Relaying);
        assert!(HandshakeState::Relaying < HandshakeState::Closed);
    }

    #[test]
    fn backend_handshake_request_strips_origin_and_handshake_headers() {
        let mut inbound = HeaderMap::new();
        inbound.insert(HOST, HeaderValue::from_static("gateway.local:8081"));
        inbound.insert(ORIGIN, HeaderValue::from_static("http://gateway.local"));
        inbound.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        inbound.insert(UPGRADE, HeaderValue::from_static("websocket"));
        inbound.insert(SEC_WEBSOCKET_VERSION, HeaderValue::from_static("13"));
        inbound.insert(SEC_WEBSOCKET_KEY, HeaderValue::from_static("dGhlIHNhbXBsZSBub25jZQ=="));
        inbound.insert("sec-websocket-protocol", HeaderValue::from_static("v1.kernel"));
        inbound.insert("cookie", HeaderValue::from_static("token=abc"));

        let target: http::Uri = "wss://notebook.internal:443/api/kernels".parse().unwrap();
        let request = backend_handshake_request(&target, &inbound).unwrap();

        assert!(request.headers().get(ORIGIN).is_none());
        assert!(request.headers().get(HOST).is_none());
        assert!(request.headers().get(SEC_WEBSOCKET_KEY).is_none());
        assert_eq!(
            request.headers().get("sec-websocket-protocol").unwrap(),
            "v1.kernel"
        );
        assert_eq!(request.headers().get("cookie").unwrap(), "token=abc");
    }

    #[test]
    fn unsupported_version_response_advertises_supported_version() {
        let response = unsupported_version_response();
        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
        assert_eq!(response.headers().get(SEC_WEBSOCKET_VERSION).unwrap(), "13");
    }
}
