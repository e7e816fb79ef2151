//! HTTP proxy session.
//!
//! # Responsibilities
//! - Forward one complete request per backend connection to the upstream
//! - Rewrite the `Host` header to the upstream's own hostname
//! - Force keep-alive off on forwarded requests (no persistent connections)
//! - Rewrite `Set-Cookie` headers on the way back to the browser
//! - Propagate backend closure to the frontend connection
//!
//! One backend connection serves exactly one request/response exchange and is
//! then closed; the close cascades to the frontend via the `Connection: close`
//! response header. A second inbound request while an exchange is in flight
//! is a fatal protocol error for the connection.

use std::sync::Mutex;

use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::{HeaderValue, Request, Response, Uri, Version};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;

use crate::net::connection::ConnectionId;
use crate::net::connector::BackendConnector;
use crate::proxy::cookies;
use crate::proxy::error::ProxyError;
use crate::proxy::upstream::UpstreamAddr;

/// Lifecycle of an HTTP proxy session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HttpState {
    /// No backend connection yet.
    Idle,
    /// Backend connection being established.
    Connecting,
    /// Request sent, awaiting the backend response.
    Forwarding,
    /// Exchange finished; the connection pair is closing.
    Done,
}

/// Per-frontend-connection HTTP proxying state.
pub struct HttpSession {
    connector: BackendConnector,
    upstream: UpstreamAddr,
    max_message_bytes: usize,
    id: ConnectionId,
    state: Mutex<HttpState>,
}

impl HttpSession {
    pub fn new(
        connector: BackendConnector,
        upstream: UpstreamAddr,
        max_message_bytes: usize,
        id: ConnectionId,
    ) -> Self {
        Self {
            connector,
            upstream,
            max_message_bytes,
            id,
            state: Mutex::new(HttpState::Idle),
        }
    }

    /// Forward one complete request to the upstream and relay its response.
    pub async fn proxy_request(
        &self,
        request: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, ProxyError> {
        {
            let mut state = self.state.lock().expect("http session state poisoned");
            if *state != HttpState::Idle {
                tracing::error!(
                    connection_id = %self.id,
                    state = ?*state,
                    "Request received while a proxied exchange is in flight"
                );
                return Err(ProxyError::ProtocolViolation(
                    "backend channel is present but not yet active",
                ));
            }
            *state = HttpState::Connecting;
        }

        let result = self.exchange(request).await;
        self.set_state(HttpState::Done);
        result
    }

    async fn exchange(
        &self,
        request: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, ProxyError> {
        let (mut parts, body) = request.into_parts();
        let payload = aggregate_body(body, self.max_message_bytes).await?;

        parts.headers.insert(HOST, self.upstream.host_header()?);
        // No connection caching: HTTP/1.1 applications that do not support
        // persistent connections MUST include the "close" option in every
        // message (RFC 2616 section 14.10).
        parts.headers.insert(CONNECTION, HeaderValue::from_static("close"));
        parts.headers.remove(TRANSFER_ENCODING);
        parts.headers.remove(CONTENT_LENGTH);

        let target: Uri = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
            .parse()
            .map_err(|_| ProxyError::ProtocolViolation("request target is not origin-form"))?;

        tracing::debug!(
            connection_id = %self.id,
            method = %parts.method,
            path = %target,
            "Forwarding HTTP request to backend"
        );

        let mut outbound = Request::new(Full::new(payload));
        *outbound.method_mut() = parts.method;
        *outbound.uri_mut() = target;
        *outbound.version_mut() = Version::HTTP_11;
        *outbound.headers_mut() = parts.headers;

        let stream = self.connector.connect().await?;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
        let id = self.id;
        tokio::spawn(async move {
            if let Err(err) = conn.await {
                tracing::debug!(connection_id = %id, error = %err, "Backend HTTP connection ended with error");
            }
        });

        self.set_state(HttpState::Forwarding);
        let response = sender.send_request(outbound).await?;

        let (mut parts, body) = response.into_parts();
        let payload = aggregate_body(body, self.max_message_bytes).await?;

        cookies::rewrite_set_cookie_headers(&mut parts.headers);
        parts.headers.remove(TRANSFER_ENCODING);
        parts.headers.remove(CONTENT_LENGTH);
        // The backend connection closes after this single exchange; the
        // closure propagates to the frontend connection as well.
        parts.headers.insert(CONNECTION, HeaderValue::from_static("close"));

        tracing::debug!(
            connection_id = %self.id,
            status = %parts.status,
            "Relaying backend response to frontend"
        );

        drop(sender);
        Ok(Response::from_parts(parts, Full::new(payload)))
    }

    fn set_state(&self, next: HttpState) {
        let mut state = self.state.lock().expect("http session state poisoned");
        tracing::trace!(connection_id = %self.id, from = ?*state, to = ?next, "HTTP session state");
        *state = next;
    }
}

/// Fully buffer a message body, enforcing the aggregated size cap.
pub(crate) async fn aggregate_body(body: Incoming, limit: usize) -> Result<Bytes, ProxyError> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) => {
            if err.downcast_ref::<LengthLimitError>().is_some() {
                return Err(ProxyError::MessageTooLarge(limit));
            }
            match err.downcast::<hyper::Error>() {
                Ok(err) => Err(ProxyError::Http(*err)),
                Err(_) => Err(ProxyError::ProtocolViolation("unreadable message body")),
            }
        }
    }
}
