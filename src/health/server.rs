//! Liveness endpoint.
//!
//! # Responsibilities
//! - Answer `GET /deep_ping` with `200 OK` and the body `healthy`
//! - Answer anything else with `404 Not Found`
//! - Close every connection after a single response
//!
//! The response is written by hand rather than through an HTTP server stack:
//! the probe protocol is a single fixed exchange, and the wire format
//! (including the `Connection: keep-alive` header the prober expects, even
//! though the socket closes right after) is part of the contract.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

const PING_PATH: &str = "/deep_ping";
const PING_BODY: &str = "healthy";

/// Standalone listener answering liveness probes.
pub struct HealthServer {
    listener: TcpListener,
}

impl HealthServer {
    /// Bind the health listener to the configured address.
    pub async fn bind(bind_address: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind_address).await?;
        Ok(Self { listener })
    }

    /// The address the listener is actually bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept and answer probes until shutdown is signalled.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            address = %self.listener.local_addr().map(|a| a.to_string()).unwrap_or_default(),
            "Health listener accepting probes"
        );

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, _peer)) => {
                            tokio::spawn(async move {
                                if let Err(err) = answer_probe(stream).await {
                                    tracing::debug!(error = %err, "Health probe connection failed");
                                }
                            });
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "Health accept failed");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health listener shutting down");
                    break;
                }
            }
        }
    }
}

/// Read one request head, write one fixed response, close.
async fn answer_probe(mut stream: TcpStream) -> std::io::Result<()> {
    let mut buf = [0u8; 1024];
    let mut head = Vec::new();

    // Read until the end of the request head; the probe carries no body.
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        head.extend_from_slice(&buf[..n]);
        if head.windows(4).any(|w| w == b"\r\n\r\n") || head.len() > 8 * 1024 {
            break;
        }
    }

    let request_line = std::str::from_utf8(&head)
        .ok()
        .and_then(|s| s.lines().next())
        .unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("");

    let response = if method == "GET" && path == PING_PATH {
        tracing::trace!("Answering liveness probe");
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nConnection: keep-alive\r\nContent-Length: {}\r\n\r\n{}",
            PING_BODY.len(),
            PING_BODY
        )
    } else {
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n".to_string()
    };

    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    stream.shutdown().await
}
