//! Frontend TCP listener.
//!
//! # Responsibilities
//! - Bind the proxy data port and accept frontend connections
//! - Spawn one proxy session task per accepted connection
//! - Stop accepting when shutdown is signalled
//!
//! There is no connection limit or admission control; each accepted socket is
//! handed straight to a proxy session, which owns it until it closes.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::proxy::{serve_connection, ProxyContext};

/// Accept loop for the reverse-proxy data port.
pub struct FrontendListener {
    listener: TcpListener,
    ctx: Arc<ProxyContext>,
}

impl FrontendListener {
    /// Bind the listener to the configured address.
    pub async fn bind(bind_address: &str, ctx: Arc<ProxyContext>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind_address).await?;
        Ok(Self { listener, ctx })
    }

    /// The address the listener is actually bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown is signalled.
    ///
    /// In-flight sessions are not interrupted; they run to completion on
    /// their own tasks after the accept loop returns.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            address = %self.listener.local_addr().map(|a| a.to_string()).unwrap_or_default(),
            "Proxy listener accepting connections"
        );

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tracing::debug!(peer = %peer, "Accepted frontend connection");
                            let ctx = Arc::clone(&self.ctx);
                            tokio::spawn(serve_connection(ctx, stream));
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "Accept failed");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Proxy listener shutting down");
                    break;
                }
            }
        }
    }
}
