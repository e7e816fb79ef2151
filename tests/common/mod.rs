//! Shared utilities for integration testing.
//!
//! Provides a TLS-terminating mock notebook backend (plain HTTP and WebSocket
//! echo variants) and a helper that boots the gateway against it on ephemeral
//! ports. The mock backends capture what they received so tests can assert on
//! the exact bytes the gateway forwarded.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use notebook_gateway::config::{GatewayConfig, UpstreamConfig};
use notebook_gateway::{FrontendListener, ProxyContext, Shutdown};
use rcgen::generate_simple_self_signed;
use rustls::pki_types::PrivatePkcs8KeyDer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;

/// TLS acceptor with a freshly minted self-signed certificate.
pub fn tls_acceptor() -> TlsAcceptor {
    let minted = generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert = minted.cert.der().clone();
    let key = PrivatePkcs8KeyDer::from(minted.key_pair.serialize_der());
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert], key.into())
        .unwrap();
    TlsAcceptor::from(Arc::new(config))
}

/// Start a TLS-wrapped HTTP backend that answers every request with the given
/// raw response and closes. Returns its port and a channel yielding the raw
/// request head it received for each exchange.
pub async fn start_tls_http_backend(response: &'static str) -> (u16, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let acceptor = tls_acceptor();
    let (tx, rx) = mpsc::channel(16);

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            let acceptor = acceptor.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let Ok(mut tls) = acceptor.accept(socket).await else {
                    return;
                };
                let mut buf = [0u8; 16 * 1024];
                let mut received = Vec::new();
                loop {
                    match tls.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            received.extend_from_slice(&buf[..n]);
                            if received.windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                        }
                    }
                }
                let _ = tx.send(String::from_utf8_lossy(&received).into_owned()).await;
                let _ = tls.write_all(response.as_bytes()).await;
                let _ = tls.shutdown().await;
            });
        }
    });

    (port, rx)
}

/// Start a TLS-wrapped WebSocket echo backend. Returns its port and a channel
/// yielding the handshake request headers for each accepted session.
pub async fn start_tls_ws_echo_backend() -> (u16, mpsc::Receiver<Vec<(String, String)>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let acceptor = tls_acceptor();
    let (tx, rx) = mpsc::channel(16);

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            let acceptor = acceptor.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let Ok(tls) = acceptor.accept(socket).await else {
                    return;
                };
                let callback = {
                    let tx = tx.clone();
                    move |req: &tungstenite::handshake::server::Request,
                          resp: tungstenite::handshake::server::Response| {
                        let headers = req
                            .headers()
                            .iter()
                            .map(|(name, value)| {
                                (
                                    name.as_str().to_owned(),
                                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                                )
                            })
                            .collect();
                        let _ = tx.try_send(headers);
                        Ok(resp)
                    }
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(tls, callback).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    if message.is_close() {
                        break;
                    }
                    if (message.is_text() || message.is_binary())
                        && ws.send(message).await.is_err()
                    {
                        break;
                    }
                }
                let _ = ws.close(None).await;
            });
        }
    });

    (port, rx)
}

/// Boot the gateway's proxy listener on an ephemeral port, pointed at the
/// given mock backend port. Returns the frontend address to connect to.
pub async fn start_gateway(backend_port: u16) -> SocketAddr {
    let mut config = GatewayConfig::default();
    config.upstream = UpstreamConfig {
        host: "localhost".to_string(),
        port: backend_port,
        danger_accept_invalid_certs: true,
    };
    config.listener.bind_address = "127.0.0.1:0".to_string();

    let ctx = Arc::new(ProxyContext::from_config(&config).unwrap());
    let listener = FrontendListener::bind(&config.listener.bind_address, ctx)
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    // Leak the coordinator so the listener runs for the whole test process.
    std::mem::forget(shutdown);
    tokio::spawn(listener.run(receiver));

    addr
}
