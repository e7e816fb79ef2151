//! End-to-end WebSocket proxying scenarios against a TLS echo backend.

mod common;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tungstenite::client::IntoClientRequest;
use tungstenite::Message;

#[tokio::test]
async fn frames_are_relayed_in_both_directions() {
    let (backend_port, mut handshakes) = common::start_tls_ws_echo_backend().await;
    let gateway = common::start_gateway(backend_port).await;

    let mut request = format!("ws://{gateway}/api/kernels/ws?session_id=abc")
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("cookie", "token=t1".parse().unwrap());
    request
        .headers_mut()
        .insert("origin", "http://gateway.local".parse().unwrap());

    let (mut ws, response) = tokio_tungstenite::connect_async(request).await.unwrap();
    assert_eq!(response.status(), 101);

    ws.send(Message::binary(vec![0x01, 0x02, 0x03]))
        .await
        .unwrap();
    let echoed = timeout(Duration::from_secs(10), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(echoed.into_data().to_vec(), vec![0x01, 0x02, 0x03]);

    ws.send(Message::text("kernel_info_request")).await.unwrap();
    let echoed = timeout(Duration::from_secs(10), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(echoed.into_text().unwrap(), "kernel_info_request");

    // The backend saw the forwarded cookies but never the browser's Origin.
    let headers = handshakes.recv().await.unwrap();
    assert!(headers
        .iter()
        .any(|(name, value)| name == "cookie" && value.contains("token=t1")));
    assert!(!headers.iter().any(|(name, _)| name == "origin"));
}

#[tokio::test]
async fn handshake_response_reissues_request_cookies() {
    let (backend_port, _handshakes) = common::start_tls_ws_echo_backend().await;
    let gateway = common::start_gateway(backend_port).await;

    let mut request = format!("ws://{gateway}/terminals/websocket/1")
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("cookie", "token=t1; theme=dark".parse().unwrap());

    let (_ws, response) = tokio_tungstenite::connect_async(request).await.unwrap();
    assert_eq!(response.status(), 101);

    let set_cookies: Vec<&str> = response
        .headers()
        .get_all("set-cookie")
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(set_cookies.len(), 2);
    assert!(set_cookies
        .iter()
        .any(|c| c.contains("token=t1") && c.contains("HttpOnly") && c.contains("Path=/")));

    assert_eq!(response.headers().get("server").unwrap(), "Server");
    assert_eq!(
        response.headers().get("sec-websocket-extensions").unwrap(),
        "permessage-deflate"
    );
}

#[tokio::test]
async fn unsupported_websocket_version_is_rejected_before_backend_contact() {
    let (backend_port, mut handshakes) = common::start_tls_ws_echo_backend().await;
    let gateway = common::start_gateway(backend_port).await;

    let mut stream = TcpStream::connect(gateway).await.unwrap();
    stream
        .write_all(
            b"GET /api/kernels/ws HTTP/1.1\r\n\
              Host: gateway.local:8081\r\n\
              Connection: Upgrade\r\n\
              Upgrade: websocket\r\n\
              Sec-WebSocket-Version: 99\r\n\
              Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
        )
        .await
        .unwrap();

    let mut response = Vec::new();
    timeout(Duration::from_secs(10), stream.read_to_end(&mut response))
        .await
        .expect("gateway closed the connection")
        .unwrap();
    let response = String::from_utf8_lossy(&response);

    assert!(response.starts_with("HTTP/1.1 426"));
    assert!(response
        .lines()
        .any(|line| line.to_ascii_lowercase().starts_with("sec-websocket-version:")
            && line.contains("13")));
    // The backend was never contacted.
    assert!(handshakes.try_recv().is_err());
}

#[tokio::test]
async fn client_close_tears_down_the_relay() {
    let (backend_port, _handshakes) = common::start_tls_ws_echo_backend().await;
    let gateway = common::start_gateway(backend_port).await;

    let request = format!("ws://{gateway}/api/events")
        .into_client_request()
        .unwrap();
    let (mut ws, _) = tokio_tungstenite::connect_async(request).await.unwrap();

    ws.send(Message::text("ping")).await.unwrap();
    let _ = timeout(Duration::from_secs(10), ws.next()).await.unwrap();

    ws.close(None).await.unwrap();

    // The close round-trips through the backend session; the frontend stream
    // then drains to its end.
    let drained = timeout(Duration::from_secs(10), async {
        while let Some(message) = ws.next().await {
            if message.is_err() {
                break;
            }
        }
    })
    .await;
    assert!(drained.is_ok());
}
