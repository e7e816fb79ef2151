//! Proxying subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection (net/listener.rs):
//!     → session.rs (classify request)
//!         → http.rs      (plain request: forward, rewrite, close)
//!         → websocket.rs (upgrade: dual handshake, then frame relay)
//!
//! Both paths share:
//!     → upstream.rs (fixed backend address, Host header, wss targets)
//!     → cookies.rs  (security-attribute rewriting toward the browser)
//!     → error.rs    (fatal per-connection error taxonomy)
//! ```
//!
//! # Design Decisions
//! - One backend connection per exchange; no pooling, no keep-alive
//! - Relay starts only after both WebSocket handshakes complete
//! - All failures are fatal for the connection pair; never retried

pub mod cookies;
pub mod error;
pub mod http;
pub mod session;
pub mod upstream;
pub mod websocket;

pub use error::ProxyError;
pub use session::{serve_connection, ProxyContext};
