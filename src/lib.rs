//! Notebook gateway: a protocol-aware reverse proxy between a browser and a
//! single upstream notebook server.
//!
//! Relays plain HTTP request/response pairs with `Host` rewriting, forced
//! keep-alive-off, and `Set-Cookie` security-attribute rewriting, and bridges
//! WebSocket upgrades through two independently negotiated handshakes before
//! relaying frames in both directions.

pub mod config;
pub mod health;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;

pub use config::GatewayConfig;
pub use health::HealthServer;
pub use lifecycle::Shutdown;
pub use net::FrontendListener;
pub use proxy::{ProxyContext, ProxyError};
