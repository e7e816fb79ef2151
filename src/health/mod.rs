//! Health check subsystem.
//!
//! A dedicated listener, separate from the proxy data port, that answers
//! load-balancer liveness probes. It shares nothing with the proxy pipeline:
//! a hung backend never makes the gateway itself look unhealthy.

pub mod server;

pub use server::HealthServer;
