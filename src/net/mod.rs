//! Network layer: frontend accept loop and outbound backend connections.

pub mod connection;
pub mod connector;
pub mod listener;

pub use connection::ConnectionId;
pub use connector::BackendConnector;
pub use listener::FrontendListener;
