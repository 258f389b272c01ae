//! The `transport` module handles network communication with clients over
//! WebSockets.
//!
//! It defines the JSON frame protocol, the per-connection session state
//! machine and the server that accepts sockets and drives sessions.

pub mod message;
pub mod session;
pub mod websocket;

pub use message::{ClientFrame, ServerFrame};
pub use session::Session;
pub use websocket::{serve, start_websocket_server};

#[cfg(test)]
mod websocket_tests;
