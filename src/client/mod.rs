//! The `client` module defines the server-side view of one live socket.
//!
//! A `Connection` owns the sending half of the socket (through a bounded
//! queue drained by a writer task) and the delivery gate that orders the
//! connect-time backlog ahead of live traffic.

pub mod connection;
pub use connection::{Connection, DeliveryState, PushError};
