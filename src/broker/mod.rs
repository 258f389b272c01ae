//! The `broker` module is the delivery side of the messaging core: the
//! per-process connection registry and the engine that persists, publishes,
//! forwards and flushes messages.

pub mod engine;
pub mod message;
pub mod registry;

pub use engine::DeliveryEngine;
pub use message::Message;
pub use registry::ConnectionRegistry;
