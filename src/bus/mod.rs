//! The `bus` module carries freshly persisted messages to every server
//! process.
//!
//! Delivery is best effort: there is no acknowledgement and nothing is
//! buffered for a subscriber that is down at publish time. Durability comes
//! from the message store, not from the bus.

pub mod local;
pub mod redis_bus;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::broker::message::Message;
use crate::config::{BusBackend, BusSettings};
use crate::utils::ChatError;

pub use local::LocalBus;
pub use redis_bus::RedisBus;

/// A serialized copy of a just-created message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutEvent {
    /// Id of the process that accepted the send.
    pub origin: String,
    pub message: Message,
}

impl FanoutEvent {
    pub fn encode(&self) -> Result<String, ChatError> {
        serde_json::to_string(self).map_err(|e| ChatError::BusUnavailable(e.to_string()))
    }

    pub fn decode(payload: &str) -> Result<Self, ChatError> {
        serde_json::from_str(payload)
            .map_err(|e| ChatError::BusUnavailable(format!("malformed fanout event: {e}")))
    }
}

/// Process-shared publish/subscribe channel.
#[derive(Clone, Debug)]
pub enum FanoutBus {
    Local(LocalBus),
    Redis(RedisBus),
}

impl FanoutBus {
    /// Build the backend named in `settings`.
    pub async fn connect(settings: &BusSettings) -> Result<Self, ChatError> {
        match settings.backend {
            BusBackend::Local => {
                info!("Using in-process fanout bus");
                Ok(FanoutBus::Local(LocalBus::default()))
            }
            BusBackend::Redis => {
                let bus = RedisBus::connect(&settings.redis_url, &settings.channel).await?;
                info!(channel = %settings.channel, "Connected to Redis fanout bus");
                Ok(FanoutBus::Redis(bus))
            }
        }
    }

    /// Broadcast `event` to all current subscribers.
    pub async fn publish(&self, event: &FanoutEvent) -> Result<(), ChatError> {
        let payload = event.encode()?;
        match self {
            FanoutBus::Local(bus) => bus.publish(payload),
            FanoutBus::Redis(bus) => bus.publish(payload).await,
        }
    }

    /// Register a process-wide handler, invoked once per received event.
    ///
    /// The returned task runs the dispatch loop; events that fail to decode
    /// are logged and skipped.
    pub fn subscribe<F>(&self, handler: F) -> JoinHandle<()>
    where
        F: Fn(FanoutEvent) + Send + Sync + 'static,
    {
        let dispatch = move |payload: String| match FanoutEvent::decode(&payload) {
            Ok(event) => handler(event),
            Err(e) => warn!(error = %e, "Dropping undecodable fanout event"),
        };

        match self {
            FanoutBus::Local(bus) => bus.subscribe(dispatch),
            FanoutBus::Redis(bus) => bus.subscribe(dispatch),
        }
    }
}
