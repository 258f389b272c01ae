//! Redis pub/sub backend.
//!
//! Publishing goes through a multiplexed connection shared by all callers.
//! Subscribing holds a dedicated pub/sub connection; when it fails or the
//! message stream ends, the subscriber reconnects and resubscribes. Events
//! published while it is disconnected are never seen by this process.

use std::time::Duration;

use futures_util::StreamExt;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::utils::ChatError;

const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct RedisBus {
    client: redis::Client,
    publisher: MultiplexedConnection,
    channel: String,
}

impl RedisBus {
    pub async fn connect(url: &str, channel: &str) -> Result<Self, ChatError> {
        let client = redis::Client::open(url)?;
        let publisher = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            client,
            publisher,
            channel: channel.to_string(),
        })
    }

    pub async fn publish(&self, payload: String) -> Result<(), ChatError> {
        let mut conn = self.publisher.clone();
        let _: () = conn.publish(&self.channel, payload).await?;
        Ok(())
    }

    pub fn subscribe<F>(&self, dispatch: F) -> JoinHandle<()>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let client = self.client.clone();
        let channel = self.channel.clone();

        tokio::spawn(async move {
            loop {
                let mut pubsub = match client.get_async_pubsub().await {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!(error = %e, "Failed to open Redis pub/sub connection, retrying");
                        tokio::time::sleep(RESUBSCRIBE_DELAY).await;
                        continue;
                    }
                };

                if let Err(e) = pubsub.subscribe(channel.as_str()).await {
                    error!(error = %e, channel = %channel, "Failed to subscribe, retrying");
                    tokio::time::sleep(RESUBSCRIBE_DELAY).await;
                    continue;
                }
                info!(channel = %channel, "Subscribed to fanout channel");

                let mut stream = pubsub.on_message();
                while let Some(msg) = stream.next().await {
                    match msg.get_payload::<String>() {
                        Ok(payload) => dispatch(payload),
                        Err(e) => warn!(error = %e, "Failed to read pub/sub payload"),
                    }
                }

                warn!(channel = %channel, "Pub/sub stream ended, resubscribing");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        })
    }
}

impl std::fmt::Debug for RedisBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBus")
            .field("channel", &self.channel)
            .finish()
    }
}
