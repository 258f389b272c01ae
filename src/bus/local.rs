use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::utils::ChatError;

const DEFAULT_CAPACITY: usize = 1024;

/// In-process bus over a `tokio` broadcast channel.
///
/// Every engine holding a clone of the same `LocalBus` behaves like a
/// separate server process attached to one shared channel.
#[derive(Clone, Debug)]
pub struct LocalBus {
    sender: broadcast::Sender<String>,
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl LocalBus {
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, payload: String) -> Result<(), ChatError> {
        match self.sender.send(payload) {
            Ok(receivers) => {
                debug!(receivers, "Published fanout event");
                Ok(())
            }
            // nobody listening is not a failure
            Err(_) => {
                debug!("Published fanout event with no subscribers");
                Ok(())
            }
        }
    }

    pub fn subscribe<F>(&self, dispatch: F) -> JoinHandle<()>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let mut receiver = self.sender.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(payload) => dispatch(payload),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Fanout subscriber lagged; live hints dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Local fanout subscription ended");
        })
    }
}
