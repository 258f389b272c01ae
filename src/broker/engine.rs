//! Delivery engine
//!
//! Every send moves through `received -> persisted -> published` on the
//! accepting process, then `forwarded` or `backlogged` on whichever process
//! the recipient is connected to (if any):
//! - the message is appended to the store first; a store failure aborts the
//!   send with nothing published
//! - the stored record is published on the fanout bus; a bus failure is
//!   logged and does not fail the send, since the store already holds it
//! - each process's bus handler looks the recipient up in its own registry
//!   and, on a hit, queues a `chat` frame and marks the message read
//!
//! On admission the engine flushes the user's unread backlog as a single
//! frame before any live forward reaches that connection. Both paths run
//! under the connection's delivery gate, which only guards synchronous work,
//! so the bus dispatch loop never waits on socket I/O.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broker::message::Message;
use crate::broker::registry::ConnectionRegistry;
use crate::bus::{FanoutBus, FanoutEvent};
use crate::client::{Connection, PushError};
use crate::persistence::MessageStore;
use crate::transport::message::ServerFrame;
use crate::utils::ChatError;

#[derive(Debug)]
pub struct DeliveryEngine {
    process_id: String,
    store: MessageStore,
    bus: FanoutBus,
    registry: ConnectionRegistry,
}

impl DeliveryEngine {
    pub fn new(store: MessageStore, bus: FanoutBus) -> Self {
        Self {
            process_id: format!("proc-{}", uuid::Uuid::new_v4()),
            store,
            bus,
            registry: ConnectionRegistry::new(),
        }
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Subscribe this process to the fanout bus.
    ///
    /// The dispatch task only holds a weak reference, so dropping the last
    /// engine handle closes a local bus and ends the task. Abort the returned
    /// handle to stop a Redis subscription.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::downgrade(self);
        info!(process_id = %self.process_id, "Delivery engine subscribed to fanout bus");
        self.bus.subscribe(move |event| {
            if let Some(engine) = engine.upgrade() {
                engine.forward(event);
            }
        })
    }

    /// Persist and publish a message from an authenticated sender.
    pub async fn send(
        &self,
        sender: &str,
        recipient: &str,
        content: &str,
    ) -> Result<Message, ChatError> {
        let message = self.store.append(sender, recipient, content)?;
        debug!(message_id = %message.id, sender, recipient, "Message persisted");

        let event = FanoutEvent {
            origin: self.process_id.clone(),
            message: message.clone(),
        };
        if let Err(e) = self.bus.publish(&event).await {
            warn!(
                error = %e,
                message_id = %message.id,
                "Fanout publish failed; message stays in the recipient's backlog"
            );
        }

        Ok(message)
    }

    /// Bus handler: hand the message to the recipient if it is connected to
    /// this process. Returns whether a `chat` frame was queued.
    pub fn forward(&self, event: FanoutEvent) -> bool {
        let message = event.message;
        let Some(conn) = self.registry.lookup(&message.recipient) else {
            debug!(message_id = %message.id, "Recipient not connected to this process");
            return false;
        };
        if !conn.is_live() {
            debug!(message_id = %message.id, connection_id = %conn.id, "Recipient connection is closing");
            return false;
        }

        let state = conn.gate();
        if !state.backlog_flushed {
            // still unread, so the pending flush picks it up
            debug!(message_id = %message.id, "Backlog not flushed yet; withholding live forward");
            return false;
        }

        match self.store.is_unread(&message.id) {
            Ok(true) => {}
            Ok(false) => {
                debug!(message_id = %message.id, "Message already read; skipping forward");
                return false;
            }
            Err(e) => {
                warn!(error = %e, message_id = %message.id, "Could not check read state");
                return false;
            }
        }

        let id = message.id.clone();
        let recipient = message.recipient.clone();
        match conn.push(&ServerFrame::Chat { message }) {
            Ok(()) => {}
            Err(PushError::Full) => {
                warn!(
                    message_id = %id,
                    connection_id = %conn.id,
                    "Outbound queue full; dropping live forward"
                );
                return false;
            }
            Err(e) => {
                debug!(error = %e, message_id = %id, "Live forward failed");
                return false;
            }
        }

        if let Err(e) = self.store.mark_read(std::slice::from_ref(&id)) {
            warn!(error = %e, message_id = %id, "Failed to mark forwarded message read");
        }
        debug!(message_id = %id, recipient = %recipient, "Message forwarded");
        drop(state);
        true
    }

    /// Register an authenticated connection and flush its backlog.
    pub fn admit(&self, user_id: &str, conn: &Arc<Connection>) -> Result<usize, ChatError> {
        conn.gate().backlog_flushed = false;

        if let Some(previous) = self.registry.register(user_id, Arc::clone(conn)) {
            if previous.id != conn.id {
                info!(
                    user_id,
                    superseded = %previous.id,
                    connection_id = %conn.id,
                    "Newer connection supersedes previous registration"
                );
            }
        }

        match self.flush_backlog(user_id, conn) {
            Ok(count) => Ok(count),
            Err(e) => {
                // never leave a registration behind a closed gate
                self.registry.unregister(user_id, &conn.id);
                Err(e)
            }
        }
    }

    /// Queue every unread message for `user_id` as one `backlog` frame, then
    /// mark them read. Returns how many messages were flushed.
    ///
    /// On failure the messages stay unread and the gate stays closed.
    pub fn flush_backlog(&self, user_id: &str, conn: &Connection) -> Result<usize, ChatError> {
        let mut state = conn.gate();

        let unread = self.store.unread_for(user_id)?;
        let ids: Vec<String> = unread.iter().map(|m| m.id.clone()).collect();

        if let Err(e) = conn.push(&ServerFrame::Backlog { messages: unread }) {
            warn!(error = %e, user_id, connection_id = %conn.id, "Could not queue backlog");
            return Err(ChatError::DeliveryFailed(format!("backlog not queued: {e}")));
        }

        self.store.mark_read(&ids)?;
        state.backlog_flushed = true;

        info!(user_id, count = ids.len(), "Backlog flushed");
        Ok(ids.len())
    }

    /// Drop the registration for a closing connection.
    pub fn disconnect(&self, user_id: &str, connection_id: &str) -> bool {
        let removed = self.registry.unregister(user_id, connection_id);
        if removed {
            debug!(user_id, connection_id, "Connection unregistered");
        } else {
            debug!(user_id, connection_id, "Stale close; registration already superseded");
        }
        removed
    }
}
