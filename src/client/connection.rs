use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tungstenite::protocol::Message as WsMessage;

use crate::transport::message::ServerFrame;

/// Why a frame could not be queued for a connection.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("outbound queue full")]
    Full,
    #[error("connection closed")]
    Closed,
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Per-connection delivery bookkeeping, guarded by the connection's gate.
#[derive(Debug, Default)]
pub struct DeliveryState {
    /// Set once the connect-time backlog has been queued; live forwards are
    /// withheld until then.
    pub backlog_flushed: bool,
}

/// One live WebSocket as seen by the delivery engine.
#[derive(Debug)]
pub struct Connection {
    /// Unique per socket, used to tell a stale close from a newer registration.
    pub id: String,
    sender: Sender<WsMessage>,
    gate: Mutex<DeliveryState>,
}

impl Connection {
    /// Create a connection with an outbound queue of `buffer` frames and
    /// return the receiving end for the writer task.
    pub fn new(buffer: usize) -> (Self, Receiver<WsMessage>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let conn = Self {
            id: format!("conn-{}", uuid::Uuid::new_v4()),
            sender,
            gate: Mutex::new(DeliveryState::default()),
        };
        (conn, receiver)
    }

    /// Queue a frame without waiting. A full queue drops the frame.
    pub fn push(&self, frame: &ServerFrame) -> Result<(), PushError> {
        let msg = frame.to_ws()?;
        self.sender.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PushError::Full,
            mpsc::error::TrySendError::Closed(_) => PushError::Closed,
        })
    }

    /// False once the writer task has stopped draining the queue.
    pub fn is_live(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Acquire the delivery gate. Held only across synchronous work.
    pub fn gate(&self) -> MutexGuard<'_, DeliveryState> {
        self.gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
