//! Protocol state for one connection.
//!
//! A session starts anonymous. `auth` frames run the handshake; `chat`
//! frames are only accepted once it has succeeded. Every frame resolves to a
//! reply on the same connection, except live traffic for other users.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::auth::{AuthenticatedUser, Authenticator};
use crate::broker::DeliveryEngine;
use crate::client::Connection;
use crate::transport::message::{ClientFrame, ServerFrame};
use crate::utils::ChatError;

pub struct Session {
    engine: Arc<DeliveryEngine>,
    auth: Arc<Authenticator>,
    conn: Arc<Connection>,
    user: Option<AuthenticatedUser>,
}

impl Session {
    pub fn new(
        engine: Arc<DeliveryEngine>,
        auth: Arc<Authenticator>,
        conn: Arc<Connection>,
    ) -> Self {
        Self {
            engine,
            auth,
            conn,
            user: None,
        }
    }

    pub fn user(&self) -> Option<&AuthenticatedUser> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn connection_id(&self) -> &str {
        &self.conn.id
    }

    /// Handle one inbound text frame.
    pub async fn handle_text(&mut self, text: &str) {
        match ClientFrame::decode(text) {
            Ok(ClientFrame::Auth { token }) => self.authenticate(token.as_deref()),
            Ok(ClientFrame::Chat { recipient, content }) => self.chat(&recipient, &content).await,
            Err(e) => {
                warn!(
                    connection_id = %self.conn.id,
                    error = %e,
                    frame = %text.chars().take(100).collect::<String>(),
                    "Rejected client frame"
                );
                self.reply_error(&e);
            }
        }
    }

    fn authenticate(&mut self, token: Option<&str>) {
        let user = match self.auth.verify(token) {
            Ok(user) => user,
            Err(e) => {
                warn!(connection_id = %self.conn.id, error = %e, "Handshake failed");
                self.reply(&ServerFrame::auth_failed(&e));
                return;
            }
        };

        if let Some(previous) = self.user.take() {
            if previous.id != user.id {
                self.engine.disconnect(&previous.id, &self.conn.id);
            }
        }

        info!(connection_id = %self.conn.id, user_id = %user.id, "Handshake succeeded");
        self.reply(&ServerFrame::auth_ok());

        // admission failed: stay anonymous so the client can retry the handshake
        if let Err(e) = self.engine.admit(&user.id, &self.conn) {
            error!(user_id = %user.id, error = %e, "Backlog flush failed");
            self.reply_error(&e);
            return;
        }
        self.user = Some(user);
    }

    async fn chat(&mut self, recipient: &str, content: &str) {
        let Some(user) = &self.user else {
            warn!(connection_id = %self.conn.id, "Chat frame before authentication");
            self.reply_error(&ChatError::Unauthenticated);
            return;
        };

        match self.engine.send(&user.id, recipient, content).await {
            Ok(message) => {
                debug!(message_id = %message.id, "Send accepted");
                self.reply(&ServerFrame::Sent { message });
            }
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "Send rejected");
                self.reply_error(&e);
            }
        }
    }

    pub fn reply_error(&self, err: &ChatError) {
        self.reply(&ServerFrame::error(err));
    }

    pub fn reply(&self, frame: &ServerFrame) {
        if let Err(e) = self.conn.push(frame) {
            warn!(connection_id = %self.conn.id, error = %e, "Dropped reply frame");
        }
    }

    /// Unregister on transport close. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(user) = self.user.take() {
            self.engine.disconnect(&user.id, &self.conn.id);
        }
    }
}
