//! Read-only conversation views for the history endpoints that sit in front
//! of this core.
//!
//! Opening a conversation counts as reading it: everything the other user
//! sent to the viewer is marked read.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::broker::message::Message;
use crate::persistence::{IdentityResolver, MessageStore};
use crate::utils::ChatError;

/// Most recent message and unread count for one counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub user_id: String,
    pub username: String,
    pub last_message: String,
    pub timestamp: i64,
    pub unread_count: usize,
}

pub struct HistoryService {
    store: MessageStore,
    users: Arc<dyn IdentityResolver>,
    default_limit: usize,
}

impl HistoryService {
    pub fn new(store: MessageStore, users: Arc<dyn IdentityResolver>, default_limit: usize) -> Self {
        Self {
            store,
            users,
            default_limit,
        }
    }

    /// Messages between `current` and `other`, oldest first, then mark
    /// `other`'s messages to `current` read.
    pub fn messages_with(
        &self,
        current: &str,
        other: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, ChatError> {
        let limit = limit.unwrap_or(self.default_limit);
        let messages = self.store.conversation_between(current, other, limit)?;
        let marked = self.store.mark_read_from(other, current)?;
        debug!(user_id = current, counterpart = other, marked, "Conversation opened");
        Ok(messages)
    }

    /// One summary per counterpart, newest conversation first. Counterparts
    /// whose account no longer exists are left out.
    pub fn conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>, ChatError> {
        let mut out = Vec::new();
        for conv in self.store.conversation_summaries(user_id)? {
            let Some(user) = self.users.resolve(&conv.counterpart)? else {
                continue;
            };
            out.push(ConversationSummary {
                user_id: user.id,
                username: user.username,
                last_message: conv.last_message.content,
                timestamp: conv.last_message.timestamp,
                unread_count: conv.unread_count,
            });
        }
        Ok(out)
    }
}

impl std::fmt::Debug for HistoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryService")
            .field("default_limit", &self.default_limit)
            .finish()
    }
}
