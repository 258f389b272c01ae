//! Message store backed by `sled`
//!
//! Messages live in the `messages` tree keyed by their id. Ids are the
//! zero-padded form of `Db::generate_id`, so iterating the tree yields
//! messages in append order. Two secondary trees keep lookups off the full
//! log:
//! - `unread`: `recipient \0 id` for every message not yet read
//! - `participants`: `user \0 id` for both sides of every message
//!
//! Every write that touches more than one tree runs in a single sled
//! transaction.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sled::transaction::{ConflictableTransactionError, TransactionalTree};
use sled::{Db, Transactional, Tree};

use crate::broker::message::Message;
use crate::persistence::users::IdentityResolver;
use crate::utils::ChatError;

const EMPTY: &[u8] = &[];

/// Latest message and unread count for one counterpart of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub counterpart: String,
    pub last_message: Message,
    pub unread_count: usize,
}

#[derive(Clone)]
pub struct MessageStore {
    db: Db,
    messages: Tree,
    unread: Tree,
    participants: Tree,
    users: Arc<dyn IdentityResolver>,
}

impl MessageStore {
    /// Open the store's trees inside `db`. Recipients are validated against `users`.
    pub fn open(db: &Db, users: Arc<dyn IdentityResolver>) -> Result<Self, ChatError> {
        Ok(Self {
            db: db.clone(),
            messages: db.open_tree("messages")?,
            unread: db.open_tree("unread")?,
            participants: db.open_tree("participants")?,
            users,
        })
    }

    /// Persist a new message with `read = false`.
    pub fn append(
        &self,
        sender: &str,
        recipient: &str,
        content: &str,
    ) -> Result<Message, ChatError> {
        if content.is_empty() {
            return Err(ChatError::Validation("content must not be empty".into()));
        }
        if recipient.is_empty() || !self.users.exists(recipient)? {
            return Err(ChatError::Validation(format!(
                "recipient '{recipient}' does not exist"
            )));
        }

        let msg = Message {
            id: format!("{:020}", self.db.generate_id()?),
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            content: content.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            read: false,
        };
        let value = encode(&msg)?;

        (&self.messages, &self.unread, &self.participants).transaction(
            |(messages, unread, participants)| {
                messages.insert(msg.id.as_bytes(), value.clone())?;
                unread.insert(index_key(&msg.recipient, &msg.id), EMPTY)?;
                participants.insert(index_key(&msg.sender, &msg.id), EMPTY)?;
                participants.insert(index_key(&msg.recipient, &msg.id), EMPTY)?;
                Ok::<_, ConflictableTransactionError<ChatError>>(())
            },
        )?;

        Ok(msg)
    }

    pub fn get(&self, id: &str) -> Result<Option<Message>, ChatError> {
        self.messages
            .get(id.as_bytes())?
            .map(|raw| decode(&raw))
            .transpose()
    }

    pub fn is_unread(&self, id: &str) -> Result<bool, ChatError> {
        Ok(self.get(id)?.is_some_and(|m| !m.read))
    }

    /// All unread messages addressed to `user_id`, oldest first.
    pub fn unread_for(&self, user_id: &str) -> Result<Vec<Message>, ChatError> {
        let mut out = Vec::new();
        for entry in self.unread.scan_prefix(index_prefix(user_id)) {
            let (key, _) = entry?;
            if let Some(msg) = self.get(id_from_index(&key))? {
                out.push(msg);
            }
        }
        sort_in_append_order(&mut out);
        Ok(out)
    }

    /// Mark the given ids read. Unknown or already-read ids are skipped.
    /// Returns how many messages actually changed.
    pub fn mark_read(&self, ids: &[String]) -> Result<usize, ChatError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let changed = (&self.messages, &self.unread).transaction(|(messages, unread)| {
            let mut changed = 0;
            for id in ids {
                if mark_one(messages, unread, id)? {
                    changed += 1;
                }
            }
            Ok::<_, ConflictableTransactionError<ChatError>>(changed)
        })?;

        Ok(changed)
    }

    /// Mark every unread message from `sender` to `recipient` read.
    pub fn mark_read_from(&self, sender: &str, recipient: &str) -> Result<usize, ChatError> {
        let ids: Vec<String> = self
            .unread_for(recipient)?
            .into_iter()
            .filter(|m| m.sender == sender)
            .map(|m| m.id)
            .collect();
        self.mark_read(&ids)
    }

    /// Messages exchanged between two users, oldest first, at most `limit`.
    pub fn conversation_between(
        &self,
        user_a: &str,
        user_b: &str,
        limit: usize,
    ) -> Result<Vec<Message>, ChatError> {
        let mut out: Vec<Message> = self
            .messages_involving(user_a)?
            .into_iter()
            .filter(|m| m.counterpart(user_a) == user_b)
            .collect();
        sort_in_append_order(&mut out);
        out.truncate(limit);
        Ok(out)
    }

    /// One entry per counterpart of `user_id`, most recent conversation first.
    pub fn conversation_summaries(&self, user_id: &str) -> Result<Vec<Conversation>, ChatError> {
        let mut by_counterpart: HashMap<String, Conversation> = HashMap::new();

        for msg in self.messages_involving(user_id)? {
            let unread = usize::from(msg.recipient == user_id && !msg.read);
            let counterpart = msg.counterpart(user_id).to_string();

            match by_counterpart.get_mut(&counterpart) {
                Some(conv) => {
                    conv.unread_count += unread;
                    if is_newer(&msg, &conv.last_message) {
                        conv.last_message = msg;
                    }
                }
                None => {
                    by_counterpart.insert(
                        counterpart.clone(),
                        Conversation {
                            counterpart,
                            last_message: msg,
                            unread_count: unread,
                        },
                    );
                }
            }
        }

        let mut out: Vec<Conversation> = by_counterpart.into_values().collect();
        out.sort_by(|a, b| b.last_message.id.cmp(&a.last_message.id));
        Ok(out)
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn messages_involving(&self, user_id: &str) -> Result<Vec<Message>, ChatError> {
        let mut out = Vec::new();
        for entry in self.participants.scan_prefix(index_prefix(user_id)) {
            let (key, _) = entry?;
            if let Some(msg) = self.get(id_from_index(&key))? {
                out.push(msg);
            }
        }
        Ok(out)
    }
}

fn mark_one(
    messages: &TransactionalTree,
    unread: &TransactionalTree,
    id: &str,
) -> Result<bool, ConflictableTransactionError<ChatError>> {
    let Some(raw) = messages.get(id.as_bytes())? else {
        return Ok(false);
    };
    let mut msg = decode(&raw).map_err(ConflictableTransactionError::Abort)?;
    if msg.read {
        return Ok(false);
    }

    msg.read = true;
    let value = encode(&msg).map_err(ConflictableTransactionError::Abort)?;
    messages.insert(id.as_bytes(), value)?;
    unread.remove(index_key(&msg.recipient, id))?;
    Ok(true)
}

fn index_prefix(user_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(user_id.len() + 1);
    key.extend_from_slice(user_id.as_bytes());
    key.push(0);
    key
}

fn index_key(user_id: &str, id: &str) -> Vec<u8> {
    let mut key = index_prefix(user_id);
    key.extend_from_slice(id.as_bytes());
    key
}

fn id_from_index(key: &[u8]) -> &str {
    let start = key.iter().position(|b| *b == 0).map_or(0, |p| p + 1);
    std::str::from_utf8(&key[start..]).unwrap_or_default()
}

fn is_newer(a: &Message, b: &Message) -> bool {
    a.id > b.id
}

/// Ids are a monotonic sequence, unlike wall-clock timestamps.
fn sort_in_append_order(messages: &mut [Message]) {
    messages.sort_by(|a, b| a.id.cmp(&b.id));
}

fn encode(msg: &Message) -> Result<Vec<u8>, ChatError> {
    serde_json::to_vec(msg).map_err(|e| ChatError::StoreUnavailable(e.to_string()))
}

fn decode(raw: &[u8]) -> Result<Message, ChatError> {
    serde_json::from_slice(raw)
        .map_err(|e| ChatError::StoreUnavailable(format!("corrupt message record: {e}")))
}

impl std::fmt::Debug for MessageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStore")
            .field("db", &"sled::Db")
            .finish()
    }
}
