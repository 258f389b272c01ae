use serde::{Deserialize, Serialize};

/// A persisted direct message.
///
/// Everything except `read` is immutable once stored, and `read` only ever
/// moves from `false` to `true`.
///
/// # Fields
///
/// - `id` - Store-assigned, zero-padded sequence; id order is append order.
/// - `sender` / `recipient` - User ids.
/// - `content` - Non-empty text payload.
/// - `timestamp` - Unix timestamp in milliseconds at append time.
/// - `read` - Whether the recipient has been handed this message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub content: String,
    pub timestamp: i64,
    #[serde(default)]
    pub read: bool,
}

impl Message {
    /// The other participant of the conversation, seen from `user_id`.
    pub fn counterpart(&self, user_id: &str) -> &str {
        if self.sender == user_id {
            &self.recipient
        } else {
            &self.sender
        }
    }
}
