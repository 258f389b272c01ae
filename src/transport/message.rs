//! JSON frames exchanged over each connection, one object per WebSocket
//! text message, discriminated by `type`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tungstenite::protocol::Message as WsMessage;

use crate::broker::message::Message;
use crate::utils::ChatError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Present a credential.
    Auth {
        #[serde(default)]
        token: Option<String>,
    },
    /// Send a direct message.
    Chat { recipient: String, content: String },
}

const CLIENT_FRAME_TYPES: &[&str] = &["auth", "chat"];

impl ClientFrame {
    /// Decode a text frame. Unknown `type` values are reported separately
    /// from malformed payloads of a known type.
    pub fn decode(text: &str) -> Result<Self, ChatError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ChatError::Validation(format!("malformed frame: {e}")))?;

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ChatError::Validation("frame has no type".into()))?
            .to_string();

        if !CLIENT_FRAME_TYPES.contains(&kind.as_str()) {
            return Err(ChatError::UnknownType(kind));
        }

        serde_json::from_value(value)
            .map_err(|e| ChatError::Validation(format!("invalid {kind} frame: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Handshake outcome.
    Auth {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Unread messages flushed right after a successful handshake.
    Backlog { messages: Vec<Message> },
    /// A live-forwarded message.
    Chat { message: Message },
    /// Acknowledges a send; carries the persisted record.
    Sent { message: Message },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl ServerFrame {
    pub fn auth_ok() -> Self {
        ServerFrame::Auth {
            success: true,
            error: None,
        }
    }

    pub fn auth_failed(err: &ChatError) -> Self {
        ServerFrame::Auth {
            success: false,
            error: Some(err.to_string()),
        }
    }

    pub fn error(err: &ChatError) -> Self {
        ServerFrame::Error {
            message: err.code().to_string(),
            detail: err.detail(),
        }
    }

    pub fn to_ws(&self) -> Result<WsMessage, serde_json::Error> {
        Ok(WsMessage::text(serde_json::to_string(self)?))
    }
}
