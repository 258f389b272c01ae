//! Error taxonomy for the messaging core.
//!
//! Every failure is scoped to a single connection or a single send; nothing
//! here is fatal to the process. Each variant maps to a stable wire code that
//! is sent to clients as the `message` of an `error` frame.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Missing, badly signed or expired credential.
    #[error("auth-failed: {0}")]
    AuthFailed(String),

    /// The credential's subject no longer exists.
    #[error("user-not-found")]
    UserNotFound,

    /// Chat traffic on a connection that has not completed the handshake.
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("validation-error: {0}")]
    Validation(String),

    #[error("unknown-type: {0}")]
    UnknownType(String),

    #[error("handshake-timeout")]
    HandshakeTimeout,

    #[error("bus-unavailable: {0}")]
    BusUnavailable(String),

    #[error("store-unavailable: {0}")]
    StoreUnavailable(String),

    /// A frame could not be queued on the recipient's own connection.
    #[error("delivery-failed: {0}")]
    DeliveryFailed(String),
}

impl ChatError {
    /// Stable code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::AuthFailed(_) => "auth-failed",
            ChatError::UserNotFound => "user-not-found",
            ChatError::Unauthenticated => "unauthenticated",
            ChatError::Validation(_) => "validation-error",
            ChatError::UnknownType(_) => "unknown-type",
            ChatError::HandshakeTimeout => "handshake-timeout",
            ChatError::BusUnavailable(_) => "bus-unavailable",
            ChatError::StoreUnavailable(_) => "store-unavailable",
            ChatError::DeliveryFailed(_) => "delivery-failed",
        }
    }

    /// Human readable detail, if the variant carries one.
    pub fn detail(&self) -> Option<String> {
        match self {
            ChatError::AuthFailed(d)
            | ChatError::Validation(d)
            | ChatError::UnknownType(d)
            | ChatError::BusUnavailable(d)
            | ChatError::StoreUnavailable(d)
            | ChatError::DeliveryFailed(d) => Some(d.clone()),
            _ => None,
        }
    }
}

impl From<sled::Error> for ChatError {
    fn from(e: sled::Error) -> Self {
        ChatError::StoreUnavailable(e.to_string())
    }
}

impl From<sled::transaction::TransactionError<ChatError>> for ChatError {
    fn from(e: sled::transaction::TransactionError<ChatError>) -> Self {
        match e {
            sled::transaction::TransactionError::Abort(inner) => inner,
            sled::transaction::TransactionError::Storage(e) => e.into(),
        }
    }
}

impl From<redis::RedisError> for ChatError {
    fn from(e: redis::RedisError) -> Self {
        ChatError::BusUnavailable(e.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for ChatError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        ChatError::AuthFailed(e.to_string())
    }
}
