//! The `persistence` module owns everything that outlives a connection:
//! the durable message log with its read flags, and the user directory the
//! handshake resolves credentials against.
//!
//! Both are trees inside one `sled` database.

pub mod sled_store;
pub mod users;

pub use sled_store::{Conversation, MessageStore};
pub use users::{IdentityResolver, User, UserDirectory};

use crate::utils::ChatError;

/// Open (or create) the sled database at `path`.
pub fn open_db(path: &str) -> Result<sled::Db, ChatError> {
    Ok(sled::open(path)?)
}
