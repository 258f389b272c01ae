//! User records and the identity-resolver seam.
//!
//! Registration and credential hashing live outside this crate; the
//! directory only stores what it is given and answers lookups for the
//! handshake and the message store.

use serde::{Deserialize, Serialize};
use sled::transaction::ConflictableTransactionError;
use sled::{Db, Transactional, Tree};

use crate::utils::ChatError;

/// A user as stored. `password_hash` is never serialized outward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
}

/// Resolves credential subjects and user ids to user records.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, subject: &str) -> Result<Option<User>, ChatError>;

    fn exists(&self, user_id: &str) -> Result<bool, ChatError> {
        Ok(self.resolve(user_id)?.is_some())
    }
}

#[derive(Serialize, Deserialize)]
struct StoredUser {
    username: String,
    password_hash: String,
}

/// sled-backed user directory.
#[derive(Clone)]
pub struct UserDirectory {
    db: Db,
    users: Tree,
    usernames: Tree,
}

impl UserDirectory {
    pub fn open(db: &Db) -> Result<Self, ChatError> {
        Ok(Self {
            db: db.clone(),
            users: db.open_tree("users")?,
            usernames: db.open_tree("usernames")?,
        })
    }

    /// Insert a new user. Usernames are unique.
    pub fn create(&self, username: &str, password_hash: &str) -> Result<User, ChatError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ChatError::Validation("username must not be empty".into()));
        }

        let id = format!("{:020}", self.db.generate_id()?);
        let record = StoredUser {
            username: username.to_string(),
            password_hash: password_hash.to_string(),
        };
        let value = serde_json::to_vec(&record)
            .map_err(|e| ChatError::StoreUnavailable(e.to_string()))?;

        (&self.users, &self.usernames).transaction(|(users, usernames)| {
            if usernames.get(username.as_bytes())?.is_some() {
                return Err(ConflictableTransactionError::Abort(ChatError::Validation(
                    format!("username '{username}' is taken"),
                )));
            }
            usernames.insert(username.as_bytes(), id.as_bytes())?;
            users.insert(id.as_bytes(), value.clone())?;
            Ok(())
        })?;

        Ok(User {
            id,
            username: record.username,
            password_hash: record.password_hash,
        })
    }

    pub fn find_by_username(&self, username: &str) -> Result<Option<User>, ChatError> {
        match self.usernames.get(username.as_bytes())? {
            Some(id) => self.resolve(&String::from_utf8_lossy(&id)),
            None => Ok(None),
        }
    }

    /// Remove a user record. Messages that mention the user are kept.
    pub fn delete(&self, user_id: &str) -> Result<bool, ChatError> {
        let Some(user) = self.resolve(user_id)? else {
            return Ok(false);
        };
        (&self.users, &self.usernames).transaction(|(users, usernames)| {
            users.remove(user.id.as_bytes())?;
            usernames.remove(user.username.as_bytes())?;
            Ok::<_, ConflictableTransactionError<ChatError>>(())
        })?;
        Ok(true)
    }
}

impl IdentityResolver for UserDirectory {
    fn resolve(&self, subject: &str) -> Result<Option<User>, ChatError> {
        let Some(raw) = self.users.get(subject.as_bytes())? else {
            return Ok(None);
        };
        let stored: StoredUser = serde_json::from_slice(&raw)
            .map_err(|e| ChatError::StoreUnavailable(format!("corrupt user record: {e}")))?;
        Ok(Some(User {
            id: subject.to_string(),
            username: stored.username,
            password_hash: stored.password_hash,
        }))
    }
}

impl std::fmt::Debug for UserDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDirectory")
            .field("users", &self.users.len())
            .finish()
    }
}
