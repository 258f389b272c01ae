//! Credential handshake
//!
//! Credentials are HS256 JWTs whose `userId` claim names the subject and
//! whose `exp` claim bounds their lifetime. A failed verification is
//! reported to the caller and never closes the connection by itself.

use std::sync::Arc;

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::persistence::IdentityResolver;
use crate::utils::ChatError;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub exp: usize,
}

/// The outward view of a verified user. Carries no credential material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedUser {
    pub id: String,
    pub username: String,
}

pub struct Authenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    users: Arc<dyn IdentityResolver>,
}

impl Authenticator {
    pub fn new(secret: &str, users: Arc<dyn IdentityResolver>) -> Self {
        let mut validation = Validation::default();
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            users,
        }
    }

    /// Sign a credential for `user_id` valid for `ttl`.
    pub fn issue(&self, user_id: &str, ttl: chrono::Duration) -> Result<String, ChatError> {
        let claims = Claims {
            user_id: user_id.to_string(),
            exp: (chrono::Utc::now() + ttl).timestamp().max(0) as usize,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    /// Verify signature and expiry, then resolve the subject.
    pub fn verify(&self, token: Option<&str>) -> Result<AuthenticatedUser, ChatError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ChatError::AuthFailed("no token provided".into()))?;

        let data = decode::<Claims>(token, &self.decoding, &self.validation)?;

        let user = self
            .users
            .resolve(&data.claims.user_id)?
            .ok_or(ChatError::UserNotFound)?;

        Ok(AuthenticatedUser {
            id: user.id,
            username: user.username,
        })
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator").finish_non_exhaustive()
    }
}
