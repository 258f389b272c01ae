//! The `auth` module verifies the bearer credential a client presents over
//! its connection and resolves it to a user.

pub mod handshake;

pub use handshake::{AuthenticatedUser, Authenticator, Claims};
