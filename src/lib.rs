//! # PawChat
//!
//! `pawchat` is the real-time direct-messaging core of the pet playdate
//! service: a WebSocket server that lets any number of stateless processes
//! deliver a message to whichever process holds the recipient's connection,
//! without ever losing a message sent while the recipient is offline.
//!
//! ## Core Modules
//!
//! - `auth`: Verifies bearer credentials presented over a connection.
//! - `broker`: Connection registry and the delivery engine (persist, publish,
//!   forward, flush backlog).
//! - `bus`: Fanout bus shared by all processes (in-process or Redis).
//! - `client`: A live connection with its bounded outbound queue.
//! - `config`: Loads server configuration from file and environment.
//! - `history`: Conversation history and per-counterpart summaries.
//! - `persistence`: sled-backed message store and user directory.
//! - `transport`: Frame protocol, per-connection sessions, WebSocket server.
//! - `utils`: Error taxonomy and logging.

pub mod auth;
pub mod broker;
pub mod bus;
pub mod client;
pub mod config;
pub mod history;
pub mod persistence;
pub mod transport;
pub mod utils;
