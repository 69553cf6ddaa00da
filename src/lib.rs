//! # RelayChat
//!
//! `relaychat` is a real-time chat routing hub. Clients hold a WebSocket
//! open, log in against their tenant's token endpoint and exchange
//! point-to-point messages. Every message is kept in a durable per-recipient
//! queue until it reaches the recipient's socket, and is fanned out to every
//! node of the fleet through one shared pub/sub topic.
//!
//! ## Core Modules
//!
//! - `auth`: token validation against the tenant's HTTP endpoint.
//! - `broker`: the message type and the fleet broker (persist, then publish).
//! - `config`: loading settings from file and environment.
//! - `hub`: the single loop that owns this node's sessions.
//! - `persistence`: the durable queue and its Redis and sled stores.
//! - `session`: per-connection state and read/write loops.
//! - `transport`: the WebSocket accept loop and the login frame.
//! - `utils`: shared error type and logging setup.

pub mod auth;
pub mod broker;
pub mod config;
pub mod hub;
pub mod persistence;
pub mod session;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod tests;
