//! The `broker` module connects this node to the rest of the fleet.
//!
//! - `message`: the wire/queue message type
//! - `engine`: the fleet [`Broker`] (persist, publish, subscribe)
//! - `fleet` / `redis_fleet`: the pub/sub transports it runs on

pub mod engine;
pub mod fleet;
pub mod message;
pub mod redis_fleet;

pub use engine::Broker;
pub use fleet::{FleetTransport, LocalFleet, Publications};
pub use message::{Message, MessageKind};
pub use redis_fleet::RedisFleet;
