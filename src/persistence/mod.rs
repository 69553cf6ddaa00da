//! The `persistence` module holds the durable per-recipient outbox.
//!
//! [`Queue`] is the only type the rest of the crate talks to. It owns key
//! construction and delegates the raw list/hash operations to a [`Store`]
//! backend: Redis for fleet deployments, or an embedded `sled` database for a
//! single node.

pub mod queue;
pub mod redis_store;
pub mod sled_store;
pub mod store;

pub use queue::{AppInfo, Queue};
pub use redis_store::RedisStore;
pub use sled_store::SledStore;
pub use store::Store;

#[cfg(test)]
mod tests;
