//! The `session` module runs one client connection.
//!
//! - `state`: the per-connection lifecycle
//! - `handle`: what the hub holds on to (identity, outbound buffer, close signal)
//! - `connection`: the read and write loops

pub mod connection;
pub mod handle;
pub mod state;

pub use connection::{SessionContext, run_session};
pub use handle::{Outbound, SessionHandle, SessionId};
pub use state::{Identity, SessionState, StateKind};
