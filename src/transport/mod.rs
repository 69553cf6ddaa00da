//! The `transport` module is responsible for handling network communication
//! with clients via WebSockets.
//!
//! It defines the login frame of the client protocol and runs the accept
//! loop that hands every connection to a session.

pub mod message;
pub mod websocket;

pub use message::AuthRequest;
pub use websocket::{serve, start_websocket_server};
