//! The `error` module defines the error type shared by every component of
//! `relaychat`.
//!
//! Session-local failures (transport, protocol, validation) are contained in
//! the session that produced them; store and fleet failures abort the single
//! operation that hit them.

use thiserror::Error;

use crate::session::state::StateKind;

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("websocket transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("connection idle for longer than the read deadline")]
    ReadTimeout,

    #[error("write did not complete within the write deadline")]
    WriteTimeout,

    #[error("malformed frame: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("binary frame is not valid UTF-8")]
    NotUtf8,

    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("unknown app key `{0}`")]
    AppNotFound(String),

    #[error("invalid token validation endpoint `{0}`")]
    InvalidEndpoint(String),

    #[error("token rejected for `{username}` (code `{code}`)")]
    TokenRejected { username: String, code: String },

    #[error("token validation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("store error: {0}")]
    Store(String),

    #[error("fleet publish failed: {0}")]
    Publish(String),

    #[error("fleet subscription failed: {0}")]
    Subscribe(String),

    #[error("fleet transport unavailable: {0}")]
    FleetUnavailable(String),

    #[error("hub is no longer running")]
    HubStopped,

    #[error("outbound buffer is full")]
    BufferOverflow,

    #[error("outbound buffer is closed")]
    BufferClosed,

    #[error("invalid session transition from {from:?} to {to:?}")]
    InvalidTransition { from: StateKind, to: StateKind },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Authentication failures are reported to the client only by disconnecting.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            RelayError::AppNotFound(_)
                | RelayError::InvalidEndpoint(_)
                | RelayError::TokenRejected { .. }
                | RelayError::Http(_)
        )
    }
}

impl From<sled::Error> for RelayError {
    fn from(e: sled::Error) -> Self {
        RelayError::Store(e.to_string())
    }
}

impl From<redis::RedisError> for RelayError {
    fn from(e: redis::RedisError) -> Self {
        RelayError::Store(e.to_string())
    }
}
