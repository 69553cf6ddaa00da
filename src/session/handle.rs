//! The part of a session the hub gets to hold.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::state::{Identity, StateKind};
use crate::utils::{RelayError, Result};

pub type SessionId = Uuid;

/// An item waiting in a session's outbound buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Came out of the queue (fleet route or login backlog). Once written it
    /// is removed from the queue.
    Routed(String),
    /// Generated for this session only (errors, own receipts); never queued.
    Local(String),
}

impl Outbound {
    pub fn text(&self) -> &str {
        match self {
            Outbound::Routed(text) | Outbound::Local(text) => text,
        }
    }
}

/// Cheaply cloneable handle to one live connection.
///
/// The bounded outbound buffer is offered to without blocking; a full buffer
/// is reported as [`RelayError::BufferOverflow`] and the caller decides what
/// to sacrifice. Closing is a one-way signal both session loops listen for.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    id: SessionId,
    connected_at: DateTime<Utc>,
    identity: OnceLock<Identity>,
    outbound: mpsc::Sender<Outbound>,
    closed: CancellationToken,
}

impl SessionHandle {
    pub fn new(outbound: mpsc::Sender<Outbound>) -> Self {
        Self::with_connect_time(outbound, Utc::now())
    }

    pub fn with_connect_time(outbound: mpsc::Sender<Outbound>, connected_at: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Shared {
                id: Uuid::new_v4(),
                connected_at,
                identity: OnceLock::new(),
                outbound,
                closed: CancellationToken::new(),
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.inner.connected_at
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.inner.identity.get()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.identity.get().is_some()
    }

    /// Publishes the identity to the hub. A second call is rejected.
    pub fn authenticate(&self, identity: Identity) -> Result<()> {
        self.inner
            .identity
            .set(identity)
            .map_err(|_| RelayError::InvalidTransition {
                from: StateKind::Authenticated,
                to: StateKind::Authenticated,
            })
    }

    pub fn is_recipient(&self, project: &str, username: &str) -> bool {
        self.identity()
            .is_some_and(|id| id.project == project && id.username == username)
    }

    /// Non-blocking enqueue onto the outbound buffer.
    pub fn offer(&self, item: Outbound) -> Result<()> {
        if self.is_closed() {
            return Err(RelayError::BufferClosed);
        }
        self.inner.outbound.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RelayError::BufferOverflow,
            mpsc::error::TrySendError::Closed(_) => RelayError::BufferClosed,
        })
    }

    /// Closes the outbound buffer: the write loop flushes what is queued,
    /// sends a close frame and stops, and the read loop stops reading.
    pub fn close(&self) {
        self.inner.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    pub async fn closed(&self) {
        self.inner.closed.cancelled().await
    }
}
