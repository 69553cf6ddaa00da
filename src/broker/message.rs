//! Message definitions shared by sessions, the hub and the fleet broker
//!
//! `Message` is both the wire format and the unit stored in the queue. Once a
//! message is serialized, the resulting string is what gets persisted,
//! published, routed, written and finally removed, so the bytes never change
//! along the way.
//!
//! Notes on fields:
//! - `id`: client-generated correlation token, echoed on receipts
//! - `type`: see [`MessageKind`]
//! - `from` / `project`: stamped from the sender's session, never trusted
//!   from the client
//! - `to`: recipient username, required for `message` and `read`

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Message,
    Read,
    Logged,
    Received,
    Delivered,
    Error,
    #[default]
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub from: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub to: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub project: String,
}

impl Message {
    /// A receipt about message `id`, authored by `from`, addressed to `to`.
    pub fn receipt(id: &str, kind: MessageKind, from: &str, to: &str, project: &str) -> Self {
        Self {
            id: id.to_string(),
            kind,
            from: from.to_string(),
            to: to.to_string(),
            content: String::new(),
            project: project.to_string(),
        }
    }

    pub fn error(id: &str, to: &str, reason: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: MessageKind::Error,
            to: to.to_string(),
            content: reason.to_string(),
            ..Self::default()
        }
    }

    /// Client-sendable kinds that travel through the fleet.
    pub fn is_routable(&self) -> bool {
        matches!(self.kind, MessageKind::Message | MessageKind::Read)
    }
}
