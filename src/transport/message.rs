//! Client protocol frames that are not chat messages.
//!
//! The first frame on every connection must be an [`AuthRequest`]; after
//! that, frames are [`Message`](crate::broker::Message)s.

use serde::{Deserialize, Serialize};

/// Login frame: `{id, appKey, username, token}`.
///
/// Missing fields deserialize as empty strings and fail later, at app lookup
/// or token validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthRequest {
    pub id: String,
    #[serde(rename = "appKey")]
    pub app_key: String,
    pub username: String,
    pub token: String,
}
