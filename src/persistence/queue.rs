//! Per-recipient pending-message queue and tenant lookups.
//!
//! Chat entries live under `chat_prefix + project + ":" + recipient` and
//! tenant records under `app_prefix + app_key`. Entries are raw serialized
//! messages; duplicates are kept, and [`Queue::remove`] deletes every entry
//! whose bytes match exactly.

use std::sync::Arc;

use tracing::debug;

use super::store::Store;
use crate::utils::{RelayError, Result};

/// Tenant record resolved from a client-presented app key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppInfo {
    /// Token-validation endpoint.
    pub api: String,
    pub project_id: String,
}

#[derive(Clone)]
pub struct Queue {
    store: Arc<dyn Store>,
    chat_prefix: String,
    app_prefix: String,
}

impl Queue {
    pub fn new(store: Arc<dyn Store>, chat_prefix: String, app_prefix: String) -> Self {
        Self {
            store,
            chat_prefix,
            app_prefix,
        }
    }

    pub fn chat_key(&self, project: &str, recipient: &str) -> String {
        format!("{}{project}:{recipient}", self.chat_prefix)
    }

    pub fn app_key(&self, app_key: &str) -> String {
        format!("{}{app_key}", self.app_prefix)
    }

    /// Appends a serialized message to the recipient's pending list.
    pub async fn save(&self, project: &str, recipient: &str, message: &str) -> Result<()> {
        let key = self.chat_key(project, recipient);
        self.store.append(&key, message).await?;
        debug!(%key, "Saved pending message");
        Ok(())
    }

    /// Non-destructive read of the recipient's backlog, oldest first.
    pub async fn list_pending(&self, project: &str, recipient: &str) -> Result<Vec<String>> {
        self.store.range(&self.chat_key(project, recipient)).await
    }

    /// Removes every entry equal to `message`. Two distinct messages that
    /// serialize to identical bytes are both removed.
    pub async fn remove(&self, project: &str, recipient: &str, message: &str) -> Result<u64> {
        let key = self.chat_key(project, recipient);
        let removed = self.store.remove_all(&key, message).await?;
        debug!(%key, removed, "Removed delivered message");
        Ok(removed)
    }

    pub async fn lookup_app(&self, app_key: &str) -> Result<AppInfo> {
        let key = self.app_key(app_key);
        if !self.store.exists(&key).await? {
            return Err(RelayError::AppNotFound(app_key.to_string()));
        }
        let mut fields = self.store.hash_fields(&key).await?;
        Ok(AppInfo {
            api: fields.remove("api").unwrap_or_default(),
            project_id: fields.remove("project_id").unwrap_or_default(),
        })
    }

    /// Writes a tenant record. Production records come from an external
    /// provisioning process; this backs the `provision` subcommand.
    pub async fn provision_app(&self, app_key: &str, info: &AppInfo) -> Result<()> {
        self.store
            .set_hash_fields(
                &self.app_key(app_key),
                &[("api", info.api.as_str()), ("project_id", info.project_id.as_str())],
            )
            .await
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("chat_prefix", &self.chat_prefix)
            .field("app_prefix", &self.app_prefix)
            .finish()
    }
}
