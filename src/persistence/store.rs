use std::collections::HashMap;

use async_trait::async_trait;

use crate::utils::Result;

/// Keyed list + hash operations the queue relies on.
///
/// Each call must be atomic on its own key; no cross-key transactions are
/// needed.
#[async_trait]
pub trait Store: Send + Sync {
    /// Appends `value` to the end of the list at `key`.
    async fn append(&self, key: &str, value: &str) -> Result<()>;

    /// Removes every entry of the list at `key` equal to `value`, returning
    /// how many were removed.
    async fn remove_all(&self, key: &str, value: &str) -> Result<u64>;

    /// Reads the full list at `key`, oldest first.
    async fn range(&self, key: &str) -> Result<Vec<String>>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn hash_fields(&self, key: &str) -> Result<HashMap<String, String>>;

    async fn set_hash_fields(&self, key: &str, fields: &[(&str, &str)]) -> Result<()>;
}
