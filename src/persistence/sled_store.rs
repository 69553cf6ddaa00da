//! Embedded store backed by `sled`
//!
//! Lists live in the `lists` tree under `key \0 <id>`, where `<id>` comes from
//! `Db::generate_id` and is stored big-endian so a prefix scan yields entries
//! in append order. Hashes live in the `hashes` tree under `key \0 field`.

use std::collections::HashMap;

use async_trait::async_trait;
use sled::{Db, Tree};

use super::store::Store;
use crate::utils::Result;

#[derive(Clone)]
pub struct SledStore {
    db: Db,
    lists: Tree,
    hashes: Tree,
}

impl SledStore {
    /// Open or create a sled database at `path`.
    pub fn open(path: &str) -> Result<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// A throwaway database that is deleted when dropped.
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self> {
        let lists = db.open_tree("lists")?;
        let hashes = db.open_tree("hashes")?;
        Ok(Self { db, lists, hashes })
    }
}

fn entry_prefix(key: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(key.len() + 1);
    prefix.extend_from_slice(key.as_bytes());
    prefix.push(0);
    prefix
}

#[async_trait]
impl Store for SledStore {
    async fn append(&self, key: &str, value: &str) -> Result<()> {
        let mut entry = entry_prefix(key);
        entry.extend_from_slice(&self.db.generate_id()?.to_be_bytes());
        self.lists.insert(entry, value.as_bytes())?;
        // the entry has to be on disk before anyone can observe the publish
        self.lists.flush_async().await?;
        Ok(())
    }

    async fn remove_all(&self, key: &str, value: &str) -> Result<u64> {
        let matching: Vec<_> = self
            .lists
            .scan_prefix(entry_prefix(key))
            .filter_map(|res| res.ok())
            .filter(|(_, v)| &v[..] == value.as_bytes())
            .map(|(k, _)| k)
            .collect();

        let mut removed = 0;
        for entry in matching {
            if self.lists.remove(entry)?.is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            self.lists.flush_async().await?;
        }
        Ok(removed)
    }

    async fn range(&self, key: &str) -> Result<Vec<String>> {
        let mut values = Vec::new();
        for res in self.lists.scan_prefix(entry_prefix(key)) {
            let (_, v) = res?;
            values.push(String::from_utf8_lossy(&v).into_owned());
        }
        Ok(values)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let prefix = entry_prefix(key);
        Ok(self.lists.scan_prefix(&prefix).next().is_some()
            || self.hashes.scan_prefix(&prefix).next().is_some())
    }

    async fn hash_fields(&self, key: &str) -> Result<HashMap<String, String>> {
        let prefix = entry_prefix(key);
        let mut fields = HashMap::new();
        for res in self.hashes.scan_prefix(&prefix) {
            let (k, v) = res?;
            let field = String::from_utf8_lossy(&k[prefix.len()..]).into_owned();
            fields.insert(field, String::from_utf8_lossy(&v).into_owned());
        }
        Ok(fields)
    }

    async fn set_hash_fields(&self, key: &str, fields: &[(&str, &str)]) -> Result<()> {
        for (field, value) in fields {
            let mut entry = entry_prefix(key);
            entry.extend_from_slice(field.as_bytes());
            self.hashes.insert(entry, value.as_bytes())?;
        }
        self.hashes.flush_async().await?;
        Ok(())
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("db", &"sled::Db")
            .finish()
    }
}
