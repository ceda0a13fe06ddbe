//! Physical storage connection
//!
//! The document store never talks to a storage engine directly; it goes
//! through `Connection`, a raw namespaced key/value contract with an atomic
//! compare-and-swap. One connection is shared by all logical stores.

use async_trait::async_trait;
use dashmap::DashMap;
use std::path::Path;
use tracing::info;

use crate::error::ClientError;

/// Raw blob storage addressed by repository namespace and key.
///
/// `cas` is the only mutation primitive with ordering guarantees: it
/// succeeds iff the current value equals `expected` (`None` = absent).
#[async_trait]
pub trait Connection: Send + Sync {
    async fn get(&self, repo: &str, key: &str) -> Result<Option<Vec<u8>>, ClientError>;

    async fn put(&self, repo: &str, key: &str, value: Vec<u8>) -> Result<(), ClientError>;

    /// Atomic compare-and-set. Returns `false` on a lost race.
    async fn cas(
        &self,
        repo: &str,
        key: &str,
        expected: Option<Vec<u8>>,
        new: Vec<u8>,
    ) -> Result<bool, ClientError>;

    /// All `(key, value)` pairs under a key prefix, in key order.
    async fn scan(&self, repo: &str, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, ClientError>;
}

/// Embedded sled backend.
///
/// One lazily-opened tree per repository namespace, all on a single
/// `sled::Db`.
pub struct SledConnection {
    db: sled::Db,
    trees: DashMap<String, sled::Tree>,
}

impl SledConnection {
    /// Open (or create) the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ClientError> {
        let db = sled::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "Opened store connection");
        Ok(Self {
            db,
            trees: DashMap::new(),
        })
    }

    /// Ephemeral database, removed on drop. Intended for tests.
    pub fn temporary() -> Result<Self, ClientError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self {
            db,
            trees: DashMap::new(),
        })
    }

    fn tree(&self, repo: &str) -> Result<sled::Tree, ClientError> {
        if let Some(tree) = self.trees.get(repo) {
            return Ok(tree.clone());
        }
        let tree = self.db.open_tree(repo.as_bytes())?;
        self.trees.insert(repo.to_string(), tree.clone());
        Ok(tree)
    }
}

#[async_trait]
impl Connection for SledConnection {
    async fn get(&self, repo: &str, key: &str) -> Result<Option<Vec<u8>>, ClientError> {
        let tree = self.tree(repo)?;
        Ok(tree.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    async fn put(&self, repo: &str, key: &str, value: Vec<u8>) -> Result<(), ClientError> {
        let tree = self.tree(repo)?;
        tree.insert(key.as_bytes(), value)?;
        Ok(())
    }

    async fn cas(
        &self,
        repo: &str,
        key: &str,
        expected: Option<Vec<u8>>,
        new: Vec<u8>,
    ) -> Result<bool, ClientError> {
        let tree = self.tree(repo)?;
        let outcome = tree.compare_and_swap(key.as_bytes(), expected.as_deref(), Some(new))?;
        Ok(outcome.is_ok())
    }

    async fn scan(&self, repo: &str, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, ClientError> {
        let tree = self.tree(repo)?;
        let mut out = Vec::new();
        for item in tree.scan_prefix(prefix.as_bytes()) {
            let (key, value) = item?;
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| ClientError::Deserialization(format!("non-utf8 key: {}", e)))?;
            out.push((key, value.to_vec()));
        }
        Ok(out)
    }
}
