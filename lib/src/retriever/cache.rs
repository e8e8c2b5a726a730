//! In-memory schema cache shared by retriever workers.
//!
//! Keys combine the source kind with the resolved source string so a URL,
//! a file path and an inline payload can never collide. Readers take the
//! shared lock. Per-key fetch locks give single-flight semantics: N
//! declarations with a coincident source issue exactly one underlying
//! fetch, the rest wait and hit the cache.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Default)]
pub(super) struct SchemaCache {
    entries: RwLock<HashMap<String, Arc<Vec<u8>>>>,
    fetch_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SchemaCache {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) async fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        self.entries.read().await.get(key).cloned()
    }

    pub(super) async fn insert(&self, key: String, bytes: Arc<Vec<u8>>) {
        self.entries.write().await.insert(key, bytes);
    }

    /// Returns the fetch lock for `key`, creating it on first use. Holding
    /// the returned lock across check-fetch-insert makes the fetch
    /// single-flight per key.
    pub(super) async fn fetch_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.fetch_locks.lock().await;
        Arc::clone(locks.entry(key.to_string()).or_default())
    }
}
