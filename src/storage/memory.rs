use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{KvStore, StorageEstimate, StoreError};

/// Process-local store. With a quota it behaves like a host that rejects
/// writes past its limit and reports usage.
#[derive(Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, String>>,
    quota: Option<u64>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota: Some(quota),
        }
    }

    fn usage_of(entries: &HashMap<String, String>) -> u64 {
        entries
            .iter()
            .map(|(k, v)| (k.len() + v.len()) as u64)
            .sum()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        if let Some(quota) = self.quota {
            let current = Self::usage_of(&entries);
            let replaced = entries
                .get(key)
                .map(|old| (key.len() + old.len()) as u64)
                .unwrap_or(0);
            let needed = current - replaced + (key.len() + value.len()) as u64;
            if needed > quota {
                return Err(StoreError::QuotaExceeded { needed, quota });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn estimate(&self) -> Result<Option<StorageEstimate>, StoreError> {
        let Some(quota) = self.quota else {
            return Ok(None);
        };
        let usage = Self::usage_of(&*self.entries.read().await);
        Ok(Some(StorageEstimate { usage, quota }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_set_remove() {
        let kv = MemoryKv::new();
        assert_eq!(kv.get("k").await.unwrap(), None);

        kv.set("k", "\"v\"").await.unwrap();
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("\"v\""));

        kv.remove("k").await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn no_estimate_without_quota() {
        let kv = MemoryKv::new();
        kv.set("k", "v").await.unwrap();
        assert_eq!(kv.estimate().await.unwrap(), None);
    }

    #[tokio::test]
    async fn quota_rejects_oversized_write() {
        let kv = MemoryKv::with_quota(10);
        kv.set("ab", "cdef").await.unwrap();

        let err = kv.set("gh", "ijklmn").await.unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { needed: 14, quota: 10 }));
        // rejected write leaves the store untouched
        assert_eq!(kv.get("gh").await.unwrap(), None);

        // overwriting an existing key only counts the difference
        kv.set("ab", "cdefghij").await.unwrap();
        let est = kv.estimate().await.unwrap().unwrap();
        assert_eq!(est, StorageEstimate { usage: 10, quota: 10 });
    }
}
