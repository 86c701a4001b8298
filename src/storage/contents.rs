use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{content_key, decode, encode, KvStore, StoreError};

/// Per-user cap on saved entries.
pub const MAX_ITEMS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedContent {
    pub id: String,
    pub name: String,
    pub content: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Ordered saved entries, one blob per user.
#[derive(Clone)]
pub struct ContentStore {
    kv: Arc<dyn KvStore>,
    max_items: usize,
}

impl ContentStore {
    pub fn with_limit(kv: Arc<dyn KvStore>, max_items: usize) -> Self {
        Self { kv, max_items }
    }

    pub async fn load_content(&self, user_id: &str) -> Result<Vec<SavedContent>, StoreError> {
        let key = content_key(user_id);
        match self.kv.get(&key).await? {
            Some(raw) => decode(&key, &raw),
            None => Ok(Vec::new()),
        }
    }

    /// Untyped view of a user's list, for validation.
    pub async fn load_content_raw(
        &self,
        user_id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let key = content_key(user_id);
        match self.kv.get(&key).await? {
            Some(raw) => decode(&key, &raw).map(Some),
            None => Ok(None),
        }
    }

    /// Persists the first `max_items` entries in the order given. Callers
    /// sort beforehand when "first" should mean "most recent".
    pub async fn save_content(&self, user_id: &str, contents: &[SavedContent]) -> Result<(), StoreError> {
        let key = content_key(user_id);
        let kept = &contents[..contents.len().min(self.max_items)];
        let raw = encode(&key, kept)?;
        self.kv.set(&key, &raw).await
    }
}
