use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

mod contents;
mod memory;
mod pg;
mod users;

pub use contents::{ContentStore, SavedContent, MAX_ITEMS};
pub use memory::MemoryKv;
pub use pg::PgKv;
pub use users::{Credential, UserDirectory, Users};

pub const USERS_KEY: &str = "clipboard_users";
pub const CURRENT_USER_KEY: &str = "clipboard_current_user";
pub const CONTENT_KEY_PREFIX: &str = "clipboard_data_";
pub const BACKUP_KEY: &str = "clipboard_backup";
pub const LAST_MAINTENANCE_KEY: &str = "last_maintenance";
pub const LAST_BACKUP_KEY: &str = "last_backup";

/// Key under which a user's content list is persisted.
pub fn content_key(user_id: &str) -> String {
    format!("{}{}", CONTENT_KEY_PREFIX, user_id)
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage quota exceeded: {needed} bytes needed, quota is {quota} bytes")]
    QuotaExceeded { needed: u64, quota: u64 },

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("malformed value under {key}: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

pub(crate) fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|source| StoreError::Malformed {
        key: key.to_string(),
        source,
    })
}

pub(crate) fn encode<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Malformed {
        key: key.to_string(),
        source,
    })
}

/// Bytes in use versus bytes available, as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageEstimate {
    pub usage: u64,
    pub quota: u64,
}

impl StorageEstimate {
    pub fn used_percent(&self) -> f64 {
        if self.quota == 0 {
            return 0.0;
        }
        self.usage as f64 / self.quota as f64 * 100.0
    }
}

/// String-keyed persistent store holding JSON text values.
///
/// Writes to several keys are independent: there is no transaction and no
/// atomicity across keys.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Usage and quota, when the backend can tell.
    async fn estimate(&self) -> Result<Option<StorageEstimate>, StoreError> {
        Ok(None)
    }
}
