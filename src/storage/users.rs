use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{decode, encode, KvStore, StoreError, CURRENT_USER_KEY, USERS_KEY};

/// Credential record. Field names match the JSON already persisted by
/// earlier clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub username: String,
    pub password_hash: String,
}

pub type Users = BTreeMap<String, Credential>;

/// Username → credential mapping stored as a single blob.
#[derive(Clone)]
pub struct UserDirectory {
    kv: Arc<dyn KvStore>,
}

impl UserDirectory {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn get_users(&self) -> Result<Users, StoreError> {
        match self.kv.get(USERS_KEY).await? {
            Some(raw) => decode(USERS_KEY, &raw),
            None => Ok(Users::new()),
        }
    }

    pub async fn find(&self, username: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self.get_users().await?.remove(username))
    }

    /// Read-modify-write of the whole directory. Two concurrent callers can
    /// drop each other's update.
    pub async fn save_user(&self, username: &str, password_hash: &str) -> Result<(), StoreError> {
        let mut users = self.get_users().await?;
        users.insert(
            username.to_string(),
            Credential {
                username: username.to_string(),
                password_hash: password_hash.to_string(),
            },
        );
        self.replace_users(&users).await
    }

    pub async fn replace_users(&self, users: &Users) -> Result<(), StoreError> {
        let raw = encode(USERS_KEY, users)?;
        self.kv.set(USERS_KEY, &raw).await
    }

    pub async fn current_user(&self) -> Result<Option<Credential>, StoreError> {
        match self.kv.get(CURRENT_USER_KEY).await? {
            Some(raw) => decode(CURRENT_USER_KEY, &raw),
            None => Ok(None),
        }
    }

    pub async fn set_current_user(&self, user: Option<&Credential>) -> Result<(), StoreError> {
        match user {
            Some(user) => {
                let raw = encode(CURRENT_USER_KEY, user)?;
                self.kv.set(CURRENT_USER_KEY, &raw).await
            }
            None => self.kv.remove(CURRENT_USER_KEY).await,
        }
    }

    /// Removes the last-login marker only when it belongs to `username`.
    /// Returns whether it was removed.
    pub async fn clear_current_user_if(&self, username: &str) -> Result<bool, StoreError> {
        match self.current_user().await? {
            Some(current) if current.username == username => {
                self.kv.remove(CURRENT_USER_KEY).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
