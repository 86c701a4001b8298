use std::collections::BTreeMap;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::Maintenance;
use crate::storage::{decode, encode, SavedContent, Users, BACKUP_KEY, LAST_BACKUP_KEY};

/// Point-in-time copy of the user directory and every content list.
/// Only one is kept; each backup overwrites the last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub timestamp: i64,
    pub users: Users,
    pub contents: BTreeMap<String, Vec<SavedContent>>,
}

impl Maintenance {
    pub async fn create_backup(&self) -> anyhow::Result<BackupSnapshot> {
        let users = self.users.get_users().await.context("read users for backup")?;
        let mut contents = BTreeMap::new();
        for user_id in users.keys() {
            let list = self
                .contents
                .load_content(user_id)
                .await
                .with_context(|| format!("read content of {user_id} for backup"))?;
            contents.insert(user_id.clone(), list);
        }
        let snapshot = BackupSnapshot {
            timestamp: self.clock.now_ms(),
            users,
            contents,
        };

        let raw = encode(BACKUP_KEY, &snapshot)?;
        self.kv.set(BACKUP_KEY, &raw).await.context("write backup")?;
        self.kv
            .set(LAST_BACKUP_KEY, &self.clock.now_ms().to_string())
            .await
            .context("write backup time")?;

        debug!(users = snapshot.users.len(), bytes = raw.len(), "backup written");
        Ok(snapshot)
    }

    pub async fn load_backup(&self) -> anyhow::Result<Option<BackupSnapshot>> {
        match self.kv.get(BACKUP_KEY).await? {
            Some(raw) => Ok(Some(decode(BACKUP_KEY, &raw)?)),
            None => Ok(None),
        }
    }

    /// Overwrites the user directory, then each backed-up user's list, one
    /// at a time. Interrupting this leaves a partial restore. Returns false
    /// when there is no backup.
    pub async fn restore_from_backup(&self) -> anyhow::Result<bool> {
        let Some(snapshot) = self.load_backup().await.context("read backup")? else {
            info!("no backup to restore from");
            return Ok(false);
        };

        self.users
            .replace_users(&snapshot.users)
            .await
            .context("restore users")?;
        for (user_id, list) in &snapshot.contents {
            self.contents
                .save_content(user_id, list)
                .await
                .with_context(|| format!("restore content of {user_id}"))?;
        }

        info!(
            backup_time = snapshot.timestamp,
            users = snapshot.users.len(),
            "restored from backup"
        );
        Ok(true)
    }
}
