use thiserror::Error;
use time::{macros::format_description, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::dto::Clip;
use crate::clock::Clock;
use crate::storage::{ContentStore, SavedContent, StoreError};

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Content is empty")]
    EmptyContent,
    #[error("Name must not be empty")]
    EmptyName,
    #[error("Content not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Splits pasted text on `\n`, dropping lines that are blank after trimming.
/// Kept lines are returned verbatim.
pub fn split_clips(text: &str, now: OffsetDateTime) -> Vec<Clip> {
    text.split('\n')
        .filter(|line| !line.trim().is_empty())
        .map(|line| Clip {
            id: Uuid::new_v4(),
            content: line.to_string(),
            created_at: now,
        })
        .collect()
}

/// Display name given to a freshly saved entry.
pub fn default_name(timestamp_ms: i64) -> String {
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let formatted = OffsetDateTime::from_unix_timestamp_nanos(timestamp_ms as i128 * 1_000_000)
        .ok()
        .and_then(|dt| dt.format(fmt).ok())
        .unwrap_or_else(|| timestamp_ms.to_string());
    format!("Clip {formatted}")
}

/// Prepends a new entry and persists the list, capped at the store limit.
pub async fn save(
    store: &ContentStore,
    clock: &dyn Clock,
    user_id: &str,
    content: &str,
) -> Result<SavedContent, ContentError> {
    if content.trim().is_empty() {
        return Err(ContentError::EmptyContent);
    }
    let timestamp = clock.now_ms();
    let entry = SavedContent {
        id: Uuid::new_v4().to_string(),
        name: default_name(timestamp),
        content: content.to_string(),
        timestamp,
    };

    let existing = store.load_content(user_id).await?;
    let mut list = Vec::with_capacity(existing.len() + 1);
    list.push(entry.clone());
    list.extend(existing);
    store.save_content(user_id, &list).await?;

    debug!(%user_id, id = %entry.id, total = list.len(), "content saved");
    Ok(entry)
}

pub async fn rename(
    store: &ContentStore,
    user_id: &str,
    id: &str,
    name: &str,
) -> Result<SavedContent, ContentError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ContentError::EmptyName);
    }

    let mut list = store.load_content(user_id).await?;
    let entry = list
        .iter_mut()
        .find(|e| e.id == id)
        .ok_or(ContentError::NotFound)?;
    entry.name = name.to_string();
    let renamed = entry.clone();

    store.save_content(user_id, &list).await?;
    Ok(renamed)
}

pub async fn delete(store: &ContentStore, user_id: &str, id: &str) -> Result<(), ContentError> {
    let mut list = store.load_content(user_id).await?;
    let before = list.len();
    list.retain(|e| e.id != id);
    if list.len() == before {
        return Err(ContentError::NotFound);
    }
    store.save_content(user_id, &list).await?;
    Ok(())
}
