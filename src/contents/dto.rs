use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SplitRequest {
    pub text: String,
}

/// One transient line of pasted text. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Clip {
    pub id: Uuid,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct SaveContentRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}
