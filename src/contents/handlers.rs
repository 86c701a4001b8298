use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{patch, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use super::dto::{Clip, RenameRequest, SaveContentRequest, SplitRequest};
use super::services::{self, ContentError};
use crate::{
    auth::AuthUser,
    state::AppState,
    storage::{SavedContent, StoreError},
};

pub fn clip_routes() -> Router<AppState> {
    Router::new().route("/clips/split", post(split_clips))
}

pub fn content_routes() -> Router<AppState> {
    Router::new()
        .route("/contents", post(save_content).get(list_contents))
        .route("/contents/:id", patch(rename_content).delete(delete_content))
}

fn content_error(e: ContentError) -> (StatusCode, String) {
    let status = match &e {
        ContentError::EmptyContent | ContentError::EmptyName => StatusCode::BAD_REQUEST,
        ContentError::NotFound => StatusCode::NOT_FOUND,
        ContentError::Store(StoreError::QuotaExceeded { needed, quota }) => {
            warn!(needed, quota, "storage quota exceeded");
            StatusCode::INSUFFICIENT_STORAGE
        }
        ContentError::Store(_) => {
            error!(error = %e, "content storage failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, e.to_string())
}

#[instrument(skip(payload))]
pub async fn split_clips(
    AuthUser(username): AuthUser,
    Json(payload): Json<SplitRequest>,
) -> Result<Json<Vec<Clip>>, (StatusCode, String)> {
    let clips = services::split_clips(&payload.text, OffsetDateTime::now_utc());
    info!(%username, count = clips.len(), "text split");
    Ok(Json(clips))
}

#[instrument(skip(state))]
pub async fn list_contents(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
) -> Result<Json<Vec<SavedContent>>, (StatusCode, String)> {
    state
        .contents
        .load_content(&username)
        .await
        .map(Json)
        .map_err(|e| content_error(e.into()))
}

#[instrument(skip(state, payload))]
pub async fn save_content(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    Json(payload): Json<SaveContentRequest>,
) -> Result<(StatusCode, Json<SavedContent>), (StatusCode, String)> {
    let entry = services::save(
        &state.contents,
        state.clock.as_ref(),
        &username,
        &payload.content,
    )
    .await
    .map_err(content_error)?;

    info!(%username, id = %entry.id, "content saved");
    Ok((StatusCode::CREATED, Json(entry)))
}

#[instrument(skip(state, payload))]
pub async fn rename_content(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<RenameRequest>,
) -> Result<Json<SavedContent>, (StatusCode, String)> {
    let entry = services::rename(&state.contents, &username, &id, &payload.name)
        .await
        .map_err(content_error)?;
    info!(%username, %id, "content renamed");
    Ok(Json(entry))
}

#[instrument(skip(state))]
pub async fn delete_content(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    services::delete(&state.contents, &username, &id)
        .await
        .map_err(content_error)?;
    info!(%username, %id, "content deleted");
    Ok(StatusCode::NO_CONTENT)
}
